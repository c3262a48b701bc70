use std::path::Path;
use std::process;

use log::error;
use smile_face::api::sequential::run_sequential;
use smile_face::backend::{CascadeDetector, HighGuiDisplay, OpenCvCapture};
use smile_face::core::config::{AppConfig, CONFIG_FILE};
use smile_face::core::detector::FaceFinder;
use smile_face::core::video::FaceAnnotator;
use smile_face::SmileFaceError;

fn main() {
    smile_face::init_logging();

    if let Err(e) = run() {
        error!("❌ {}", e);
        match e {
            SmileFaceError::CaptureOpen(_) => {
                eprintln!("ERROR: Could not initiate capture");
                process::exit(-1);
            }
            _ => process::exit(1),
        }
    }
}

fn run() -> smile_face::Result<()> {
    let config = AppConfig::load(Path::new(CONFIG_FILE), AppConfig::sequential())?;

    let face_cascade = CascadeDetector::load(&config.face_cascade)?;
    let smile_cascade = CascadeDetector::load(&config.smile_cascade)?;
    let mut source = OpenCvCapture::open(&config.input)?;

    let mut finder = FaceFinder::new(face_cascade, config.face_params, config.try_flip);
    let mut annotator = FaceAnnotator::new(smile_cascade, config.smile_params, config.scale);
    let mut display = HighGuiDisplay::new();

    println!("Video capturing has been started ...");
    println!();
    println!("NOTE: Smile intensity will only be valid after a first smile has been detected");

    let report = run_sequential(&config, &mut source, &mut finder, &mut annotator, &mut display)?;

    println!("Execution took {:.6} seconds.", report.elapsed.as_secs_f64());
    Ok(())
}
