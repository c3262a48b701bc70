//! 单线程处理：读帧 → 检测 → 标注 → 显示

use std::time::{Duration, Instant};

use image::RgbImage;
use log::{debug, info};

use crate::core::config::AppConfig;
use crate::core::detector::{Detector, FaceFinder};
use crate::core::error::Result;
use crate::core::media::{is_quit_key, FrameDisplay, FrameSource};
use crate::core::video::annotate::FaceAnnotator;
use crate::core::video::frame::FrameRecord;

/// Milliseconds the window waits for a key after each frame.
pub const KEY_POLL_DELAY_MS: i32 = 1;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequentialReport {
    pub frames: u64,
    /// Faces found across all frames.
    pub faces: u64,
    pub quit_by_key: bool,
    pub elapsed: Duration,
}

/// Every per-frame step, one after the other, on the calling thread.
pub fn process_frame<F: Detector, A: Detector>(
    index: u64,
    image: RgbImage,
    finder: &mut FaceFinder<F>,
    annotator: &mut FaceAnnotator<A>,
    scale: f64,
) -> FrameRecord {
    let mut record = FrameRecord::acquired(index, image);
    record.to_grayscale();
    record.downscale(scale);
    record.equalize();
    let faces = finder.find_or_empty(&record.small);
    record.set_faces(faces);
    annotator.annotate_record(&mut record);
    record
}

/// Runs until the source is exhausted or a quit key is pressed.
/// Source and display failures end the run with an error.
pub fn run_sequential<S, F, A, W>(
    config: &AppConfig,
    source: &mut S,
    finder: &mut FaceFinder<F>,
    annotator: &mut FaceAnnotator<A>,
    display: &mut W,
) -> Result<SequentialReport>
where
    S: FrameSource,
    F: Detector,
    A: Detector,
    W: FrameDisplay,
{
    let started = Instant::now();
    let mut report = SequentialReport::default();

    while let Some(image) = source.next_frame()? {
        let mut record = process_frame(report.frames, image, finder, annotator, config.scale);
        display.show(&config.window_title, &record.image)?;
        record.mark_delivered();

        report.frames += 1;
        report.faces += record.faces.len() as u64;
        debug!("frame {}: {} faces", record.index, record.faces.len());

        if let Some(key) = display.poll_key(KEY_POLL_DELAY_MS)? {
            if is_quit_key(key) {
                info!("⏹️ quit key pressed after {} frames", report.frames);
                report.quit_by_key = true;
                break;
            }
        }
    }

    report.elapsed = started.elapsed();
    info!(
        "✅ sequential run finished: {} frames, {} faces",
        report.frames, report.faces
    );
    Ok(report)
}
