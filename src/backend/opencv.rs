use std::path::Path;

use image::{GrayImage, RgbImage};
use log::{debug, info};
use opencv::core::{self as cv, Mat, Vector};
use opencv::prelude::*;
use opencv::{highgui, imgproc, objdetect, videoio};

use crate::core::detector::{DetectionParams, Detector};
use crate::core::error::{Result, SmileFaceError};
use crate::core::media::{FrameDisplay, FrameSource};
use crate::core::video::frame::Rect;

/// Decodes a video file frame by frame, converted to RGB.
pub struct OpenCvCapture {
    capture: videoio::VideoCapture,
    name: String,
    frames: u64,
}

impl OpenCvCapture {
    pub fn open(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy().into_owned();
        let capture = videoio::VideoCapture::from_file(&name, videoio::CAP_ANY)
            .map_err(|e| SmileFaceError::CaptureOpen(format!("{}: {}", name, e)))?;
        if !capture.is_opened()? {
            return Err(SmileFaceError::CaptureOpen(name));
        }

        info!("🎬 opened {}", name);
        Ok(Self {
            capture,
            name,
            frames: 0,
        })
    }
}

impl FrameSource for OpenCvCapture {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.empty() {
            debug!("{}: end of stream after {} frames", self.name, self.frames);
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)?;
        let (width, height) = (rgb.cols() as u32, rgb.rows() as u32);
        let data = rgb.data_bytes()?.to_vec();
        let image = RgbImage::from_raw(width, height, data).ok_or_else(|| {
            SmileFaceError::InvalidFrame(format!(
                "{}: frame {} is not {}x{} RGB",
                self.name, self.frames, width, height
            ))
        })?;

        self.frames += 1;
        Ok(Some(image))
    }
}

/// Haar cascade loaded from an XML file.
pub struct CascadeDetector {
    classifier: objdetect::CascadeClassifier,
}

impl CascadeDetector {
    pub fn load(path: &Path) -> Result<Self> {
        let name = path.to_string_lossy().into_owned();
        if !path.is_file() {
            return Err(SmileFaceError::CascadeLoad(format!("{} not found", name)));
        }

        let classifier = objdetect::CascadeClassifier::new(&name)
            .map_err(|e| SmileFaceError::CascadeLoad(format!("{}: {}", name, e)))?;
        if classifier.empty()? {
            return Err(SmileFaceError::CascadeLoad(format!(
                "{} holds no classifier",
                name
            )));
        }

        info!("🧠 loaded cascade {}", name);
        Ok(Self { classifier })
    }
}

impl Detector for CascadeDetector {
    fn detect(&mut self, image: &GrayImage, params: &DetectionParams) -> Result<Vec<Rect>> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(Vec::new());
        }

        // SAFETY: `mat` borrows the pixel buffer of `image` and is dropped before it
        let mat = unsafe {
            Mat::new_rows_cols_with_data_unsafe(
                image.height() as i32,
                image.width() as i32,
                cv::CV_8UC1,
                image.as_raw().as_ptr() as *mut _,
                cv::Mat_AUTO_STEP,
            )?
        };

        let mut found = Vector::<cv::Rect>::new();
        self.classifier
            .detect_multi_scale(
                &mat,
                &mut found,
                params.scale_factor,
                params.min_neighbors,
                objdetect::CASCADE_SCALE_IMAGE,
                cv::Size::new(params.min_size.0, params.min_size.1),
                cv::Size::new(0, 0),
            )
            .map_err(|e| SmileFaceError::Detector(e.to_string()))?;

        Ok(found
            .iter()
            .map(|r| Rect::new(r.x, r.y, r.width, r.height))
            .collect())
    }
}

/// HighGUI window. Every window is closed when this is dropped.
#[derive(Default)]
pub struct HighGuiDisplay {
    opened: bool,
}

impl HighGuiDisplay {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrameDisplay for HighGuiDisplay {
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()> {
        // SAFETY: `rgb` borrows the pixel buffer of `image` and is dropped before it
        let rgb = unsafe {
            Mat::new_rows_cols_with_data_unsafe(
                image.height() as i32,
                image.width() as i32,
                cv::CV_8UC3,
                image.as_raw().as_ptr() as *mut _,
                cv::Mat_AUTO_STEP,
            )?
        };

        let mut bgr = Mat::default();
        imgproc::cvt_color_def(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR)?;
        highgui::imshow(title, &bgr).map_err(|e| SmileFaceError::Display(e.to_string()))?;
        self.opened = true;
        Ok(())
    }

    fn poll_key(&mut self, delay_ms: i32) -> Result<Option<i32>> {
        let key = highgui::wait_key(delay_ms).map_err(|e| SmileFaceError::Display(e.to_string()))?;
        Ok((key >= 0).then_some(key))
    }
}

impl Drop for HighGuiDisplay {
    fn drop(&mut self) {
        if self.opened {
            let _ = highgui::destroy_all_windows();
        }
    }
}
