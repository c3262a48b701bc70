use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::GrayImage;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;
use crate::core::video::frame::{mirror, Rect};

/// Tuning passed to every detector call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionParams {
    /// Shrink step between two pyramid levels, must be > 1.
    pub scale_factor: f64,
    /// Candidates a hit needs around it to be kept.
    pub min_neighbors: i32,
    /// Smallest object size searched, in pixels.
    pub min_size: (i32, i32),
}

impl DetectionParams {
    pub fn face() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 2,
            min_size: (30, 30),
        }
    }

    pub fn smile() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 0,
            min_size: (30, 30),
        }
    }
}

/// Finds every occurrence of one learned pattern in a grayscale image.
///
/// Takes `&mut self`: implementations (cascade classifiers in particular) are
/// not safe to call from several threads, so each instance is owned by a
/// single stage.
pub trait Detector: Send {
    fn detect(&mut self, image: &GrayImage, params: &DetectionParams) -> Result<Vec<Rect>>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn detect(&mut self, image: &GrayImage, params: &DetectionParams) -> Result<Vec<Rect>> {
        (**self).detect(image, params)
    }
}

type DetectFn = Box<dyn FnMut(&GrayImage) -> Vec<Rect> + Send>;

pub struct MockDetector {
    // 按图像内容返回固定结果
    pattern: Option<DetectFn>,
    calls: Arc<AtomicUsize>,
}

impl MockDetector {
    /// A detector that never finds anything.
    pub fn new() -> Self {
        Self {
            pattern: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: FnMut(&GrayImage) -> Vec<Rect> + Send + 'static,
    {
        Self {
            pattern: Some(Box::new(pattern)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_fixed(rects: Vec<Rect>) -> Self {
        Self::with_pattern(move |_| rects.clone())
    }

    /// Shared counter of `detect` calls, readable after the detector moved away.
    pub fn call_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl Default for MockDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for MockDetector {
    fn detect(&mut self, image: &GrayImage, _params: &DetectionParams) -> Result<Vec<Rect>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .pattern
            .as_mut()
            .map(|pattern| pattern(image))
            .unwrap_or_default())
    }
}

/// Face detection on the downscaled, equalized frame, optionally repeated on
/// the mirrored image.
pub struct FaceFinder<D> {
    detector: D,
    params: DetectionParams,
    try_flip: bool,
}

impl<D: Detector> FaceFinder<D> {
    pub fn new(detector: D, params: DetectionParams, try_flip: bool) -> Self {
        Self {
            detector,
            params,
            try_flip,
        }
    }

    pub fn find(&mut self, small: &GrayImage) -> Result<Vec<Rect>> {
        let mut faces = self.detector.detect(small, &self.params)?;
        if self.try_flip {
            let flipped = mirror(small);
            let cols = small.width() as i32;
            let mirrored = self.detector.detect(&flipped, &self.params)?;
            faces.extend(mirrored.iter().map(|r| r.mirrored(cols)));
        }
        Ok(faces)
    }

    /// Like [`find`](Self::find), but a detector failure yields no faces.
    pub fn find_or_empty(&mut self, small: &GrayImage) -> Vec<Rect> {
        self.find(small).unwrap_or_else(|e| {
            warn!("⚠️ face detection failed, treating frame as empty: {}", e);
            Vec::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::SmileFaceError;
    use image::Luma;

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn detect(&mut self, _image: &GrayImage, _params: &DetectionParams) -> Result<Vec<Rect>> {
            Err(SmileFaceError::Detector("cascade not loaded".into()))
        }
    }

    #[test]
    fn test_default_params() {
        assert_eq!(DetectionParams::face().min_neighbors, 2);
        assert_eq!(DetectionParams::smile().min_neighbors, 0);
        assert_eq!(DetectionParams::smile().min_size, (30, 30));
    }

    #[test]
    fn test_mock_counts_calls() {
        let mut detector = MockDetector::with_fixed(vec![Rect::new(1, 2, 3, 4)]);
        let counter = detector.call_counter();
        let image = GrayImage::new(10, 10);

        let found = detector.detect(&image, &DetectionParams::face()).unwrap();
        assert_eq!(found, vec![Rect::new(1, 2, 3, 4)]);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_finder_without_flip_runs_once() {
        let detector = MockDetector::with_fixed(vec![Rect::new(5, 5, 30, 30)]);
        let counter = detector.call_counter();
        let mut finder = FaceFinder::new(detector, DetectionParams::face(), false);

        let faces = finder.find(&GrayImage::new(100, 80)).unwrap();
        assert_eq!(faces, vec![Rect::new(5, 5, 30, 30)]);
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_finder_maps_mirrored_hits_back() {
        // Only reports a face when the bright marker column sits on the left.
        let detector = MockDetector::with_pattern(|image: &GrayImage| {
            if image.get_pixel(0, 0).0[0] == 255 {
                vec![Rect::new(0, 10, 20, 20)]
            } else {
                vec![]
            }
        });
        let mut small = GrayImage::new(100, 50);
        small.put_pixel(99, 0, Luma([255]));

        let mut finder = FaceFinder::new(detector, DetectionParams::face(), true);
        let faces = finder.find(&small).unwrap();
        assert_eq!(faces, vec![Rect::new(80, 10, 20, 20)]);
    }

    #[test]
    fn test_find_or_empty_swallows_errors() {
        let mut finder = FaceFinder::new(FailingDetector, DetectionParams::face(), false);
        assert!(finder.find(&GrayImage::new(4, 4)).is_err());
        assert!(finder.find_or_empty(&GrayImage::new(4, 4)).is_empty());
    }
}
