//! 人脸标注 + 微笑强度条

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_circle_mut, draw_hollow_rect_mut};
use log::warn;

use crate::core::detector::{DetectionParams, Detector};
use crate::core::video::frame::{crop, round_half_even, FrameRecord, Rect};
use crate::core::video::smile::SmileIntensityTracker;

/// Outline colour of face `i` is `PALETTE[i % 8]`.
pub const PALETTE: [Rgb<u8>; 8] = [
    Rgb([0, 0, 255]),
    Rgb([0, 128, 255]),
    Rgb([0, 255, 255]),
    Rgb([0, 255, 0]),
    Rgb([255, 128, 0]),
    Rgb([255, 255, 0]),
    Rgb([255, 0, 0]),
    Rgb([255, 0, 255]),
];

/// Outline width of face markers, in pixels.
pub const OUTLINE_THICKNESS: i32 = 3;

/// How a detected face is outlined on the full-resolution frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceMarker {
    Circle {
        center: (i32, i32),
        radius: i32,
    },
    Rectangle {
        top_left: (i32, i32),
        bottom_right: (i32, i32),
    },
}

impl FaceMarker {
    /// Near-square faces get a circle, anything else a rectangle.
    /// `scale` maps downscaled coordinates back to the full frame.
    pub fn for_face(face: &Rect, scale: f64) -> Self {
        let (x, y) = (face.x as f64, face.y as f64);
        let (w, h) = (face.width as f64, face.height as f64);

        if is_round(face) {
            FaceMarker::Circle {
                center: (
                    round_half_even((x + w * 0.5) * scale),
                    round_half_even((y + h * 0.5) * scale),
                ),
                radius: round_half_even((w + h) * 0.25 * scale),
            }
        } else {
            FaceMarker::Rectangle {
                top_left: (round_half_even(x * scale), round_half_even(y * scale)),
                bottom_right: (
                    round_half_even((x + w - 1.0) * scale),
                    round_half_even((y + h - 1.0) * scale),
                ),
            }
        }
    }
}

/// Aspect ratio strictly inside (0.75, 1.3).
pub fn is_round(face: &Rect) -> bool {
    let aspect_ratio = face.aspect_ratio();
    0.75 < aspect_ratio && aspect_ratio < 1.3
}

pub fn draw_marker(image: &mut RgbImage, marker: &FaceMarker, color: Rgb<u8>) {
    let spread = OUTLINE_THICKNESS / 2;
    match *marker {
        FaceMarker::Circle { center, radius } => {
            for r in (radius - spread)..=(radius + spread) {
                if r >= 0 {
                    draw_hollow_circle_mut(image, center, r, color);
                }
            }
        }
        FaceMarker::Rectangle {
            top_left,
            bottom_right,
        } => {
            for grow in -spread..=spread {
                let x = top_left.0 - grow;
                let y = top_left.1 - grow;
                let width = bottom_right.0 - top_left.0 + 1 + 2 * grow;
                let height = bottom_right.1 - top_left.1 + 1 + 2 * grow;
                if width > 0 && height > 0 {
                    let rect = imageproc::rect::Rect::at(x, y).of_size(width as u32, height as u32);
                    draw_hollow_rect_mut(image, rect, color);
                }
            }
        }
    }
}

/// Filled bar on the left tenth of the frame, rising from the bottom edge
/// in proportion to `intensity`, blue scaled by the same factor.
pub fn draw_intensity_bar(image: &mut RgbImage, intensity: f32) {
    let (cols, rows) = (image.width() as i32, image.height() as i32);
    let bar_height = round_half_even(rows as f64 * intensity as f64);
    if bar_height <= 0 || cols == 0 {
        return;
    }

    let blue = (255.0 * intensity).round().clamp(0.0, 255.0) as u8;
    let rect = imageproc::rect::Rect::at(0, rows - bar_height)
        .of_size((cols / 10 + 1) as u32, bar_height as u32);
    draw_filled_rect_mut(image, rect, Rgb([0, 0, blue]));
}

/// What one call to [`FaceAnnotator::annotate`] drew.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationSummary {
    pub circles: usize,
    pub rectangles: usize,
    pub smile_counts: Vec<usize>,
    pub last_intensity: Option<f32>,
}

impl AnnotationSummary {
    pub fn markers(&self) -> usize {
        self.circles + self.rectangles
    }
}

/// Outlines faces and runs the smile detector on the lower half of each.
/// Owns the smile tracker, so one annotator serves one stream.
pub struct FaceAnnotator<D> {
    smile_detector: D,
    params: DetectionParams,
    scale: f64,
    tracker: SmileIntensityTracker,
}

impl<D: Detector> FaceAnnotator<D> {
    pub fn new(smile_detector: D, params: DetectionParams, scale: f64) -> Self {
        Self {
            smile_detector,
            params,
            scale,
            tracker: SmileIntensityTracker::new(),
        }
    }

    pub fn tracker(&self) -> &SmileIntensityTracker {
        &self.tracker
    }

    pub fn annotate(
        &mut self,
        image: &mut RgbImage,
        small: &GrayImage,
        faces: &[Rect],
    ) -> AnnotationSummary {
        let mut summary = AnnotationSummary::default();

        for (i, face) in faces.iter().enumerate() {
            let marker = FaceMarker::for_face(face, self.scale);
            match marker {
                FaceMarker::Circle { .. } => summary.circles += 1,
                FaceMarker::Rectangle { .. } => summary.rectangles += 1,
            }
            draw_marker(image, &marker, PALETTE[i % PALETTE.len()]);

            let smiles = self.count_smiles(small, face);
            let intensity = self.tracker.observe(smiles);
            draw_intensity_bar(image, intensity);

            summary.smile_counts.push(smiles);
            summary.last_intensity = Some(intensity);
        }

        summary
    }

    pub fn annotate_record(&mut self, record: &mut FrameRecord) -> AnnotationSummary {
        let summary = self.annotate(&mut record.image, &record.small, &record.faces);
        record.mark_annotated(summary.smile_counts.clone());
        summary
    }

    fn count_smiles(&mut self, small: &GrayImage, face: &Rect) -> usize {
        let mouth = face.lower_half();
        if mouth.is_empty() {
            return 0;
        }
        let Some(patch) = crop(small, &mouth) else {
            return 0;
        };

        match self.smile_detector.detect(&patch, &self.params) {
            Ok(smiles) => smiles.len(),
            Err(e) => {
                warn!("⚠️ smile detection failed: {}", e);
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::detector::MockDetector;
    use std::sync::atomic::Ordering;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_square_face_gets_circle() {
        let marker = FaceMarker::for_face(&Rect::new(10, 10, 40, 40), 2.0);
        assert_eq!(
            marker,
            FaceMarker::Circle {
                center: (60, 60),
                radius: 40
            }
        );
    }

    #[test]
    fn test_tall_face_gets_rectangle() {
        let marker = FaceMarker::for_face(&Rect::new(10, 10, 20, 40), 2.0);
        assert_eq!(
            marker,
            FaceMarker::Rectangle {
                top_left: (20, 20),
                bottom_right: (58, 98)
            }
        );
    }

    #[test]
    fn test_aspect_band_is_exclusive() {
        assert!(!is_round(&Rect::new(0, 0, 3, 4))); // 0.75
        assert!(!is_round(&Rect::new(0, 0, 13, 10))); // 1.3
        assert!(is_round(&Rect::new(0, 0, 4, 4)));
        assert!(is_round(&Rect::new(0, 0, 12, 10)));
        assert!(is_round(&Rect::new(0, 0, 76, 100)));
        assert!(!is_round(&Rect::new(0, 0, 74, 100)));
    }

    #[test]
    fn test_draw_circle_touches_outline() {
        let mut image = RgbImage::new(100, 100);
        let marker = FaceMarker::Circle {
            center: (50, 50),
            radius: 20,
        };
        draw_marker(&mut image, &marker, PALETTE[3]);

        assert_eq!(*image.get_pixel(50, 30), PALETTE[3]);
        assert_eq!(*image.get_pixel(50, 29), PALETTE[3]);
        assert_eq!(*image.get_pixel(50, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_rectangle_is_three_wide() {
        let mut image = RgbImage::new(100, 100);
        let marker = FaceMarker::Rectangle {
            top_left: (20, 20),
            bottom_right: (60, 80),
        };
        draw_marker(&mut image, &marker, PALETTE[0]);

        for x in 19..=21 {
            assert_eq!(*image.get_pixel(x, 50), PALETTE[0]);
        }
        assert_eq!(*image.get_pixel(22, 50), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(40, 50), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_intensity_bar_geometry() {
        let mut image = RgbImage::new(100, 50);
        draw_intensity_bar(&mut image, 0.5);

        assert_eq!(*image.get_pixel(0, 49), Rgb([0, 0, 128]));
        assert_eq!(*image.get_pixel(10, 25), Rgb([0, 0, 128]));
        assert_eq!(*image.get_pixel(11, 49), Rgb([0, 0, 0]));
        assert_eq!(*image.get_pixel(0, 24), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_zero_intensity_draws_nothing() {
        let mut image = RgbImage::new(40, 40);
        draw_intensity_bar(&mut image, 0.0);
        assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
    }

    #[test]
    fn test_annotator_without_faces_leaves_frame_alone() {
        let smiles = MockDetector::with_fixed(vec![Rect::new(0, 0, 1, 1)]);
        let calls = smiles.call_counter();
        let mut annotator = FaceAnnotator::new(smiles, DetectionParams::smile(), 2.0);

        let original = RgbImage::from_pixel(64, 48, Rgb([9, 9, 9]));
        let mut image = original.clone();
        let summary = annotator.annotate(&mut image, &GrayImage::new(32, 24), &[]);

        assert_eq!(summary, AnnotationSummary::default());
        assert_eq!(image, original);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
        assert_eq!(annotator.tracker().range(), None);
    }

    #[test]
    fn test_annotator_detects_smiles_in_lower_half() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_detector = Arc::clone(&seen);
        let smiles = MockDetector::with_pattern(move |patch: &GrayImage| {
            seen_in_detector.lock().unwrap().push(patch.dimensions());
            vec![Rect::new(0, 0, 5, 5), Rect::new(3, 0, 5, 5)]
        });
        let mut annotator = FaceAnnotator::new(smiles, DetectionParams::smile(), 2.0);

        let mut image = RgbImage::new(200, 200);
        let small = GrayImage::new(100, 100);
        let faces = [Rect::new(10, 10, 40, 40), Rect::new(60, 10, 20, 40)];
        let summary = annotator.annotate(&mut image, &small, &faces);

        assert_eq!(summary.circles, 1);
        assert_eq!(summary.rectangles, 1);
        assert_eq!(summary.smile_counts, vec![2, 2]);
        assert_eq!(summary.last_intensity, Some(0.0));
        assert_eq!(*seen.lock().unwrap(), vec![(40, 19), (20, 19)]);
    }

    #[test]
    fn test_annotate_record_advances_state() {
        let mut annotator = FaceAnnotator::new(MockDetector::new(), DetectionParams::smile(), 2.0);
        let mut record = FrameRecord::acquired(0, RgbImage::new(20, 20));
        record.to_grayscale();
        record.downscale(2.0);
        record.equalize();
        record.set_faces(vec![Rect::new(1, 1, 8, 8)]);

        let summary = annotator.annotate_record(&mut record);
        assert_eq!(summary.circles, 1);
        assert_eq!(record.smile_counts, vec![0]);
        assert_eq!(
            record.state(),
            crate::core::video::state_machine::FrameState::Annotated
        );
    }
}
