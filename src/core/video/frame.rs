use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};

use super::state_machine::FrameState;

/// Axis-aligned region in downscaled image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }

    /// The same region seen in a horizontally mirrored image of `image_width` columns.
    pub fn mirrored(&self, image_width: i32) -> Rect {
        Rect::new(
            image_width - self.x - self.width,
            self.y,
            self.width,
            self.height,
        )
    }

    /// Lower half of the region, where a mouth is expected inside a face.
    pub fn lower_half(&self) -> Rect {
        let half = round_half_even(self.height as f64 / 2.0);
        Rect::new(self.x, self.y + half, self.width, half - 1)
    }

    /// Intersection with a `width` x `height` image, `None` when nothing is left.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<Rect> {
        let x0 = self.x.max(0);
        let y0 = self.y.max(0);
        let x1 = (self.x + self.width).min(width as i32);
        let y1 = (self.y + self.height).min(height as i32);
        let clipped = Rect::new(x0, y0, x1 - x0, y1 - y0);
        if clipped.is_empty() {
            None
        } else {
            Some(clipped)
        }
    }
}

/// Rounding used for every pixel coordinate derived from a detection.
pub fn round_half_even(value: f64) -> i32 {
    value.round_ties_even() as i32
}

/// 一帧在各处理步骤之间传递的全部数据
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub index: u64,
    pub image: RgbImage,
    pub gray: GrayImage,
    pub small: GrayImage,
    pub faces: Vec<Rect>,
    pub smile_counts: Vec<usize>,
    state: FrameState,
}

impl FrameRecord {
    pub fn acquired(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            image,
            gray: GrayImage::new(0, 0),
            small: GrayImage::new(0, 0),
            faces: Vec::new(),
            smile_counts: Vec::new(),
            state: FrameState::Acquired,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn to_grayscale(&mut self) {
        self.gray = grayscale(&self.image);
        self.advance(FrameState::Grayscaled);
    }

    pub fn downscale(&mut self, scale: f64) {
        self.small = downscale(&self.gray, scale);
        self.advance(FrameState::Resized);
    }

    pub fn equalize(&mut self) {
        self.small = equalize(&self.small);
        self.advance(FrameState::Equalized);
    }

    pub fn set_faces(&mut self, faces: Vec<Rect>) {
        self.faces = faces;
        self.advance(FrameState::FacesDetected);
    }

    pub fn mark_annotated(&mut self, smile_counts: Vec<usize>) {
        self.smile_counts = smile_counts;
        self.advance(FrameState::Annotated);
    }

    pub fn mark_delivered(&mut self) {
        self.advance(FrameState::Delivered);
    }

    pub fn mark_dropped(&mut self) {
        if !self.state.is_terminal() {
            self.advance(FrameState::Dropped);
        }
    }

    fn advance(&mut self, target: FrameState) {
        self.state = self.state.transition(target);
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114 + 500) / 1000) as u8
}

pub fn grayscale(image: &RgbImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b] = image.get_pixel(x, y).0;
        Luma([luma(r, g, b)])
    })
}

/// Shrink by `scale` (2.0 halves each side). Target size is rounded, never below 1x1.
pub fn downscale(gray: &GrayImage, scale: f64) -> GrayImage {
    let target_width = round_half_even(gray.width() as f64 / scale).max(1) as u32;
    let target_height = round_half_even(gray.height() as f64 / scale).max(1) as u32;
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    imageops::resize(gray, target_width, target_height, FilterType::Triangle)
}

pub fn equalize(gray: &GrayImage) -> GrayImage {
    if gray.width() == 0 || gray.height() == 0 {
        return gray.clone();
    }
    imageproc::contrast::equalize_histogram(gray)
}

pub fn mirror(gray: &GrayImage) -> GrayImage {
    imageops::flip_horizontal(gray)
}

/// Copy of the part of `gray` covered by `rect`, clipped to the image.
pub fn crop(gray: &GrayImage, rect: &Rect) -> Option<GrayImage> {
    let clipped = rect.clip_to(gray.width(), gray.height())?;
    Some(
        imageops::crop_imm(
            gray,
            clipped.x as u32,
            clipped.y as u32,
            clipped.width as u32,
            clipped.height as u32,
        )
        .to_image(),
    )
}
