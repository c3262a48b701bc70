//! 视频输入 / 窗口输出

use std::collections::VecDeque;

use image::{Rgb, RgbImage};

use crate::core::error::{Result, SmileFaceError};

/// Key code returned by `poll_key` for Escape.
pub const KEY_ESCAPE: i32 = 27;

/// Produces decoded colour frames in capture order.
pub trait FrameSource: Send {
    /// `Ok(None)` once the stream is exhausted.
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        (**self).next_frame()
    }
}

/// Window that shows frames and reports key presses.
pub trait FrameDisplay {
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()>;

    /// Waits up to `delay_ms` for a key press.
    fn poll_key(&mut self, delay_ms: i32) -> Result<Option<i32>>;
}

/// Escape, `q` or `Q`. Only the low byte of the key code is compared.
pub fn is_quit_key(key: i32) -> bool {
    let c = (key & 0xff) as u8;
    c == KEY_ESCAPE as u8 || c == b'q' || c == b'Q'
}

/// In-memory source serving a fixed list of frames.
pub struct MockFrameSource {
    frames: VecDeque<RgbImage>,
    fail_after: Option<usize>,
    served: usize,
}

impl MockFrameSource {
    pub fn new(frames: Vec<RgbImage>) -> Self {
        Self {
            frames: frames.into(),
            fail_after: None,
            served: 0,
        }
    }

    /// `count` solid frames whose colour encodes their position, see [`Self::index_of`].
    pub fn numbered(count: usize, width: u32, height: u32) -> Self {
        let frames = (0..count)
            .map(|i| RgbImage::from_pixel(width, height, Rgb([(i & 0xff) as u8, (i >> 8) as u8, 0])))
            .collect();
        Self::new(frames)
    }

    /// Return an error instead of the frame after `count` good ones.
    pub fn failing_after(mut self, count: usize) -> Self {
        self.fail_after = Some(count);
        self
    }

    /// Position of a frame produced by [`Self::numbered`], read from its top-right pixel.
    pub fn index_of(image: &RgbImage) -> u64 {
        let [low, high, _] = image.get_pixel(image.width() - 1, 0).0;
        low as u64 | (high as u64) << 8
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MockFrameSource {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        if self.fail_after == Some(self.served) {
            return Err(SmileFaceError::InvalidFrame(format!(
                "decoder failed at frame {}",
                self.served
            )));
        }
        let frame = self.frames.pop_front();
        if frame.is_some() {
            self.served += 1;
        }
        Ok(frame)
    }
}

/// Display double that keeps every shown frame and can script a quit key.
#[derive(Default)]
pub struct MockDisplay {
    pub shown: Vec<RgbImage>,
    pub titles: Vec<String>,
    pub polls: usize,
    quit_after: Option<usize>,
    fail_after: Option<usize>,
}

impl MockDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `q` from the first poll made once `count` frames were shown.
    pub fn quit_after(count: usize) -> Self {
        Self {
            quit_after: Some(count),
            ..Self::default()
        }
    }

    /// Fail every `show` once `count` frames were shown.
    pub fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Some(count),
            ..Self::default()
        }
    }

    pub fn shown_indices(&self) -> Vec<u64> {
        self.shown.iter().map(MockFrameSource::index_of).collect()
    }
}

impl FrameDisplay for MockDisplay {
    fn show(&mut self, title: &str, image: &RgbImage) -> Result<()> {
        if self.fail_after.is_some_and(|count| self.shown.len() >= count) {
            return Err(SmileFaceError::Display(format!(
                "window closed after {} frames",
                self.shown.len()
            )));
        }
        self.titles.push(title.to_string());
        self.shown.push(image.clone());
        Ok(())
    }

    fn poll_key(&mut self, _delay_ms: i32) -> Result<Option<i32>> {
        self.polls += 1;
        match self.quit_after {
            Some(count) if self.shown.len() >= count => Ok(Some(b'q' as i32)),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_keys() {
        assert!(is_quit_key(27));
        assert!(is_quit_key('q' as i32));
        assert!(is_quit_key('Q' as i32));
        // modifier bits above the low byte are ignored
        assert!(is_quit_key(0x100000 | 'q' as i32));
        assert!(!is_quit_key('a' as i32));
        assert!(!is_quit_key(-1));
    }

    #[test]
    fn test_numbered_source_round_trips_index() {
        let mut source = MockFrameSource::numbered(300, 4, 2);
        let mut last = None;
        while let Some(frame) = source.next_frame().unwrap() {
            last = Some(MockFrameSource::index_of(&frame));
        }
        assert_eq!(last, Some(299));
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_failing_source() {
        let mut source = MockFrameSource::numbered(5, 2, 2).failing_after(2);
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().is_err());
        assert_eq!(source.remaining(), 3);
    }

    #[test]
    fn test_mock_display_quits_after_count() {
        let mut display = MockDisplay::quit_after(1);
        assert_eq!(display.poll_key(1).unwrap(), None);
        display.show("result", &RgbImage::new(2, 2)).unwrap();
        assert_eq!(display.poll_key(1).unwrap(), Some('q' as i32));
        assert_eq!(display.titles, vec!["result".to_string()]);
    }

    #[test]
    fn test_mock_display_fails_after_count() {
        let mut display = MockDisplay::failing_after(1);
        display.show("result", &RgbImage::new(2, 2)).unwrap();
        let err = display.show("result", &RgbImage::new(2, 2)).unwrap_err();
        assert!(matches!(err, SmileFaceError::Display(_)));
        assert_eq!(display.shown.len(), 1);
    }
}
