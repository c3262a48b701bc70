//! OpenCV 后端（需要 `opencv` feature）

pub mod opencv;

pub use self::opencv::{CascadeDetector, HighGuiDisplay, OpenCvCapture};
