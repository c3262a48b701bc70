pub mod config;
pub mod detector;
pub mod error;
pub mod media;
pub mod video;

pub use config::AppConfig;
pub use error::{Result, SmileFaceError};
