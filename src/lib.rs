pub mod api;
#[cfg(feature = "opencv")]
pub mod backend;
pub mod core;
pub mod frame_pipeline;

pub use crate::core::error::{Result, SmileFaceError};

/// `RUST_LOG` picks the level, `info` when unset. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
