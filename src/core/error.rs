use thiserror::Error;

#[derive(Debug, Error)]
pub enum SmileFaceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Config(#[from] json5::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Config value error: {0}")]
    ConfigValue(String),
    #[error("Could not initiate capture: {0}")]
    CaptureOpen(String),
    #[error("Cascade load failed: {0}")]
    CascadeLoad(String),
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
    #[error("Detector error: {0}")]
    Detector(String),
    #[error("Display error: {0}")]
    Display(String),
    #[error("Hand-off queue disconnected")]
    QueueDisconnected,
    #[error("Pipeline stage '{0}' panicked")]
    StagePanicked(String),
    #[error("Executor error: {0}")]
    Executor(String),
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),
}

pub type Result<T> = std::result::Result<T, SmileFaceError>;
