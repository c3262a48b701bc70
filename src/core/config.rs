use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::detector::DetectionParams;
use crate::core::error::{Result, SmileFaceError};

/// Optional override file, looked up in the working directory.
pub const CONFIG_FILE: &str = "smile_face.json5";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub face_cascade: PathBuf,
    pub smile_cascade: PathBuf,
    pub input: PathBuf,
    /// Downscale factor applied before detection.
    pub scale: f64,
    /// Also detect on the mirrored frame.
    pub try_flip: bool,
    pub window_title: String,
    /// Finished frames waiting for the display loop.
    pub queue_capacity: usize,
    /// Frames buffered between two pipeline stages.
    pub link_capacity: usize,
    pub face_params: DetectionParams,
    pub smile_params: DetectionParams,
    /// Per-stage timing summary is written here as JSON when set.
    pub timing_report: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::sequential()
    }
}

impl AppConfig {
    pub fn sequential() -> Self {
        Self {
            face_cascade: PathBuf::from("haarcascade_frontalface_alt.xml"),
            smile_cascade: PathBuf::from("haarcascade_smile.xml"),
            input: PathBuf::from("test.mp4"),
            scale: 2.0,
            try_flip: false,
            window_title: "result".to_string(),
            queue_capacity: 2,
            link_capacity: 1,
            face_params: DetectionParams::face(),
            smile_params: DetectionParams::smile(),
            timing_report: None,
        }
    }

    pub fn staged() -> Self {
        Self {
            input: PathBuf::from("short_test.mp4"),
            ..Self::sequential()
        }
    }

    /// `defaults` overridden by the keys of the JSON5 file at `path`, if it exists.
    pub fn load(path: &Path, defaults: AppConfig) -> Result<Self> {
        if !path.exists() {
            return Ok(defaults);
        }
        info!("⚙️ Loading config overrides from {:?}", path);
        let text = fs::read_to_string(path)?;
        Self::from_json5(&text, defaults)
    }

    pub fn from_json5(text: &str, defaults: AppConfig) -> Result<Self> {
        let overrides: Value = json5::from_str(text)?;
        if !overrides.is_object() {
            return Err(SmileFaceError::ConfigValue(
                "top level must be an object".to_string(),
            ));
        }

        let mut merged = serde_json::to_value(&defaults)?;
        merge(&mut merged, overrides);
        let config: AppConfig = serde_json::from_value(merged)
            .map_err(|e| SmileFaceError::ConfigValue(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.scale.is_finite() && self.scale > 0.0) {
            return Err(SmileFaceError::ConfigValue(format!(
                "scale must be positive, got {}",
                self.scale
            )));
        }
        if self.queue_capacity == 0 || self.link_capacity == 0 {
            return Err(SmileFaceError::ConfigValue(
                "queue_capacity and link_capacity must be at least 1".to_string(),
            ));
        }
        for (name, params) in [("face_params", &self.face_params), ("smile_params", &self.smile_params)] {
            if !(params.scale_factor.is_finite() && params.scale_factor > 1.0) {
                return Err(SmileFaceError::ConfigValue(format!(
                    "{}.scale_factor must be > 1, got {}",
                    name, params.scale_factor
                )));
            }
            if params.min_neighbors < 0 {
                return Err(SmileFaceError::ConfigValue(format!(
                    "{}.min_neighbors must not be negative",
                    name
                )));
            }
            if params.min_size.0 < 0 || params.min_size.1 < 0 {
                return Err(SmileFaceError::ConfigValue(format!(
                    "{}.min_size must not be negative, got {:?}",
                    name, params.min_size
                )));
            }
        }
        Ok(())
    }
}

/// Objects merge key by key, everything else is replaced.
fn merge(base: &mut Value, overrides: Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
