use std::path::PathBuf;

use moodlens_core::SmoothingLevel;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing the ONNX expression model.
    pub model_dir: PathBuf,
    /// Minimum wall-clock gap between inference cycles.
    pub throttle_ms: u64,
    /// Initial smoothing preset (low/medium/high).
    pub smoothing: SmoothingLevel,
    /// Include the selected face box in published payloads.
    pub overlay: bool,
    /// Include per-category percentages in published payloads.
    pub advanced_stats: bool,
}

impl Config {
    /// Load configuration from `MOODLENS_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let model_dir = std::env::var("MOODLENS_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_model_dir());

        Self {
            camera_device: std::env::var("MOODLENS_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_dir,
            throttle_ms: env_u64("MOODLENS_THROTTLE_MS", 200),
            smoothing: std::env::var("MOODLENS_SMOOTHING")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
            overlay: env_bool("MOODLENS_OVERLAY", true),
            advanced_stats: env_bool("MOODLENS_ADVANCED_STATS", false),
        }
    }

    /// Path to the expression model file.
    pub fn model_path(&self) -> String {
        self.model_dir
            .join("expression.onnx")
            .to_string_lossy()
            .into_owned()
    }
}

fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("moodlens/models")
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key).map(|v| v != "0").unwrap_or(default)
}
