//! Camera and node configuration.
//!
//! The TOML file mirrors the node's parameter namespace: one section per
//! component, every field defaulted so a partial file is valid.

use crate::blink::CaptureWindowConfig;
use crate::obstacle::{ObstacleConfig, TemplateConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for camera capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Camera device index.
    pub device_id: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device_id: 0,
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl CameraConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Zero width or height.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1..=120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Capture duration not a positive, representable number of seconds.
    #[error("capture duration must be a positive number of seconds, got {0}")]
    InvalidCaptureDuration(f64),
    /// Empty frequency list, or a non-positive or non-finite entry.
    #[error("candidate frequencies must be non-empty, finite and positive")]
    InvalidFrequencies,
    /// Zero pyramid levels.
    #[error("pyramid level count must be at least 1")]
    InvalidPyramidLevels,
    /// Acceptance threshold outside (0, 1].
    #[error("match acceptance threshold {0} outside (0, 1]")]
    InvalidMatchThreshold(f64),
    /// Non-positive proximity limit.
    #[error("obstacle proximity limit must be positive, got {0}")]
    InvalidProximity(f64),
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[camera]`
    #[serde(default)]
    pub camera: CameraConfig,
    /// `[capture]`
    #[serde(default)]
    pub capture: CaptureWindowConfig,
    /// `[template]`
    #[serde(default)]
    pub template: TemplateConfig,
    /// `[obstacle]`
    #[serde(default)]
    pub obstacle: ObstacleConfig,
    /// `[output]`
    #[serde(default)]
    pub output: OutputConfig,
}

/// Output and run-loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Run continuously (true) or process a fixed number of frames (false).
    pub continuous: bool,
    /// Number of frames to process if not continuous.
    pub frame_count: u32,
    /// Re-trigger the capture window every N frames (0 triggers once at start).
    pub trigger_every: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
    /// Publish annotated copies of processed frames.
    pub debug_image: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            continuous: false,
            frame_count: 120,
            trigger_every: 0,
            metrics_port: 9090,
            debug_image: false,
        }
    }
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.camera.validate()?;
        self.capture.validate()?;
        self.template.validate()?;
        self.obstacle.validate()?;
        Ok(())
    }
}
