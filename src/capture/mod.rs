//! Camera input and frame handling.
//!
//! This module provides abstractions for capturing frames from a camera
//! and the configuration file that drives the whole node.

mod camera;
mod config;
mod frame;

#[cfg(feature = "camera")]
pub use camera::NokhwaCamera;
pub use camera::{Camera, CameraError, MockCamera, MOCK_CONE_COLOR};
pub use config::{CameraConfig, ConfigError, FileConfig, OutputConfig};
pub use frame::Frame;
