//! Camera abstraction for frame capture.
//!
//! This module provides a trait-based abstraction over camera hardware,
//! allowing for both real camera input and mock implementations for testing.

use super::{CameraConfig, Frame};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_filled_rect_mut};
use imageproc::rect::Rect;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during camera operations.
#[derive(Debug, Error)]
pub enum CameraError {
    /// No device at the configured index.
    #[error("camera device not found: {0}")]
    DeviceNotFound(String),
    /// The device refused to start streaming.
    #[error("failed to open camera: {0}")]
    OpenFailed(String),
    /// The configuration was rejected.
    #[error("failed to configure camera: {0}")]
    ConfigFailed(String),
    /// A frame could not be read or decoded.
    #[error("failed to capture frame: {0}")]
    CaptureFailed(String),
    /// `capture` was called before `open`.
    #[error("camera not initialized")]
    NotInitialized,
}

/// Trait for camera implementations.
///
/// This abstraction allows swapping between real camera hardware
/// and mock implementations for testing.
pub trait Camera {
    /// Opens and initializes the camera with the given configuration.
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError>;

    /// Captures a single frame.
    fn capture(&mut self) -> Result<Frame, CameraError>;

    /// Checks if the camera is currently open.
    fn is_open(&self) -> bool;

    /// Closes the camera and releases resources.
    fn close(&mut self);
}

/// Colour of the synthetic cone block (orange, hue ≈ 15 on the 0..180 scale).
pub const MOCK_CONE_COLOR: Rgb<u8> = Rgb([255, 128, 0]);

/// Mock camera that renders a synthetic road scene.
///
/// Every frame shows an orange 40×40 block at (100, 200) and a white LED
/// spot that blinks at `led_frequency_hz`. Timestamps come from a simulated
/// clock advancing by `1 / fps` per frame, so runs are reproducible.
#[derive(Debug)]
pub struct MockCamera {
    config: Option<CameraConfig>,
    sequence: u64,
    led_frequency_hz: f64,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self {
            config: None,
            sequence: 0,
            led_frequency_hz: 4.1,
        }
    }
}

impl MockCamera {
    /// Creates a closed mock camera with a 4.1 Hz LED.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mock camera whose LED blinks at the given frequency.
    pub fn with_led_frequency(led_frequency_hz: f64) -> Self {
        Self {
            led_frequency_hz,
            ..Self::default()
        }
    }

    fn render(config: &CameraConfig, t: f64, led_frequency_hz: f64) -> RgbImage {
        let mut image = RgbImage::new(config.width, config.height);

        draw_filled_rect_mut(&mut image, Rect::at(100, 200).of_size(40, 40), MOCK_CONE_COLOR);

        let led_on = (2.0 * std::f64::consts::PI * led_frequency_hz * t).sin() >= 0.0;
        if led_on {
            let center = ((config.width * 3 / 4) as i32, (config.height / 4) as i32);
            draw_filled_circle_mut(&mut image, center, 4, Rgb([255, 255, 255]));
        }

        image
    }
}

impl Camera for MockCamera {
    fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;
        self.config = Some(config.clone());
        self.sequence = 0;
        tracing::info!("MockCamera opened with config: {:?}", config);
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        let config = self.config.as_ref().ok_or(CameraError::NotInitialized)?;

        let timestamp = Duration::from_secs_f64(self.sequence as f64 / config.fps as f64);
        let image = Self::render(config, timestamp.as_secs_f64(), self.led_frequency_hz);

        self.sequence += 1;
        Ok(Frame::new(image, timestamp, self.sequence))
    }

    fn is_open(&self) -> bool {
        self.config.is_some()
    }

    fn close(&mut self) {
        self.config = None;
        tracing::info!("MockCamera closed");
    }
}

#[cfg(feature = "camera")]
pub use native::NokhwaCamera;

#[cfg(feature = "camera")]
mod native {
    use super::{Camera, CameraError};
    use crate::capture::{CameraConfig, Frame};
    use nokhwa::pixel_format::RgbFormat;
    use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
    use std::time::Instant;

    /// Camera backed by the platform's native capture API.
    ///
    /// Timestamps are measured from the moment the stream was opened.
    #[derive(Default)]
    pub struct NokhwaCamera {
        inner: Option<nokhwa::Camera>,
        origin: Option<Instant>,
        sequence: u64,
    }

    impl NokhwaCamera {
        /// Creates a closed camera.
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Camera for NokhwaCamera {
        fn open(&mut self, config: &CameraConfig) -> Result<(), CameraError> {
            config
                .validate()
                .map_err(|e| CameraError::ConfigFailed(e.to_string()))?;

            let format =
                RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
            let mut camera = nokhwa::Camera::new(CameraIndex::Index(config.device_id), format)
                .map_err(|e| CameraError::DeviceNotFound(e.to_string()))?;
            camera
                .open_stream()
                .map_err(|e| CameraError::OpenFailed(e.to_string()))?;

            tracing::info!(device = config.device_id, "Native camera opened");
            self.inner = Some(camera);
            self.origin = Some(Instant::now());
            self.sequence = 0;
            Ok(())
        }

        fn capture(&mut self) -> Result<Frame, CameraError> {
            let camera = self.inner.as_mut().ok_or(CameraError::NotInitialized)?;
            let origin = self.origin.ok_or(CameraError::NotInitialized)?;

            let buffer = camera
                .frame()
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
            let timestamp = origin.elapsed();
            let decoded = buffer
                .decode_image::<RgbFormat>()
                .map_err(|e| CameraError::CaptureFailed(e.to_string()))?;
            let (width, height) = decoded.dimensions();

            self.sequence += 1;
            Frame::from_raw(decoded.into_raw(), width, height, timestamp, self.sequence)
                .ok_or_else(|| CameraError::CaptureFailed("decoded buffer size mismatch".into()))
        }

        fn is_open(&self) -> bool {
            self.inner.is_some()
        }

        fn close(&mut self) {
            if let Some(mut camera) = self.inner.take() {
                if let Err(e) = camera.stop_stream() {
                    tracing::warn!("Failed to stop camera stream: {}", e);
                }
            }
            self.origin = None;
            tracing::info!("Native camera closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_camera_lifecycle() {
        let mut camera = MockCamera::new();
        let config = CameraConfig::default();

        assert!(!camera.is_open());

        camera.open(&config).unwrap();
        assert!(camera.is_open());

        let frame = camera.capture().unwrap();
        assert!(frame.is_valid());
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.timestamp(), Duration::ZERO);

        let frame2 = camera.capture().unwrap();
        assert_eq!(frame2.sequence(), 2);
        assert!(frame2.timestamp() > frame.timestamp());

        camera.close();
        assert!(!camera.is_open());
    }

    #[test]
    fn test_capture_without_open() {
        let mut camera = MockCamera::new();
        assert!(matches!(
            camera.capture(),
            Err(CameraError::NotInitialized)
        ));
    }

    #[test]
    fn test_mock_scene_contains_cone_block() {
        let mut camera = MockCamera::new();
        camera.open(&CameraConfig::default()).unwrap();
        let frame = camera.capture().unwrap();

        assert_eq!(*frame.image().get_pixel(120, 220), MOCK_CONE_COLOR);
        assert_eq!(*frame.image().get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_mock_led_blinks() {
        let config = CameraConfig::default();
        let mut camera = MockCamera::with_led_frequency(5.0);
        camera.open(&config).unwrap();

        let led = (config.width * 3 / 4, config.height / 4);
        let states: Vec<bool> = (0..12)
            .map(|_| {
                let frame = camera.capture().unwrap();
                frame.image().get_pixel(led.0, led.1)[2] == 255
            })
            .collect();

        assert!(states.iter().any(|&on| on));
        assert!(states.iter().any(|&on| !on));
    }
}
