//! Vehicle Perception Library
//!
//! Camera-based perception for a small autonomous ground vehicle:
//! blinking-LED detection over short capture bursts, and per-frame cone
//! detection by colour contours and multi-scale template matching.
//!
//! # Architecture
//!
//! Every camera frame fans out to two independent pipelines:
//!
//! ```text
//!                ┌─> blink::FrameCaptureWindow ──(window closes)──> BlinkFrequencyDetector ─┐
//! capture::Frame ┤                          ┌─> ContourObstacleDetector [+ annotate_frame] ──┼─> DetectionSink
//!                └─> pipeline::ObstacleWorker                                                │
//!                                           └─> TemplateMatcher (when enabled) ─────────────┘
//! ```
//!
//! - **Pipeline A** buffers frames for a fixed window after each trigger,
//!   then hands the batch once to an injected frequency detector.
//! - **Pipeline B** runs on single frames. Contour detection and template
//!   matching each hold their own busy slot: at most one of each is in
//!   flight, and a frame arriving while a slot is held is dropped for that
//!   detector only.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vehicle_perception::{
//!     blink::NullBlinkDetector,
//!     capture::{Camera, FileConfig, MockCamera},
//!     pipeline::{LogSink, PerceptionNode},
//! };
//!
//! let config = FileConfig::default();
//! let mut node =
//!     PerceptionNode::from_config(&config, Box::new(NullBlinkDetector), Arc::new(LogSink))
//!         .unwrap();
//!
//! let mut camera = MockCamera::new();
//! camera.open(&config.camera).unwrap();
//!
//! node.on_trigger();
//! for _ in 0..40 {
//!     let frame = camera.capture().unwrap();
//!     node.on_frame(frame);
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod blink;
pub mod capture;
pub mod metrics;
pub mod obstacle;
pub mod pipeline;

// Re-export commonly used types at crate root
pub use blink::{BlinkFrequencyDetector, CaptureBatch, FrameCaptureWindow, LedDetection, Mask};
pub use capture::{Camera, CameraConfig, FileConfig, Frame, MockCamera};
pub use obstacle::{
    BoundingBox, ContourObstacleDetector, ObstacleDetection, ObstacleType, TemplateMatcher,
};
pub use pipeline::{DetectionSink, ObstacleWorker, PerceptionNode};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
