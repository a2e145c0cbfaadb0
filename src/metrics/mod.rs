//! Prometheus metrics for the perception node.
//!
//! # Metrics Exposed
//!
//! ## Capture Window
//! - `perception_capture_triggers_total` - Triggers received
//! - `perception_capture_frames_total` - Frames appended to batches
//! - `perception_capture_frames_rejected_total` - Frames refused (clock regression, reordering, size change)
//! - `perception_capture_batches_discarded_total` - Batches discarded by a trigger
//! - `perception_capture_cycles_total` - Capture windows closed
//! - `perception_capture_buffered_frames` - Frames in the open batch
//! - `perception_led_reports_total` / `perception_led_detections_total`
//!
//! ## Obstacle Worker
//! - `perception_obstacle_frames_submitted_total`
//! - `perception_obstacle_frames_dropped_total` - Dropped while a contour detection was in flight
//! - `perception_obstacle_frames_processed_total`
//! - `perception_obstacle_detections_total`
//!
//! ## Template Matcher
//! - `perception_template_frames_processed_total`
//! - `perception_template_frames_dropped_total` - Skipped while a search was in flight
//! - `perception_template_matches_total`
//!
//! The HTTP exporter is available with the `metrics` feature.

mod collector;
#[cfg(feature = "metrics")]
mod server;

pub use collector::{MetricsError, MetricsRegistry, MetricsSnapshot};
#[cfg(feature = "metrics")]
pub use server::{MetricsServer, MetricsServerConfig, ServerError};
