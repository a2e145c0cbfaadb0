//! Pipeline B: per-frame static obstacle detection.
//!
//! Two independent detectors run on single frames:
//!
//! - [`ContourObstacleDetector`] thresholds cone-coloured pixels and keeps
//!   the largest nearby contours.
//! - [`TemplateMatcher`] searches a pyramid of scaled reference templates.
//!
//! [`annotate_frame`] renders both results onto a copy of the frame for
//! debugging.

mod annotate;
mod contour;
pub mod hsv;
mod template;

pub use annotate::{annotate_frame, DebugImage, CONTOUR_BOX_COLOR, TEMPLATE_BOX_COLOR};
pub use contour::{proximity, ContourObstacleDetector, ObstacleConfig, MAX_CONTOURS};
pub use template::{
    load_template, PyramidLevel, ScaleMatch, TemplateConfig, TemplateError, TemplateMatch,
    TemplateMatcher, TemplatePyramid,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Axis-aligned box in pixel coordinates; `(x, y)` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Left column.
    pub x: u32,
    /// Top row.
    pub y: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

/// Kind of obstacle reported.
///
/// Only cones are produced; colour-based classification is not attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleType {
    /// Traffic cone.
    Cone,
}

/// A detected obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleDetection {
    /// Bounding box of the accepted contour.
    pub bounding_box: BoundingBox,
    /// Always [`ObstacleType::Cone`].
    pub obstacle_type: ObstacleType,
}

/// Contour detections for one processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct ObstacleReport {
    /// Capture timestamp of the source frame.
    pub frame_timestamp: Duration,
    /// Sequence number of the source frame.
    pub sequence: u64,
    /// Accepted cones, largest contour first.
    pub detections: Vec<ObstacleDetection>,
    /// Wall-clock publication time.
    pub published_at: DateTime<Utc>,
}

/// Template search result for one processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateReport {
    /// Capture timestamp of the source frame.
    pub frame_timestamp: Duration,
    /// Sequence number of the source frame.
    pub sequence: u64,
    /// Best match over all pyramid scales.
    pub template_match: TemplateMatch,
    /// Time spent searching.
    pub processing_time: Duration,
    /// Wall-clock publication time.
    pub published_at: DateTime<Utc>,
}
