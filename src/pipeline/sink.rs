//! Outbound seam for detections and telemetry.
//!
//! The transport that carries results off the vehicle is not part of this
//! crate; everything leaves through a [`DetectionSink`].

use crate::blink::{CaptureDebugInfo, LedDetectionReport};
use crate::obstacle::{DebugImage, ObstacleReport, TemplateReport};
use std::sync::{Mutex, PoisonError};

/// Receives every published result.
///
/// Implementations are called from the ingestion path and from obstacle
/// worker threads, so they must be thread-safe and should return quickly.
pub trait DetectionSink: Send + Sync {
    /// One call per completed capture cycle.
    fn publish_leds(&self, report: &LedDetectionReport);

    /// One call per frame the contour detector processed.
    fn publish_obstacles(&self, report: &ObstacleReport);

    /// One call per frame the template matcher processed.
    fn publish_template(&self, report: &TemplateReport);

    /// Annotated frames, when enabled.
    fn publish_debug_image(&self, image: &DebugImage);

    /// Capture progress and phase changes.
    fn publish_debug(&self, info: &CaptureDebugInfo);
}

/// Emits results as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DetectionSink for LogSink {
    fn publish_leds(&self, report: &LedDetectionReport) {
        tracing::info!(
            frames = report.frame_count,
            detections = report.detections.len(),
            leds = ?report.detections,
            "LED detections"
        );
    }

    fn publish_obstacles(&self, report: &ObstacleReport) {
        tracing::info!(
            sequence = report.sequence,
            detections = report.detections.len(),
            boxes = ?report
                .detections
                .iter()
                .map(|d| d.bounding_box)
                .collect::<Vec<_>>(),
            "Obstacle detections"
        );
    }

    fn publish_template(&self, report: &TemplateReport) {
        let m = &report.template_match;
        tracing::info!(
            sequence = report.sequence,
            matched = m.is_match(),
            score = ?m.best.as_ref().map(|b| b.score),
            pose = m.pose,
            elapsed_ms = report.processing_time.as_millis() as u64,
            "Template match"
        );
    }

    fn publish_debug_image(&self, image: &DebugImage) {
        tracing::debug!(
            sequence = image.sequence,
            width = image.image.width(),
            height = image.image.height(),
            "Annotated frame"
        );
    }

    fn publish_debug(&self, info: &CaptureDebugInfo) {
        tracing::debug!(
            phase = ?info.phase,
            progress = info.capture_progress,
            "Capture progress"
        );
    }
}

/// Keeps every published result in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    leds: Mutex<Vec<LedDetectionReport>>,
    obstacles: Mutex<Vec<ObstacleReport>>,
    templates: Mutex<Vec<TemplateReport>>,
    debug_images: Mutex<Vec<DebugImage>>,
    debug: Mutex<Vec<CaptureDebugInfo>>,
}

fn push<T: Clone>(slot: &Mutex<Vec<T>>, item: &T) {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(item.clone());
}

fn snapshot<T: Clone>(slot: &Mutex<Vec<T>>) -> Vec<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// LED reports published so far.
    pub fn leds(&self) -> Vec<LedDetectionReport> {
        snapshot(&self.leds)
    }

    /// Contour reports published so far.
    pub fn obstacles(&self) -> Vec<ObstacleReport> {
        snapshot(&self.obstacles)
    }

    /// Template reports published so far.
    pub fn templates(&self) -> Vec<TemplateReport> {
        snapshot(&self.templates)
    }

    /// Annotated frames published so far.
    pub fn debug_images(&self) -> Vec<DebugImage> {
        snapshot(&self.debug_images)
    }

    /// Capture telemetry published so far.
    pub fn debug(&self) -> Vec<CaptureDebugInfo> {
        snapshot(&self.debug)
    }
}

impl DetectionSink for MemorySink {
    fn publish_leds(&self, report: &LedDetectionReport) {
        push(&self.leds, report);
    }

    fn publish_obstacles(&self, report: &ObstacleReport) {
        push(&self.obstacles, report);
    }

    fn publish_template(&self, report: &TemplateReport) {
        push(&self.templates, report);
    }

    fn publish_debug_image(&self, image: &DebugImage) {
        push(&self.debug_images, image);
    }

    fn publish_debug(&self, info: &CaptureDebugInfo) {
        push(&self.debug, info);
    }
}
