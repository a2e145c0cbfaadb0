//! Metrics collection and registry.

use crate::blink::WindowStats;
use crate::pipeline::WorkerCounts;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use thiserror::Error;

/// Errors that can occur during metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Registration or encoding failed.
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

/// A snapshot of node state for metrics update.
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    /// Triggers received by the capture window.
    pub triggers: u64,
    /// Frames appended to capture batches.
    pub capture_frames: u64,
    /// Frames refused by an open batch.
    pub capture_frames_rejected: u64,
    /// Batches discarded by a trigger.
    pub batches_discarded: u64,
    /// Capture windows that closed.
    pub cycles_completed: u64,
    /// LED reports published.
    pub led_reports: u64,
    /// LED detections published.
    pub led_detections: u64,
    /// Frames buffered in the open batch.
    pub capture_buffered: usize,
    /// Frames offered to the obstacle worker.
    pub obstacle_frames_submitted: u64,
    /// Frames dropped because a detection was in flight.
    pub obstacle_frames_dropped: u64,
    /// Frames the obstacle worker finished.
    pub obstacle_frames_processed: u64,
    /// Obstacle detections published.
    pub obstacle_detections: u64,
    /// Frames the template matcher skipped because it was busy.
    pub template_frames_dropped: u64,
    /// Frames the template matcher finished.
    pub template_frames_processed: u64,
    /// Accepted template matches.
    pub template_matches: u64,
}

impl MetricsSnapshot {
    /// Creates a snapshot from component statistics.
    pub fn from_components(window: &WindowStats, buffered: usize, worker: &WorkerCounts) -> Self {
        Self {
            triggers: window.triggers,
            capture_frames: window.frames_captured,
            capture_frames_rejected: window.frames_rejected,
            batches_discarded: window.batches_discarded,
            cycles_completed: window.cycles_completed,
            led_reports: window.reports_published,
            led_detections: window.led_detections,
            capture_buffered: buffered,
            obstacle_frames_submitted: worker.submitted,
            obstacle_frames_dropped: worker.dropped_busy + worker.spawn_failures,
            obstacle_frames_processed: worker.processed,
            obstacle_detections: worker.detections,
            template_frames_dropped: worker.template_dropped_busy,
            template_frames_processed: worker.template_processed,
            template_matches: worker.template_matches,
        }
    }
}

/// Prometheus metrics registry for the perception node.
pub struct MetricsRegistry {
    registry: Registry,

    // Capture window metrics
    triggers: IntCounter,
    capture_frames: IntCounter,
    capture_frames_rejected: IntCounter,
    batches_discarded: IntCounter,
    cycles_completed: IntCounter,
    led_reports: IntCounter,
    led_detections: IntCounter,
    capture_buffered: IntGauge,

    // Obstacle worker metrics
    obstacle_frames_submitted: IntCounter,
    obstacle_frames_dropped: IntCounter,
    obstacle_frames_processed: IntCounter,
    obstacle_detections: IntCounter,

    // Template matcher metrics
    template_frames_dropped: IntCounter,
    template_frames_processed: IntCounter,
    template_matches: IntCounter,
}

/// Raises a counter to a monotonically increasing total.
fn advance(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}

impl MetricsRegistry {
    /// Creates a new metrics registry with all node metrics registered.
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let triggers = IntCounter::new(
            "perception_capture_triggers_total",
            "Triggers received by the capture window",
        )?;
        let capture_frames = IntCounter::new(
            "perception_capture_frames_total",
            "Frames appended to capture batches",
        )?;
        let capture_frames_rejected = IntCounter::new(
            "perception_capture_frames_rejected_total",
            "Frames refused by an open capture batch",
        )?;
        let batches_discarded = IntCounter::new(
            "perception_capture_batches_discarded_total",
            "Capture batches discarded by a trigger",
        )?;
        let cycles_completed = IntCounter::new(
            "perception_capture_cycles_total",
            "Capture windows closed",
        )?;
        let led_reports = IntCounter::new(
            "perception_led_reports_total",
            "LED detection reports published",
        )?;
        let led_detections = IntCounter::new(
            "perception_led_detections_total",
            "LED detections published",
        )?;
        let capture_buffered = IntGauge::new(
            "perception_capture_buffered_frames",
            "Frames buffered in the open capture batch",
        )?;

        let obstacle_frames_submitted = IntCounter::new(
            "perception_obstacle_frames_submitted_total",
            "Frames offered to the obstacle worker",
        )?;
        let obstacle_frames_dropped = IntCounter::new(
            "perception_obstacle_frames_dropped_total",
            "Frames dropped while a detection was in flight",
        )?;
        let obstacle_frames_processed = IntCounter::new(
            "perception_obstacle_frames_processed_total",
            "Frames processed by the obstacle worker",
        )?;
        let obstacle_detections = IntCounter::new(
            "perception_obstacle_detections_total",
            "Obstacle detections published",
        )?;

        let template_frames_dropped = IntCounter::new(
            "perception_template_frames_dropped_total",
            "Frames skipped while a template search was in flight",
        )?;
        let template_frames_processed = IntCounter::new(
            "perception_template_frames_processed_total",
            "Frames searched by the template matcher",
        )?;
        let template_matches = IntCounter::new(
            "perception_template_matches_total",
            "Template searches that cleared the acceptance threshold",
        )?;

        registry.register(Box::new(triggers.clone()))?;
        registry.register(Box::new(capture_frames.clone()))?;
        registry.register(Box::new(capture_frames_rejected.clone()))?;
        registry.register(Box::new(batches_discarded.clone()))?;
        registry.register(Box::new(cycles_completed.clone()))?;
        registry.register(Box::new(led_reports.clone()))?;
        registry.register(Box::new(led_detections.clone()))?;
        registry.register(Box::new(capture_buffered.clone()))?;
        registry.register(Box::new(obstacle_frames_submitted.clone()))?;
        registry.register(Box::new(obstacle_frames_dropped.clone()))?;
        registry.register(Box::new(obstacle_frames_processed.clone()))?;
        registry.register(Box::new(obstacle_detections.clone()))?;
        registry.register(Box::new(template_frames_dropped.clone()))?;
        registry.register(Box::new(template_frames_processed.clone()))?;
        registry.register(Box::new(template_matches.clone()))?;

        Ok(Self {
            registry,
            triggers,
            capture_frames,
            capture_frames_rejected,
            batches_discarded,
            cycles_completed,
            led_reports,
            led_detections,
            capture_buffered,
            obstacle_frames_submitted,
            obstacle_frames_dropped,
            obstacle_frames_processed,
            obstacle_detections,
            template_frames_dropped,
            template_frames_processed,
            template_matches,
        })
    }

    /// Updates all metrics from a snapshot of node state.
    pub fn update(&self, snapshot: &MetricsSnapshot) {
        advance(&self.triggers, snapshot.triggers);
        advance(&self.capture_frames, snapshot.capture_frames);
        advance(&self.capture_frames_rejected, snapshot.capture_frames_rejected);
        advance(&self.batches_discarded, snapshot.batches_discarded);
        advance(&self.cycles_completed, snapshot.cycles_completed);
        advance(&self.led_reports, snapshot.led_reports);
        advance(&self.led_detections, snapshot.led_detections);
        self.capture_buffered.set(snapshot.capture_buffered as i64);

        advance(&self.obstacle_frames_submitted, snapshot.obstacle_frames_submitted);
        advance(&self.obstacle_frames_dropped, snapshot.obstacle_frames_dropped);
        advance(&self.obstacle_frames_processed, snapshot.obstacle_frames_processed);
        advance(&self.obstacle_detections, snapshot.obstacle_detections);

        advance(&self.template_frames_dropped, snapshot.template_frames_dropped);
        advance(&self.template_frames_processed, snapshot.template_frames_processed);
        advance(&self.template_matches, snapshot.template_matches);
    }

    /// Returns the underlying Prometheus registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Encodes all metrics in Prometheus text format.
    pub fn encode(&self) -> Result<String, MetricsError> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creation() {
        assert!(MetricsRegistry::new().is_ok());
    }

    #[test]
    fn test_snapshot_from_components() {
        let window = WindowStats {
            triggers: 2,
            cycles_completed: 1,
            reports_published: 1,
            ..Default::default()
        };
        let worker = WorkerCounts {
            submitted: 10,
            dropped_busy: 6,
            spawn_failures: 1,
            processed: 3,
            detections: 3,
            template_dropped_busy: 8,
            template_processed: 2,
            template_matches: 1,
        };
        let snapshot = MetricsSnapshot::from_components(&window, 4, &worker);
        assert_eq!(snapshot.triggers, 2);
        assert_eq!(snapshot.obstacle_frames_dropped, 7);
        assert_eq!(snapshot.capture_buffered, 4);
        assert_eq!(snapshot.template_frames_dropped, 8);
        assert_eq!(snapshot.template_matches, 1);
    }

    #[test]
    fn test_metrics_update() {
        let registry = MetricsRegistry::new().unwrap();

        let snapshot = MetricsSnapshot {
            triggers: 3,
            cycles_completed: 2,
            capture_buffered: 12,
            obstacle_frames_dropped: 40,
            template_frames_processed: 5,
            ..Default::default()
        };
        registry.update(&snapshot);
        // Counters never move backwards.
        registry.update(&MetricsSnapshot::default());

        let output = registry.encode().unwrap();
        assert!(output.contains("perception_capture_triggers_total 3"));
        assert!(output.contains("perception_capture_cycles_total 2"));
        assert!(output.contains("perception_capture_buffered_frames 0"));
        assert!(output.contains("perception_obstacle_frames_dropped_total 40"));
        assert!(output.contains("perception_template_frames_processed_total 5"));
    }
}
