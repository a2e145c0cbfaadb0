//! Fan-out of camera frames to both detection pipelines.

use super::worker::{ObstacleWorker, Submission, WorkerCounts};
use super::DetectionSink;
use crate::blink::{
    BlinkFrequencyDetector, CapturePhase, FrameCaptureWindow, FrameOutcome, WindowStats,
};
use crate::capture::{ConfigError, FileConfig, Frame};
use crate::obstacle::{ContourObstacleDetector, TemplateError, TemplateMatcher};
use std::sync::Arc;
use thiserror::Error;

/// Startup failures. Any of these must stop the process.
#[derive(Debug, Error)]
pub enum NodeError {
    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    /// The reference template could not be loaded.
    #[error("template unavailable: {0}")]
    Template(#[from] TemplateError),
}

/// What happened to one incoming frame.
#[derive(Debug)]
pub struct FrameReceipt {
    /// What the capture window did with the frame.
    pub capture: FrameOutcome,
    /// Obstacle detector dispatch for the frame.
    pub obstacles: Submission,
}

/// Owns the capture window and the obstacle worker.
///
/// Frame and trigger handlers take `&mut self`, which serializes all
/// window mutations on the caller's ingestion path.
pub struct PerceptionNode {
    window: FrameCaptureWindow,
    worker: ObstacleWorker,
}

impl PerceptionNode {
    /// Builds the node around an already loaded template.
    ///
    /// The matcher runs per frame only if `config.template.enabled`.
    pub fn new(
        config: &FileConfig,
        matcher: TemplateMatcher,
        detector: Box<dyn BlinkFrequencyDetector>,
        sink: Arc<dyn DetectionSink>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let window = FrameCaptureWindow::new(&config.capture, detector, Arc::clone(&sink))?;
        let matcher = config.template.enabled.then_some(matcher);
        let worker = ObstacleWorker::new(
            ContourObstacleDetector::new(config.obstacle.clone()),
            matcher,
            sink,
        )
        .with_debug_images(config.output.debug_image);
        tracing::info!("Perception node initialized");
        Ok(Self { window, worker })
    }

    /// Loads the template named in the configuration, then builds the node.
    pub fn from_config(
        config: &FileConfig,
        detector: Box<dyn BlinkFrequencyDetector>,
        sink: Arc<dyn DetectionSink>,
    ) -> Result<Self, NodeError> {
        tracing::info!(path = %config.template.path.display(), "Loading template");
        let matcher = TemplateMatcher::from_config(&config.template)?;
        Self::new(config, matcher, detector, sink)
    }

    /// Handles a camera frame.
    pub fn on_frame(&mut self, frame: Frame) -> FrameReceipt {
        let obstacles = self.worker.submit(frame.clone());
        let capture = self.window.push_frame(frame);
        FrameReceipt { capture, obstacles }
    }

    /// Handles a trigger; restarts LED capture.
    pub fn on_trigger(&mut self) {
        self.window.trigger();
    }

    /// Current phase of the LED capture window.
    pub fn capture_phase(&self) -> CapturePhase {
        self.window.phase()
    }

    /// Frames buffered in the open capture batch.
    pub fn capture_buffered(&self) -> usize {
        self.window.buffered()
    }

    /// Capture window counters.
    pub fn window_stats(&self) -> &WindowStats {
        self.window.stats()
    }

    /// Obstacle worker counters.
    pub fn worker_stats(&self) -> WorkerCounts {
        self.worker.stats()
    }
}
