//! Trigger-driven frame capture window.
//!
//! Buffers a bounded burst of frames after each trigger and hands the
//! finished batch to the blink detector exactly once.

use super::{
    BatchRejection, BlinkFrequencyDetector, CandidateFrequencies, CaptureBatch, LedDetection,
    Mask,
};
use crate::capture::{ConfigError, Frame};
use crate::pipeline::DetectionSink;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Capture window configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureWindowConfig {
    /// Length of the capture window in seconds.
    pub duration_secs: f64,
    /// Candidate blink frequencies in Hz.
    pub frequencies: Vec<f64>,
    /// Minimum number of frames the detector needs.
    pub min_samples: usize,
    /// Start armed instead of waiting for the first trigger.
    pub arm_on_start: bool,
}

impl Default for CaptureWindowConfig {
    fn default() -> Self {
        Self {
            duration_secs: 1.0,
            frequencies: vec![2.8, 4.1, 5.0],
            min_samples: 5,
            arm_on_start: false,
        }
    }
}

impl CaptureWindowConfig {
    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.duration()?;
        CandidateFrequencies::new(self.frequencies.clone())?;
        Ok(())
    }

    /// Capture duration as a `Duration`.
    ///
    /// Fails for non-positive values and for values a `Duration` cannot hold.
    pub fn duration(&self) -> Result<Duration, ConfigError> {
        match Duration::try_from_secs_f64(self.duration_secs) {
            Ok(duration) if !duration.is_zero() => Ok(duration),
            _ => Err(ConfigError::InvalidCaptureDuration(self.duration_secs)),
        }
    }
}

/// Observable phase of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    /// Armed; the next frame opens a batch.
    Idle,
    /// Batch open and accumulating frames.
    Capturing,
    /// Batch handed off (or never started); frames are ignored until a trigger.
    Finalized,
}

enum CaptureState {
    Idle,
    Capturing {
        batch: CaptureBatch,
        started_at: Instant,
    },
    Finalized,
}

impl CaptureState {
    fn phase(&self) -> CapturePhase {
        match self {
            CaptureState::Idle => CapturePhase::Idle,
            CaptureState::Capturing { .. } => CapturePhase::Capturing,
            CaptureState::Finalized => CapturePhase::Finalized,
        }
    }
}

/// Phase reported on the debug channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebugPhase {
    /// Frames are being buffered.
    Capturing,
    /// The window closed and the batch went to the detector.
    Processing,
}

/// Progress telemetry emitted while capturing and at window close.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureDebugInfo {
    /// Current phase.
    pub phase: DebugPhase,
    /// Percentage of the window elapsed; 100 once processing.
    pub capture_progress: f64,
}

/// LED detections published once per completed capture cycle.
#[derive(Debug, Clone, Serialize)]
pub struct LedDetectionReport {
    /// Timestamp of the frame that opened the batch.
    pub start_timestamp: Duration,
    /// Frames handed to the detector.
    pub frame_count: usize,
    /// LEDs found in the batch.
    pub detections: Vec<LedDetection>,
    /// Time the detector took.
    pub processing_time: Duration,
    /// Wall-clock publication time.
    pub published_at: DateTime<Utc>,
}

/// What the window did with a frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// No capture armed.
    Ignored,
    /// Frame opened a new batch.
    Started,
    /// Frame appended.
    Captured {
        /// Percent of the window elapsed.
        progress: f64,
    },
    /// Frame refused; the batch is unchanged.
    Rejected(BatchRejection),
    /// Window closed.
    Completed {
        /// False when no LED report went out.
        published: bool,
    },
}

/// Counters describing window activity.
#[derive(Debug, Clone, Default)]
pub struct WindowStats {
    /// Triggers received.
    pub triggers: u64,
    /// Frames appended to a batch, including the opening frame.
    pub frames_captured: u64,
    /// Frames refused by an open batch.
    pub frames_rejected: u64,
    /// Frames that arrived with no capture armed.
    pub frames_ignored: u64,
    /// Open batches thrown away by a trigger.
    pub batches_discarded: u64,
    /// Windows that closed.
    pub cycles_completed: u64,
    /// LED reports published.
    pub reports_published: u64,
    /// LEDs reported over all cycles.
    pub led_detections: u64,
}

/// Accumulates frames between a trigger and the end of the capture window.
pub struct FrameCaptureWindow {
    duration: Duration,
    frequencies: CandidateFrequencies,
    min_samples: usize,
    mask: Option<Mask>,
    detector: Box<dyn BlinkFrequencyDetector>,
    sink: Arc<dyn DetectionSink>,
    state: CaptureState,
    stats: WindowStats,
}

impl FrameCaptureWindow {
    /// Creates a window with a full-frame mask.
    pub fn new(
        config: &CaptureWindowConfig,
        detector: Box<dyn BlinkFrequencyDetector>,
        sink: Arc<dyn DetectionSink>,
    ) -> Result<Self, ConfigError> {
        let duration = config.duration()?;
        let frequencies = CandidateFrequencies::new(config.frequencies.clone())?;
        let state = if config.arm_on_start {
            CaptureState::Idle
        } else {
            CaptureState::Finalized
        };

        tracing::info!(
            duration_secs = config.duration_secs,
            frequencies = ?config.frequencies,
            detector = detector.name(),
            "Capture window ready; waiting for trigger"
        );

        Ok(Self {
            duration,
            frequencies,
            min_samples: config.min_samples,
            mask: None,
            detector,
            sink,
            state,
            stats: WindowStats::default(),
        })
    }

    /// Uses a fixed mask instead of a full-frame one.
    pub fn with_mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    /// Current phase of the capture cycle.
    pub fn phase(&self) -> CapturePhase {
        self.state.phase()
    }

    /// Activity counters since construction.
    pub fn stats(&self) -> &WindowStats {
        &self.stats
    }

    /// Frames buffered in the open batch.
    pub fn buffered(&self) -> usize {
        match &self.state {
            CaptureState::Capturing { batch, .. } => batch.len(),
            _ => 0,
        }
    }

    /// Resets the window; any open batch is discarded unpublished.
    pub fn trigger(&mut self) {
        self.stats.triggers += 1;
        if let CaptureState::Capturing { batch, .. } = &self.state {
            self.stats.batches_discarded += 1;
            tracing::info!(frames = batch.len(), "Trigger discarded in-progress batch");
        }
        self.state = CaptureState::Idle;
    }

    /// Feeds one frame into the window.
    pub fn push_frame(&mut self, frame: Frame) -> FrameOutcome {
        match self.state.phase() {
            CapturePhase::Finalized => {
                self.stats.frames_ignored += 1;
                tracing::trace!(sequence = frame.sequence(), "No capture armed; frame ignored");
                return FrameOutcome::Ignored;
            }
            CapturePhase::Idle => return self.start(frame),
            CapturePhase::Capturing => {}
        }

        let start = match &self.state {
            CaptureState::Capturing { batch, .. } => batch.start_timestamp(),
            _ => return FrameOutcome::Ignored,
        };

        match frame.timestamp().checked_sub(start) {
            Some(relative) if relative < self.duration => self.append(frame, relative),
            Some(_) => self.finalize(),
            None => self.reject(BatchRejection::ClockRegression {
                start,
                frame: frame.timestamp(),
            }),
        }
    }

    fn start(&mut self, frame: Frame) -> FrameOutcome {
        tracing::info!(timestamp = ?frame.timestamp(), "Start capturing frames");
        self.state = CaptureState::Capturing {
            batch: CaptureBatch::open(frame),
            started_at: Instant::now(),
        };
        self.stats.frames_captured += 1;
        self.publish_progress(Duration::ZERO);
        FrameOutcome::Started
    }

    fn append(&mut self, frame: Frame, relative: Duration) -> FrameOutcome {
        let pushed = match &mut self.state {
            CaptureState::Capturing { batch, .. } => batch.push(frame),
            _ => return FrameOutcome::Ignored,
        };

        match pushed {
            Ok(()) => {
                self.stats.frames_captured += 1;
                tracing::debug!(relative = ?relative, "Capturing frame");
                FrameOutcome::Captured {
                    progress: self.publish_progress(relative),
                }
            }
            Err(rejection) => self.reject(rejection),
        }
    }

    fn reject(&mut self, rejection: BatchRejection) -> FrameOutcome {
        self.stats.frames_rejected += 1;
        tracing::warn!(reason = %rejection, "Dropped frame from capture batch");
        FrameOutcome::Rejected(rejection)
    }

    fn publish_progress(&self, relative: Duration) -> f64 {
        let progress = 100.0 * relative.as_secs_f64() / self.duration.as_secs_f64();
        self.sink.publish_debug(&CaptureDebugInfo {
            phase: DebugPhase::Capturing,
            capture_progress: progress,
        });
        progress
    }

    fn finalize(&mut self) -> FrameOutcome {
        let (batch, started_at) =
            match std::mem::replace(&mut self.state, CaptureState::Finalized) {
                CaptureState::Capturing { batch, started_at } => (batch, started_at),
                other => {
                    self.state = other;
                    return FrameOutcome::Ignored;
                }
            };

        self.stats.cycles_completed += 1;
        self.sink.publish_debug(&CaptureDebugInfo {
            phase: DebugPhase::Processing,
            capture_progress: 100.0,
        });

        let published = self.hand_off(&batch, started_at);
        FrameOutcome::Completed { published }
    }

    fn hand_off(&mut self, batch: &CaptureBatch, started_at: Instant) -> bool {
        let Some(dimensions) = batch.dimensions() else {
            tracing::warn!("Capture window closed with no frames; skipping detection");
            return false;
        };

        let mask = match &self.mask {
            Some(mask) if mask.dimensions() != dimensions => {
                tracing::error!(
                    mask = ?mask.dimensions(),
                    frames = ?dimensions,
                    "Mask does not match frame size; skipping detection"
                );
                return false;
            }
            Some(mask) => Cow::Borrowed(mask),
            None => Cow::Owned(Mask::full(dimensions.0, dimensions.1)),
        };

        let tic = Instant::now();
        let result = self
            .detector
            .detect(batch, &mask, &self.frequencies, self.min_samples);
        let processing_time = tic.elapsed();

        match result {
            Ok(detections) => {
                let report = LedDetectionReport {
                    start_timestamp: batch.start_timestamp(),
                    frame_count: batch.len(),
                    detections,
                    processing_time,
                    published_at: Utc::now(),
                };
                self.sink.publish_leds(&report);
                self.stats.reports_published += 1;
                self.stats.led_detections += report.detections.len() as u64;

                tracing::info!(
                    frames = report.frame_count,
                    detections = report.detections.len(),
                    processing_ms = processing_time.as_millis() as u64,
                    total_ms = started_at.elapsed().as_millis() as u64,
                    "Blink detection done"
                );
                true
            }
            Err(e) => {
                tracing::warn!(
                    detector = self.detector.name(),
                    error = %e,
                    "Blink detection failed; no LED report this cycle"
                );
                false
            }
        }
    }
}
