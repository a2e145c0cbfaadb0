//! Blink frequency detector contract.
//!
//! The frequency-estimation algorithm lives outside this crate. The
//! capture window only needs a pure function from a finished batch to a
//! list of LED detections, so the collaborator is injected behind
//! [`BlinkFrequencyDetector`].

use super::{CaptureBatch, Mask};
use crate::capture::ConfigError;
use serde::{Deserialize, Serialize};

/// Errors reported by a blink detector.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BlinkError {
    /// The batch is shorter than the minimum sample count.
    #[error("batch has {got} frames, at least {required} required")]
    InsufficientSamples {
        /// Frames in the batch.
        got: usize,
        /// Configured minimum.
        required: usize,
    },

    /// The mask and the frames differ in size.
    #[error("mask is {mask:?}, frames are {frames:?}")]
    MaskMismatch {
        /// Mask size.
        mask: (u32, u32),
        /// Frame size.
        frames: (u32, u32),
    },

    /// The estimator itself failed.
    #[error("frequency estimation failed: {0}")]
    Estimation(String),
}

/// Blink frequencies (Hz) the detector tests against, in configured order.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFrequencies(Vec<f64>);

impl CandidateFrequencies {
    /// Validates and wraps a list of frequencies.
    pub fn new(frequencies: Vec<f64>) -> Result<Self, ConfigError> {
        let valid = !frequencies.is_empty()
            && frequencies.iter().all(|f| f.is_finite() && *f > 0.0);
        if !valid {
            return Err(ConfigError::InvalidFrequencies);
        }
        Ok(Self(frequencies))
    }

    /// Frequencies in configured order.
    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Number of candidates.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false for a validated set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A blinking LED located in the image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedDetection {
    /// Pixel row of the LED centre.
    pub row: u32,
    /// Pixel column of the LED centre.
    pub col: u32,
    /// Matched candidate frequency, if any candidate matched.
    pub frequency: Option<f64>,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
}

/// Frequency-estimation collaborator invoked once per completed capture.
pub trait BlinkFrequencyDetector: Send {
    /// Detector identifier used in logs.
    fn name(&self) -> &'static str;

    /// Analyzes a finished batch.
    ///
    /// `mask` has the batch's frame dimensions. Implementations must not
    /// retain the batch beyond the call.
    fn detect(
        &self,
        batch: &CaptureBatch,
        mask: &Mask,
        frequencies: &CandidateFrequencies,
        min_samples: usize,
    ) -> Result<Vec<LedDetection>, BlinkError>;
}

/// Placeholder detector that validates its inputs and reports nothing.
///
/// Used by the binary until a frequency estimator is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBlinkDetector;

impl BlinkFrequencyDetector for NullBlinkDetector {
    fn name(&self) -> &'static str {
        "null"
    }

    fn detect(
        &self,
        batch: &CaptureBatch,
        mask: &Mask,
        frequencies: &CandidateFrequencies,
        min_samples: usize,
    ) -> Result<Vec<LedDetection>, BlinkError> {
        if batch.len() < min_samples {
            return Err(BlinkError::InsufficientSamples {
                got: batch.len(),
                required: min_samples,
            });
        }
        if let Some(frames) = batch.dimensions() {
            if frames != mask.dimensions() {
                return Err(BlinkError::MaskMismatch {
                    mask: mask.dimensions(),
                    frames,
                });
            }
        }

        tracing::debug!(
            frames = batch.len(),
            candidates = frequencies.len(),
            "Null blink detector reports no LEDs"
        );
        Ok(Vec::new())
    }
}
