//! Pipeline A: temporal capture for blinking-LED detection.
//!
//! Frames arriving after a trigger are buffered for a fixed window; when
//! the window closes the batch is handed once to a
//! [`BlinkFrequencyDetector`] and its result is published.

mod batch;
mod detector;
mod window;

pub use batch::{BatchRejection, CaptureBatch, Mask};
pub use detector::{
    BlinkError, BlinkFrequencyDetector, CandidateFrequencies, LedDetection, NullBlinkDetector,
};
pub use window::{
    CaptureDebugInfo, CapturePhase, CaptureWindowConfig, DebugPhase, FrameCaptureWindow,
    FrameOutcome, LedDetectionReport, WindowStats,
};
