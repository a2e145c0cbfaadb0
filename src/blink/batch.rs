//! Capture batches and pixel masks handed to the blink detector.

use crate::capture::Frame;
use std::time::Duration;

/// Reasons a frame is refused by an open batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BatchRejection {
    /// The frame is older than the frame that opened the batch.
    #[error("frame at {frame:?} precedes capture start {start:?}")]
    ClockRegression {
        /// Batch start timestamp.
        start: Duration,
        /// Timestamp of the refused frame.
        frame: Duration,
    },

    /// The frame is older than the last buffered frame.
    #[error("frame at {frame:?} is older than the last buffered frame at {last:?}")]
    OutOfOrder {
        /// Timestamp of the last buffered frame.
        last: Duration,
        /// Timestamp of the refused frame.
        frame: Duration,
    },

    /// The frame size differs from the batch.
    #[error("frame is {got:?}, batch frames are {expected:?}")]
    DimensionMismatch {
        /// Size of the buffered frames.
        expected: (u32, u32),
        /// Size of the refused frame.
        got: (u32, u32),
    },
}

/// A temporal burst of frames collected during one capture cycle.
///
/// Timestamps are non-decreasing and every frame shares the first frame's
/// dimensions; `push` refuses anything that would break either property.
#[derive(Debug, Clone)]
pub struct CaptureBatch {
    start_timestamp: Duration,
    frames: Vec<Frame>,
}

impl CaptureBatch {
    /// Opens a batch whose start timestamp is taken from `first`.
    pub fn open(first: Frame) -> Self {
        Self {
            start_timestamp: first.timestamp(),
            frames: vec![first],
        }
    }

    /// Appends a frame.
    pub fn push(&mut self, frame: Frame) -> Result<(), BatchRejection> {
        if frame.timestamp() < self.start_timestamp {
            return Err(BatchRejection::ClockRegression {
                start: self.start_timestamp,
                frame: frame.timestamp(),
            });
        }

        if let Some(last) = self.frames.last() {
            if frame.timestamp() < last.timestamp() {
                return Err(BatchRejection::OutOfOrder {
                    last: last.timestamp(),
                    frame: frame.timestamp(),
                });
            }
            if frame.dimensions() != last.dimensions() {
                return Err(BatchRejection::DimensionMismatch {
                    expected: last.dimensions(),
                    got: frame.dimensions(),
                });
            }
        }

        self.frames.push(frame);
        Ok(())
    }

    /// Timestamp of the frame that opened the batch.
    #[inline]
    pub fn start_timestamp(&self) -> Duration {
        self.start_timestamp
    }

    /// Buffered frames in arrival order.
    #[inline]
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Number of buffered frames.
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether no frame is buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Dimensions shared by every frame, if any frame is present.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.frames.first().map(Frame::dimensions)
    }

    /// Frame timestamps relative to the batch start.
    pub fn relative_timestamps(&self) -> impl Iterator<Item = Duration> + '_ {
        self.frames
            .iter()
            .map(move |f| f.timestamp() - self.start_timestamp)
    }
}

/// Boolean per-pixel mask selecting where the detector looks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    width: u32,
    height: u32,
    data: Vec<bool>,
}

impl Mask {
    /// A mask enabling every pixel.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![true; (width as usize) * (height as usize)],
        }
    }

    /// Builds a mask from a predicate over `(x, y)`.
    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> bool) -> Self {
        let data = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| f(x, y))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// `(width, height)` of the mask.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns whether `(x, y)` is enabled; out-of-bounds pixels are not.
    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.data[(y as usize) * (self.width as usize) + x as usize]
    }

    /// Number of enabled pixels.
    pub fn count_enabled(&self) -> usize {
        self.data.iter().filter(|&&on| on).count()
    }
}
