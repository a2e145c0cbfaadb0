//! Frame type representing a captured image with metadata.

use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;

/// A single captured frame from the camera.
///
/// Frames are immutable once captured. The pixel buffer is shared, so
/// cloning a frame to hand it to both detection pipelines is cheap.
#[derive(Clone)]
pub struct Frame {
    /// RGB pixel data.
    image: Arc<RgbImage>,
    /// Monotonic capture timestamp, relative to the stream origin.
    timestamp: Duration,
    /// Monotonic sequence number.
    sequence: u64,
}

impl Frame {
    /// Creates a new frame from an RGB image.
    pub fn new(image: RgbImage, timestamp: Duration, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            timestamp,
            sequence,
        }
    }

    /// Creates a frame from a raw interleaved RGB buffer.
    ///
    /// Returns `None` when the buffer length does not match `width * height * 3`.
    pub fn from_raw(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        timestamp: Duration,
        sequence: u64,
    ) -> Option<Self> {
        RgbImage::from_raw(width, height, pixels).map(|image| Self::new(image, timestamp, sequence))
    }

    /// Returns the pixel data.
    #[inline]
    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Returns the frame width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Returns the frame height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Returns `(width, height)`.
    #[inline]
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Returns the capture timestamp.
    #[inline]
    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    /// Returns the sequence number.
    #[inline]
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Returns true if the frame holds at least one pixel.
    pub fn is_valid(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("timestamp", &self.timestamp)
            .field("sequence", &self.sequence)
            .finish()
    }
}
