//! Debug rendering of obstacle results onto the source frame.

use super::{BoundingBox, ObstacleDetection};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::time::Duration;

/// Outline colour of accepted contour boxes.
pub const CONTOUR_BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Outline colour of the accepted template match.
pub const TEMPLATE_BOX_COLOR: Rgb<u8> = Rgb([0, 0, 255]);

const CONTOUR_BOX_THICKNESS: u32 = 2;
const TEMPLATE_BOX_THICKNESS: u32 = 4;

/// An annotated copy of a processed frame.
#[derive(Debug, Clone)]
pub struct DebugImage {
    /// Sequence number of the source frame.
    pub sequence: u64,
    /// Capture timestamp of the source frame.
    pub frame_timestamp: Duration,
    /// Frame with detection outlines drawn on it.
    pub image: RgbImage,
}

/// Draws every detection box, and the template box if given, on a copy of `image`.
pub fn annotate_frame(
    image: &RgbImage,
    detections: &[ObstacleDetection],
    template_box: Option<&BoundingBox>,
) -> RgbImage {
    let mut canvas = image.clone();
    if let Some(bbox) = template_box {
        draw_box(&mut canvas, bbox, TEMPLATE_BOX_COLOR, TEMPLATE_BOX_THICKNESS);
    }
    for detection in detections {
        draw_box(
            &mut canvas,
            &detection.bounding_box,
            CONTOUR_BOX_COLOR,
            CONTOUR_BOX_THICKNESS,
        );
    }
    canvas
}

/// Outline drawn inwards from the box edge, `thickness` pixels wide.
fn draw_box(canvas: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>, thickness: u32) {
    for inset in 0..thickness {
        let (Some(width), Some(height)) = (
            bbox.width.checked_sub(2 * inset),
            bbox.height.checked_sub(2 * inset),
        ) else {
            break;
        };
        if width == 0 || height == 0 {
            break;
        }
        let rect = Rect::at((bbox.x + inset) as i32, (bbox.y + inset) as i32).of_size(width, height);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}
