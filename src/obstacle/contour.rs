//! Colour-threshold and contour based cone detection.
//!
//! Pixels in the cone HSV range are binarized, every border (outer and
//! hole) is traced, and the ten largest regions are filtered by size and
//! by proximity to the bottom-centre of the image.

use super::hsv::{binarize, in_range, CONE_HSV_RANGE};
use super::{BoundingBox, ObstacleDetection, ObstacleType};
use crate::capture::ConfigError;
use image::RgbImage;
use imageproc::contours::{find_contours, Contour};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// At most this many contours are considered per frame.
pub const MAX_CONTOURS: usize = 10;

/// Binarization cutoff applied to the colour mask.
const MASK_CUTOFF: u8 = 22;

/// Size and distance filters for contour boxes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    /// Boxes must be strictly wider than this (pixels).
    pub min_width: u32,
    /// Boxes must be strictly taller than this (pixels).
    pub min_height: u32,
    /// Boxes must score strictly below this proximity value.
    pub max_proximity: f64,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            min_width: 15,
            min_height: 15,
            max_proximity: 120_000.0,
        }
    }
}

impl ObstacleConfig {
    /// Rejects a non-positive or non-finite proximity limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.max_proximity.is_finite() || self.max_proximity <= 0.0 {
            return Err(ConfigError::InvalidProximity(self.max_proximity));
        }
        Ok(())
    }
}

/// Failures inside contour extraction. Never escape [`ContourObstacleDetector::detect`].
#[derive(Debug, Error)]
enum ContourError {
    #[error("image has no pixels ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("image {width}x{height} exceeds contour coordinate range")]
    Oversized { width: u32, height: u32 },
}

/// Squared distance of a box's top-left corner from the image's
/// bottom-centre, with the horizontal term halved.
pub fn proximity(bbox: &BoundingBox, width: u32, height: u32) -> f64 {
    let dx = f64::from(bbox.x) - f64::from(width / 2);
    let dy = f64::from(bbox.y) - f64::from(height);
    0.5 * dx * dx + dy * dy
}

/// Enclosed area of a closed point chain (shoelace formula).
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    twice.abs() as f64 / 2.0
}

/// Smallest axis-aligned box containing every point.
fn bounding_rect(points: &[Point<i32>]) -> Option<BoundingBox> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    Some(BoundingBox {
        x: min_x.max(0) as u32,
        y: min_y.max(0) as u32,
        width: (max_x - min_x + 1) as u32,
        height: (max_y - min_y + 1) as u32,
    })
}

/// Detects cones by colour and contour shape.
#[derive(Debug, Clone, Default)]
pub struct ContourObstacleDetector {
    config: ObstacleConfig,
}

impl ContourObstacleDetector {
    /// Creates a detector with the given filter thresholds.
    pub fn new(config: ObstacleConfig) -> Self {
        Self { config }
    }

    /// Filter thresholds in use.
    pub fn config(&self) -> &ObstacleConfig {
        &self.config
    }

    /// Returns the cone detections in `image`.
    ///
    /// Extraction failures yield an empty list.
    pub fn detect(&self, image: &RgbImage) -> Vec<ObstacleDetection> {
        match self.try_detect(image) {
            Ok(detections) => detections,
            Err(e) => {
                tracing::warn!(error = %e, "Contour extraction failed; reporting no obstacles");
                Vec::new()
            }
        }
    }

    fn try_detect(&self, image: &RgbImage) -> Result<Vec<ObstacleDetection>, ContourError> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ContourError::EmptyImage { width, height });
        }
        if width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(ContourError::Oversized { width, height });
        }

        let mask = binarize(&in_range(image, &CONE_HSV_RANGE), MASK_CUTOFF);
        let contours: Vec<Contour<i32>> = find_contours(&mask);

        let mut ranked: Vec<(f64, &Contour<i32>)> = contours
            .iter()
            .map(|c| (polygon_area(&c.points), c))
            .collect();
        ranked.sort_by(|a, b| b.0.total_cmp(&a.0));

        let detections: Vec<ObstacleDetection> = ranked
            .into_iter()
            .take(MAX_CONTOURS)
            .filter_map(|(_, contour)| bounding_rect(&contour.points))
            .filter(|bbox| self.accepts(bbox, width, height))
            .map(|bounding_box| ObstacleDetection {
                bounding_box,
                obstacle_type: ObstacleType::Cone,
            })
            .collect();

        tracing::trace!(
            contours = contours.len(),
            detections = detections.len(),
            "Contour pass complete"
        );
        Ok(detections)
    }

    fn accepts(&self, bbox: &BoundingBox, width: u32, height: u32) -> bool {
        bbox.height > self.config.min_height
            && bbox.width > self.config.min_width
            && proximity(bbox, width, height) < self.config.max_proximity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;
    use proptest::prelude::*;

    const ORANGE: Rgb<u8> = Rgb([255, 128, 0]);

    fn scene(blocks: &[(i32, i32, u32, u32)]) -> RgbImage {
        let mut image = RgbImage::new(640, 480);
        for &(x, y, w, h) in blocks {
            draw_filled_rect_mut(&mut image, Rect::at(x, y).of_size(w, h), ORANGE);
        }
        image
    }

    #[test]
    fn test_single_orange_square() {
        let detector = ContourObstacleDetector::default();
        let detections = detector.detect(&scene(&[(100, 200, 40, 40)]));

        assert_eq!(detections.len(), 1);
        assert_eq!(
            detections[0].bounding_box,
            BoundingBox {
                x: 100,
                y: 200,
                width: 40,
                height: 40
            }
        );
        assert_eq!(detections[0].obstacle_type, ObstacleType::Cone);
    }

    #[test]
    fn test_black_image_has_no_detections() {
        let detector = ContourObstacleDetector::default();
        assert!(detector.detect(&RgbImage::new(640, 480)).is_empty());
    }

    #[test]
    fn test_empty_image_is_absorbed() {
        let detector = ContourObstacleDetector::default();
        assert!(detector.detect(&RgbImage::new(0, 0)).is_empty());
    }

    #[test]
    fn test_small_and_distant_blobs_rejected() {
        let detector = ContourObstacleDetector::default();
        // 10x10 is too small; the top-left corner is too far from bottom-centre.
        let detections = detector.detect(&scene(&[(300, 400, 10, 10), (0, 0, 40, 40)]));
        assert!(detections.is_empty());
    }

    #[test]
    fn test_blue_block_ignored() {
        let mut image = RgbImage::new(640, 480);
        draw_filled_rect_mut(&mut image, Rect::at(300, 400).of_size(40, 40), Rgb([0, 0, 255]));
        assert!(ContourObstacleDetector::default().detect(&image).is_empty());
    }

    #[test]
    fn test_hollow_block_reports_nested_contours() {
        let mut image = scene(&[(100, 200, 60, 60)]);
        draw_filled_rect_mut(&mut image, Rect::at(110, 210).of_size(40, 40), Rgb([0, 0, 0]));

        let detections = ContourObstacleDetector::default().detect(&image);
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].bounding_box.width, 60);
        assert!(detections[1].bounding_box.width < 60);
    }

    #[test]
    fn test_caps_at_ten_detections() {
        let blocks: Vec<_> = (0..4)
            .flat_map(|row| (0..4).map(move |col| (200 + col * 40, 300 + row * 40, 20u32, 20u32)))
            .collect();
        let detections = ContourObstacleDetector::default().detect(&scene(&blocks));
        assert_eq!(detections.len(), MAX_CONTOURS);
    }

    #[test]
    fn test_thresholds_are_configurable() {
        let detector = ContourObstacleDetector::new(ObstacleConfig {
            min_width: 50,
            ..Default::default()
        });
        assert!(detector.detect(&scene(&[(100, 200, 40, 40)])).is_empty());
    }

    #[test]
    fn test_proximity_formula() {
        let bbox = BoundingBox {
            x: 100,
            y: 200,
            width: 40,
            height: 40,
        };
        assert_eq!(proximity(&bbox, 640, 480), 0.5 * 220.0 * 220.0 + 280.0 * 280.0);
    }

    #[test]
    fn test_polygon_area_of_square_chain() {
        let square = [
            Point::new(0, 0),
            Point::new(4, 0),
            Point::new(4, 4),
            Point::new(0, 4),
        ];
        assert_eq!(polygon_area(&square), 16.0);
        assert_eq!(polygon_area(&square[..2]), 0.0);
    }

    proptest! {
        #[test]
        fn prop_detections_capped_and_filtered(
            blocks in proptest::collection::vec((0i32..600, 0i32..440, 1u32..60, 1u32..60), 0..25)
        ) {
            let detector = ContourObstacleDetector::default();
            let detections = detector.detect(&scene(&blocks));

            prop_assert!(detections.len() <= MAX_CONTOURS);
            for d in &detections {
                prop_assert!(d.bounding_box.width > 15);
                prop_assert!(d.bounding_box.height > 15);
                prop_assert!(proximity(&d.bounding_box, 640, 480) < 120_000.0);
            }
        }
    }
}
