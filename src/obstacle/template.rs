//! Multi-scale template matching.
//!
//! The reference template is resized into a fixed pyramid at startup.
//! Each frame is searched with normalized squared-difference correlation
//! at every scale that fits, and the best-scoring placement wins if it
//! clears the acceptance threshold.

use super::BoundingBox;
use crate::capture::ConfigError;
use image::imageops::{self, FilterType};
use image::RgbImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Template matcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Reference template image.
    pub path: PathBuf,
    /// Pyramid level count; level i contributes scales 1/i and i.
    pub pyramid_levels: usize,
    /// Scores strictly below this are accepted as matches.
    pub accept_threshold: f64,
    /// Run the matcher on every processed frame.
    pub enabled: bool,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("assets/cone_template.ppm"),
            pyramid_levels: 5,
            accept_threshold: 0.5,
            enabled: false,
        }
    }
}

impl TemplateConfig {
    /// Checks the level count and the acceptance threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pyramid_levels == 0 {
            return Err(ConfigError::InvalidPyramidLevels);
        }
        if !(self.accept_threshold > 0.0 && self.accept_threshold <= 1.0) {
            return Err(ConfigError::InvalidMatchThreshold(self.accept_threshold));
        }
        Ok(())
    }
}

/// Errors raised while preparing the matcher.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The file could not be read or decoded.
    #[error("failed to load template {path}: {source}")]
    Load {
        /// Template path.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: image::ImageError,
    },
    /// The image has zero width or height.
    #[error("template image has no pixels")]
    Empty,
    /// The template settings are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One pyramid entry.
#[derive(Debug, Clone)]
pub struct PyramidLevel {
    /// Resize factor relative to the reference template.
    pub scale: f64,
    /// Resized template.
    pub image: RgbImage,
}

/// Scaled copies of the reference template, in insertion order.
#[derive(Debug, Clone)]
pub struct TemplatePyramid {
    levels: Vec<PyramidLevel>,
}

impl TemplatePyramid {
    /// Builds `[1, 1/2, 2, 1/3, 3, ...]` up to `1/(levels-1)` and `levels-1`.
    ///
    /// Scaled dimensions are clamped to at least one pixel.
    pub fn build(template: &RgbImage, levels: usize) -> Self {
        let (w, h) = template.dimensions();
        let mut entries = vec![PyramidLevel {
            scale: 1.0,
            image: template.clone(),
        }];

        for i in 2..levels.max(2) {
            let factor = i as u32;
            let down = imageops::resize(
                template,
                (w / factor).max(1),
                (h / factor).max(1),
                FilterType::Triangle,
            );
            entries.push(PyramidLevel {
                scale: 1.0 / i as f64,
                image: down,
            });
            let up = imageops::resize(template, w * factor, h * factor, FilterType::Triangle);
            entries.push(PyramidLevel {
                scale: i as f64,
                image: up,
            });
        }

        Self { levels: entries }
    }

    /// Entries in insertion order.
    pub fn levels(&self) -> &[PyramidLevel] {
        &self.levels
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.levels.len()
    }

    /// Never true; the unscaled template is always present.
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

/// Best placement of one pyramid entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScaleMatch {
    /// Normalized squared difference in [0, 1]; lower is better.
    pub score: f64,
    /// Scale of the pyramid entry.
    pub scale: f64,
    /// Left column of the best placement.
    pub x: u32,
    /// Top row of the best placement.
    pub y: u32,
    /// Width of the pyramid entry.
    pub width: u32,
    /// Height of the pyramid entry.
    pub height: u32,
}

/// Outcome of matching one frame.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateMatch {
    /// Best entry over all scales, accepted or not.
    pub best: Option<ScaleMatch>,
    /// Present only when the best score clears the threshold.
    pub bounding_box: Option<BoundingBox>,
    /// Signed lateral offset of the match from image centre; NaN without a match.
    pub pose: f64,
}

impl TemplateMatch {
    /// Whether the best score cleared the threshold.
    pub fn is_match(&self) -> bool {
        self.bounding_box.is_some()
    }
}

/// Searches frames for the reference template at several scales.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    pyramid: TemplatePyramid,
    accept_threshold: f64,
}

impl TemplateMatcher {
    /// Builds the matcher from an in-memory template.
    pub fn new(
        template: &RgbImage,
        pyramid_levels: usize,
        accept_threshold: f64,
    ) -> Result<Self, TemplateError> {
        if template.width() == 0 || template.height() == 0 {
            return Err(TemplateError::Empty);
        }
        let pyramid = TemplatePyramid::build(template, pyramid_levels);
        tracing::info!(
            width = template.width(),
            height = template.height(),
            entries = pyramid.len(),
            "Template pyramid built"
        );
        Ok(Self {
            pyramid,
            accept_threshold,
        })
    }

    /// Loads the template named in `config` and builds the matcher.
    pub fn from_config(config: &TemplateConfig) -> Result<Self, TemplateError> {
        config.validate()?;
        let template = load_template(&config.path)?;
        Self::new(&template, config.pyramid_levels, config.accept_threshold)
    }

    /// The scaled templates searched on every frame.
    pub fn pyramid(&self) -> &TemplatePyramid {
        &self.pyramid
    }

    /// Matches every fitting pyramid entry against `image`.
    pub fn match_image(&self, image: &RgbImage) -> TemplateMatch {
        let mut results: Vec<ScaleMatch> = self
            .pyramid
            .levels()
            .iter()
            .filter(|level| {
                level.image.width() <= image.width() && level.image.height() <= image.height()
            })
            .filter_map(|level| {
                best_placement(image, &level.image).map(|(score, x, y)| ScaleMatch {
                    score,
                    scale: level.scale,
                    x,
                    y,
                    width: level.image.width(),
                    height: level.image.height(),
                })
            })
            .collect();

        // Stable: equal scores keep pyramid order.
        results.sort_by(|a, b| a.score.total_cmp(&b.score));
        let best = results.into_iter().next();

        let bounding_box = best
            .as_ref()
            .filter(|m| m.score < self.accept_threshold)
            .map(|m| BoundingBox {
                x: m.x,
                y: m.y,
                width: m.width,
                height: m.height,
            });

        let pose = match &bounding_box {
            Some(bbox) => {
                let width = f64::from(image.width());
                0.5 - (width - (f64::from(bbox.x) + 0.5 * f64::from(bbox.height))) / width
            }
            None => f64::NAN,
        };

        tracing::trace!(
            score = ?best.as_ref().map(|m| m.score),
            matched = bounding_box.is_some(),
            "Template search complete"
        );

        TemplateMatch {
            best,
            bounding_box,
            pose,
        }
    }
}

/// Reads a template image from disk as RGB.
pub fn load_template(path: &Path) -> Result<RgbImage, TemplateError> {
    let template = image::open(path).map_err(|source| TemplateError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(template.to_rgb8())
}

/// Per-window squared energy via a summed-area table over all channels.
struct EnergyTable {
    stride: usize,
    sums: Vec<u64>,
}

impl EnergyTable {
    fn new(image: &RgbImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        let raw = image.as_raw();
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                let px = &raw[(y * w + x) * 3..(y * w + x) * 3 + 3];
                row += px.iter().map(|&v| u64::from(v) * u64::from(v)).sum::<u64>();
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { stride, sums }
    }

    fn window(&self, x: usize, y: usize, w: usize, h: usize) -> u64 {
        let s = self.stride;
        self.sums[(y + h) * s + x + w] + self.sums[y * s + x]
            - self.sums[y * s + x + w]
            - self.sums[(y + h) * s + x]
    }
}

/// Best normalized squared-difference placement of `template` in `image`.
///
/// Returns `(score, x, y)` of the first minimum in row-major order, or
/// `None` when the template does not fit.
fn best_placement(image: &RgbImage, template: &RgbImage) -> Option<(f64, u32, u32)> {
    let (iw, ih) = (image.width() as usize, image.height() as usize);
    let (tw, th) = (template.width() as usize, template.height() as usize);
    if tw == 0 || th == 0 || tw > iw || th > ih {
        return None;
    }

    let energy = EnergyTable::new(image);
    let image_raw = image.as_raw();
    let template_raw = template.as_raw();
    let template_energy: u64 = template_raw
        .iter()
        .map(|&v| u64::from(v) * u64::from(v))
        .sum();
    let row_len = tw * 3;

    let row_best: Vec<(f64, usize)> = (0..=ih - th)
        .into_par_iter()
        .map(|y| {
            let mut best = (f64::INFINITY, 0usize);
            for x in 0..=iw - tw {
                let mut cross = 0u64;
                for ty in 0..th {
                    let start = ((y + ty) * iw + x) * 3;
                    let window = &image_raw[start..start + row_len];
                    let tmpl = &template_raw[ty * row_len..(ty + 1) * row_len];
                    cross += window
                        .iter()
                        .zip(tmpl)
                        .map(|(&a, &b)| u64::from(a) * u64::from(b))
                        .sum::<u64>();
                }
                let window_energy = energy.window(x, y, tw, th);
                let score = normalized_sqdiff(window_energy, template_energy, cross);
                if score < best.0 {
                    best = (score, x);
                }
            }
            best
        })
        .collect();

    let mut best: Option<(f64, u32, u32)> = None;
    for (y, &(score, x)) in row_best.iter().enumerate() {
        if best.map_or(true, |(s, _, _)| score < s) {
            best = Some((score, x as u32, y as u32));
        }
    }
    best
}

/// `Σ(T−I)² / √(ΣT²·ΣI²)`, clamped to [0, 1]; degenerate windows score 1.
fn normalized_sqdiff(window_energy: u64, template_energy: u64, cross: u64) -> f64 {
    let ssd = (window_energy + template_energy) as i128 - 2 * cross as i128;
    let denom = ((window_energy as f64) * (template_energy as f64)).sqrt();
    if denom <= f64::EPSILON {
        return 1.0;
    }
    (ssd.max(0) as f64 / denom).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn textured(width: u32, height: u32, seed: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = x.wrapping_mul(31) ^ y.wrapping_mul(17) ^ seed;
            Rgb([(v % 251) as u8, (v.wrapping_mul(7) % 253) as u8, (v.wrapping_mul(13) % 241) as u8])
        })
    }

    fn paste(base: &mut RgbImage, patch: &RgbImage, x: u32, y: u32) {
        imageops::replace(base, patch, i64::from(x), i64::from(y));
    }

    #[test]
    fn test_pyramid_scales_in_insertion_order() {
        let pyramid = TemplatePyramid::build(&textured(12, 10, 1), 5);
        let scales: Vec<f64> = pyramid.levels().iter().map(|l| l.scale).collect();
        assert_eq!(scales, vec![1.0, 0.5, 2.0, 1.0 / 3.0, 3.0, 0.25, 4.0]);

        let dims: Vec<(u32, u32)> = pyramid.levels().iter().map(|l| l.image.dimensions()).collect();
        assert_eq!(
            dims,
            vec![(12, 10), (6, 5), (24, 20), (4, 3), (36, 30), (3, 2), (48, 40)]
        );
    }

    #[test]
    fn test_single_level_pyramid() {
        assert_eq!(TemplatePyramid::build(&textured(5, 5, 0), 1).len(), 1);
        assert_eq!(TemplatePyramid::build(&textured(5, 5, 0), 2).len(), 1);
    }

    #[test]
    fn test_tiny_template_clamps_dimensions() {
        let pyramid = TemplatePyramid::build(&textured(2, 2, 0), 4);
        assert!(pyramid
            .levels()
            .iter()
            .all(|l| l.image.width() >= 1 && l.image.height() >= 1));
    }

    #[test]
    fn test_exact_template_found() {
        let template = textured(12, 10, 0xA5);
        let mut image = textured(80, 60, 0x3C);
        paste(&mut image, &template, 30, 20);

        let matcher = TemplateMatcher::new(&template, 5, 0.5).unwrap();
        let result = matcher.match_image(&image);

        let best = result.best.unwrap();
        assert!(best.score < 1e-9);
        assert_eq!(best.scale, 1.0);
        assert_eq!(
            result.bounding_box,
            Some(BoundingBox {
                x: 30,
                y: 20,
                width: 12,
                height: 10
            })
        );
        let expected_pose = 0.5 - (80.0 - (30.0 + 0.5 * 10.0)) / 80.0;
        assert!((result.pose - expected_pose).abs() < 1e-12);
    }

    #[test]
    fn test_unrelated_image_has_no_match() {
        let template = RgbImage::from_pixel(8, 8, Rgb([255, 0, 0]));
        let image = RgbImage::from_pixel(64, 48, Rgb([0, 0, 255]));

        let result = TemplateMatcher::new(&template, 5, 0.5)
            .unwrap()
            .match_image(&image);

        assert!(result.pose.is_nan());
        assert!(result.bounding_box.is_none());
        assert!(!result.is_match());
    }

    #[test]
    fn test_black_image_is_degenerate() {
        let template = textured(8, 8, 3);
        let result = TemplateMatcher::new(&template, 3, 0.5)
            .unwrap()
            .match_image(&RgbImage::new(32, 32));
        assert_eq!(result.best.map(|m| m.score), Some(1.0));
        assert!(result.pose.is_nan());
    }

    #[test]
    fn test_oversized_entries_skipped() {
        let template = textured(12, 10, 9);
        let matcher = TemplateMatcher::new(&template, 5, 0.5).unwrap();
        // Only the 1/2, 1/3 and 1/4 entries fit a 10x10 image.
        let result = matcher.match_image(&textured(10, 10, 4));
        assert!(result.best.map_or(false, |m| m.scale < 1.0));
        assert_eq!(matcher.pyramid().len(), 7);
    }

    #[test]
    fn test_nothing_fits() {
        let matcher = TemplateMatcher::new(&textured(12, 10, 9), 1, 0.5).unwrap();
        let result = matcher.match_image(&textured(4, 4, 1));
        assert!(result.best.is_none());
        assert!(result.pose.is_nan());
    }

    #[test]
    fn test_deterministic() {
        let template = textured(10, 10, 77);
        let image = textured(50, 40, 11);
        let matcher = TemplateMatcher::new(&template, 4, 0.5).unwrap();
        let a = matcher.match_image(&image);
        let b = matcher.match_image(&image);
        assert_eq!(a.best, b.best);
        assert_eq!(a.bounding_box, b.bounding_box);
    }

    #[test]
    fn test_empty_template_rejected() {
        assert!(matches!(
            TemplateMatcher::new(&RgbImage::new(0, 0), 5, 0.5),
            Err(TemplateError::Empty)
        ));
    }

    #[test]
    fn test_missing_template_file() {
        let config = TemplateConfig {
            path: PathBuf::from("/nonexistent/cone.png"),
            ..Default::default()
        };
        assert!(matches!(
            TemplateMatcher::from_config(&config),
            Err(TemplateError::Load { .. })
        ));
    }

    #[test]
    fn test_shipped_template_decodes() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("assets/cone_template.ppm");
        let template = load_template(&path).unwrap();
        assert_eq!(template.dimensions(), (20, 20));
        assert_eq!(*template.get_pixel(0, 0), Rgb([255, 128, 0]));
        assert_eq!(*template.get_pixel(10, 10), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_normalized_sqdiff_bounds() {
        assert_eq!(normalized_sqdiff(100, 100, 100), 0.0);
        assert_eq!(normalized_sqdiff(0, 100, 0), 1.0);
        assert_eq!(normalized_sqdiff(65025, 65025, 0), 1.0);
    }
}
