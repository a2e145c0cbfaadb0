//! Colour-space conversion and range thresholding.
//!
//! Uses the 8-bit HSV convention common to robotics tooling: hue is halved
//! into `[0, 180)`, saturation and value span `[0, 255]`.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Inclusive HSV bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HsvRange {
    /// Lowest accepted `[h, s, v]`.
    pub lower: [u8; 3],
    /// Highest accepted `[h, s, v]`.
    pub upper: [u8; 3],
}

/// Range tuned for orange traffic cones.
pub const CONE_HSV_RANGE: HsvRange = HsvRange {
    lower: [0, 80, 80],
    upper: [22, 255, 255],
};

impl HsvRange {
    /// Whether every channel of `hsv` lies within the bounds.
    #[inline]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|c| hsv[c] >= self.lower[c] && hsv[c] <= self.upper[c])
    }
}

/// Converts one RGB pixel to 8-bit HSV.
pub fn rgb_to_hsv(pixel: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = pixel.0.map(i32::from);
    let v = r.max(g).max(b);
    let min = r.min(g).min(b);
    let diff = v - min;

    let s = if v == 0 { 0 } else { (255 * diff + v / 2) / v };

    let h = if diff == 0 {
        0.0
    } else {
        let diff = diff as f64;
        let h = if v == r {
            60.0 * (g - b) as f64 / diff
        } else if v == g {
            120.0 + 60.0 * (b - r) as f64 / diff
        } else {
            240.0 + 60.0 * (r - g) as f64 / diff
        };
        if h < 0.0 {
            h + 360.0
        } else {
            h
        }
    };

    let h = (h / 2.0).round() as i32 % 180;
    [h as u8, s as u8, v as u8]
}

/// Marks pixels whose HSV value lies inside `range` with 255, others 0.
pub fn in_range(image: &RgbImage, range: &HsvRange) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        let inside = range.contains(rgb_to_hsv(*image.get_pixel(x, y)));
        Luma([if inside { 255 } else { 0 }])
    })
}

/// Binary threshold: values strictly above `cutoff` become 255.
pub fn binarize(mask: &GrayImage, cutoff: u8) -> GrayImage {
    GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if mask.get_pixel(x, y)[0] > cutoff { 255 } else { 0 }])
    })
}
