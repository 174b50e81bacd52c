//! Derived appearance attributes for detection metadata.
//!
//! Cheap heuristics attached to detections before routing: how much of
//! the frame an object covers, and which named color it mostly is.

use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::types::BoundingBox;

/// Reference palette for dominant-color naming.
const REFERENCE_COLORS: [(&str, [f32; 3]); 9] = [
    ("Red", [255.0, 0.0, 0.0]),
    ("Green", [0.0, 255.0, 0.0]),
    ("Blue", [0.0, 0.0, 255.0]),
    ("Black", [0.0, 0.0, 0.0]),
    ("White", [255.0, 255.0, 255.0]),
    ("Gray", [128.0, 128.0, 128.0]),
    ("Yellow", [255.0, 255.0, 0.0]),
    ("Orange", [255.0, 165.0, 0.0]),
    ("Purple", [128.0, 0.0, 128.0]),
];

const SAMPLE_SIZE: u32 = 64;

/// Percentage of the frame area covered by `bbox`, rounded to 2 decimals.
pub fn relative_size(bbox: &BoundingBox, img_w: u32, img_h: u32) -> f32 {
    let total = (img_w as f32) * (img_h as f32);
    if total <= 0.0 {
        return 0.0;
    }
    let pct = bbox.area() / total * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Nearest named color to the average of the crop's central region.
///
/// The crop is downscaled to 64×64 and only the center 50% is averaged,
/// which keeps background pixels around the object from skewing the
/// estimate. Degenerate crops report "Unknown".
pub fn dominant_color(crop: &RgbImage) -> &'static str {
    if crop.width() == 0 || crop.height() == 0 {
        return "Unknown";
    }

    let resized = imageops::resize(crop, SAMPLE_SIZE, SAMPLE_SIZE, FilterType::Triangle);
    let lo = SAMPLE_SIZE / 4;
    let hi = SAMPLE_SIZE * 3 / 4;

    let mut sum = [0.0f32; 3];
    let mut count = 0u32;
    for y in lo..hi {
        for x in lo..hi {
            let pixel = resized.get_pixel(x, y).0;
            for c in 0..3 {
                sum[c] += pixel[c] as f32;
            }
            count += 1;
        }
    }
    let avg = [
        sum[0] / count as f32,
        sum[1] / count as f32,
        sum[2] / count as f32,
    ];

    let mut best = "Unknown";
    let mut best_dist = f32::INFINITY;
    for (name, reference) in REFERENCE_COLORS {
        let dist = (avg[0] - reference[0]).powi(2)
            + (avg[1] - reference[1]).powi(2)
            + (avg[2] - reference[2]).powi(2);
        if dist < best_dist {
            best_dist = dist;
            best = name;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_relative_size_half_frame() {
        let bbox = BoundingBox::new(0.0, 0.0, 320.0, 480.0);
        assert_eq!(relative_size(&bbox, 640, 480), 50.0);
    }

    #[test]
    fn test_relative_size_rounds_two_decimals() {
        let bbox = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        // 10000 / 307200 * 100 = 3.2552... → 3.26
        assert_eq!(relative_size(&bbox, 640, 480), 3.26);
    }

    #[test]
    fn test_relative_size_degenerate_image() {
        let bbox = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(relative_size(&bbox, 0, 0), 0.0);
    }

    #[test]
    fn test_dominant_color_solid_red() {
        let crop = RgbImage::from_pixel(40, 40, Rgb([250, 5, 5]));
        assert_eq!(dominant_color(&crop), "Red");
    }

    #[test]
    fn test_dominant_color_solid_white() {
        let crop = RgbImage::from_pixel(12, 12, Rgb([240, 240, 240]));
        assert_eq!(dominant_color(&crop), "White");
    }

    #[test]
    fn test_dominant_color_orange_vs_yellow() {
        let crop = RgbImage::from_pixel(20, 20, Rgb([255, 170, 10]));
        assert_eq!(dominant_color(&crop), "Orange");
    }

    #[test]
    fn test_dominant_color_ignores_border() {
        // Green center inside a black border: the center wins.
        let mut crop = RgbImage::from_pixel(64, 64, Rgb([0, 0, 0]));
        for y in 16..48 {
            for x in 16..48 {
                crop.put_pixel(x, y, Rgb([10, 240, 10]));
            }
        }
        assert_eq!(dominant_color(&crop), "Green");
    }

    #[test]
    fn test_dominant_color_empty_crop() {
        let crop = RgbImage::new(0, 0);
        assert_eq!(dominant_color(&crop), "Unknown");
    }
}
