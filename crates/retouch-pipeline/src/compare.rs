//! Probe output comparison.

use image::imageops::FilterType;

use crate::types::RgbImage;

/// Difference score between two images.
///
/// `b` is resized to the size of `a` when they differ. For each channel
/// the mean absolute difference is computed; the score is the mean of
/// the squares of those per-channel means.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_squared_difference(a: &RgbImage, b: &RgbImage) -> f64 {
    let resized;
    let b = if a.dimensions() == b.dimensions() {
        b
    } else {
        resized = image::imageops::resize(b, a.width(), a.height(), FilterType::Triangle);
        &resized
    };

    let count = u64::from(a.width()) * u64::from(a.height());
    if count == 0 {
        return 0.0;
    }

    let mut sums = [0_u64; 3];
    for (pa, pb) in a.pixels().zip(b.pixels()) {
        for (c, sum) in sums.iter_mut().enumerate() {
            *sum += u64::from(pa.0[c].abs_diff(pb.0[c]));
        }
    }
    sums.iter()
        .map(|&s| {
            let mean = s as f64 / count as f64;
            mean * mean
        })
        .sum::<f64>()
        / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_score_zero() {
        let img = RgbImage::from_fn(8, 8, |x, y| image::Rgb([x as u8, y as u8, 7]));
        assert!(mean_squared_difference(&img, &img).abs() < f64::EPSILON);
    }

    #[test]
    fn uniform_offset_in_one_channel() {
        let a = RgbImage::from_pixel(4, 4, image::Rgb([10, 10, 10]));
        let b = RgbImage::from_pixel(4, 4, image::Rgb([16, 10, 10]));
        // Channel means (6, 0, 0): (36 + 0 + 0) / 3.
        assert!((mean_squared_difference(&a, &b) - 12.0).abs() < 1e-9);
    }

    #[test]
    fn differently_sized_output_is_resized() {
        let a = RgbImage::from_pixel(8, 8, image::Rgb([50, 50, 50]));
        let b = RgbImage::from_pixel(16, 16, image::Rgb([50, 50, 50]));
        assert!(mean_squared_difference(&a, &b).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_image_scores_zero() {
        let a = RgbImage::new(0, 0);
        assert!(mean_squared_difference(&a, &a).abs() < f64::EPSILON);
    }
}
