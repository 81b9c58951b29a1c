//! Gaussian blur and unsharp masking.
//!
//! Wraps [`imageproc::filter::gaussian_blur_f32`]. Masks are blurred to
//! feather their edges; portraits are blurred per channel as the first
//! half of an unsharp mask.
//!
//! [`gaussian_blur`] operates on a single grayscale channel.
//! [`gaussian_blur_rgb`] applies the same blur independently to each
//! R/G/B channel.

use image::GrayImage;

use crate::types::RgbImage;

/// Apply Gaussian blur to a grayscale image.
///
/// Non-positive sigma values return the image unchanged, since
/// `imageproc`'s underlying function panics on `sigma <= 0.0`.
#[must_use = "returns the blurred image"]
pub fn gaussian_blur(image: &GrayImage, sigma: f32) -> GrayImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    imageproc::filter::gaussian_blur_f32(image, sigma)
}

/// Apply Gaussian blur to an RGB image by blurring each channel
/// independently.
///
/// Non-positive sigma values return the image unchanged.
#[must_use = "returns the blurred RGB image"]
pub fn gaussian_blur_rgb(image: &RgbImage, sigma: f32) -> RgbImage {
    if sigma <= 0.0 {
        return image.clone();
    }

    let (w, h) = (image.width(), image.height());

    let channels: [GrayImage; 3] = std::array::from_fn(|c| {
        GrayImage::from_fn(w, h, |x, y| image::Luma([image.get_pixel(x, y).0[c]]))
    });

    let blurred: [GrayImage; 3] =
        std::array::from_fn(|c| imageproc::filter::gaussian_blur_f32(&channels[c], sigma));

    RgbImage::from_fn(w, h, |x, y| {
        image::Rgb([
            blurred[0].get_pixel(x, y).0[0],
            blurred[1].get_pixel(x, y).0[0],
            blurred[2].get_pixel(x, y).0[0],
        ])
    })
}

/// Sharpen an RGB image with an unsharp mask.
///
/// For every channel value `v` with blurred counterpart `b`, the output
/// is `v + (v - b) * percent / 100` when `|v - b| > threshold`, and `v`
/// otherwise. Results are clamped to `0..=255`.
#[must_use = "returns the sharpened image"]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn unsharp_mask(image: &RgbImage, sigma: f32, percent: u32, threshold: u8) -> RgbImage {
    let blurred = gaussian_blur_rgb(image, sigma);
    let gain = percent as f32 / 100.0;
    let threshold = i16::from(threshold);

    let mut out = image.clone();
    for (dst, src) in out.pixels_mut().zip(blurred.pixels()) {
        for c in 0..3 {
            let v = i16::from(dst.0[c]);
            let diff = v - i16::from(src.0[c]);
            if diff.abs() > threshold {
                let sharpened = f32::from(diff).mul_add(gain, f32::from(v));
                dst.0[c] = sharpened.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}
