//! PNG and base64 encoding for service payloads.
//!
//! The inpainting service exchanges images as base64-encoded PNG,
//! optionally wrapped in a `data:` URL. These helpers convert between
//! in-memory buffers and those strings.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageEncoder;
use retouch_pipeline::types::{GrayImage, RgbImage};

/// Prefix of a PNG data URL.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Errors that can occur while encoding or decoding raster payloads.
#[derive(Debug, thiserror::Error)]
pub enum RasterError {
    /// PNG encoding or decoding failed.
    #[error("PNG codec failed: {0}")]
    Png(#[from] image::ImageError),

    /// The payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Encode an RGB image as PNG bytes.
///
/// # Errors
///
/// Returns [`RasterError::Png`] if PNG encoding fails.
pub fn rgb_to_png(image: &RgbImage) -> Result<Vec<u8>, RasterError> {
    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;
    Ok(png_bytes)
}

/// Encode a grayscale image as PNG bytes.
///
/// # Errors
///
/// Returns [`RasterError::Png`] if PNG encoding fails.
pub fn gray_to_png(image: &GrayImage) -> Result<Vec<u8>, RasterError> {
    let mut png_bytes = Vec::new();
    image::codecs::png::PngEncoder::new(&mut png_bytes).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::L8,
    )?;
    Ok(png_bytes)
}

/// RGB image as a base64 PNG string.
///
/// # Errors
///
/// Returns [`RasterError::Png`] if PNG encoding fails.
pub fn rgb_to_base64(image: &RgbImage) -> Result<String, RasterError> {
    Ok(STANDARD.encode(rgb_to_png(image)?))
}

/// Grayscale image as a base64 PNG string.
///
/// # Errors
///
/// Returns [`RasterError::Png`] if PNG encoding fails.
pub fn gray_to_base64(image: &GrayImage) -> Result<String, RasterError> {
    Ok(STANDARD.encode(gray_to_png(image)?))
}

/// Drop everything up to and including the first comma, if any.
#[must_use]
pub fn strip_data_url(payload: &str) -> &str {
    payload.split_once(',').map_or(payload, |(_, data)| data)
}

/// Decode a base64 image payload, with or without a data-URL prefix.
///
/// # Errors
///
/// Returns [`RasterError::Base64`] for malformed base64 and
/// [`RasterError::Png`] if the bytes are not a readable image.
pub fn decode_base64_rgb(payload: &str) -> Result<RgbImage, RasterError> {
    let bytes = STANDARD.decode(strip_data_url(payload).trim())?;
    Ok(image::load_from_memory(&bytes)?.to_rgb8())
}
