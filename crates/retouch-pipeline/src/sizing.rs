//! Target resolution for inpainting requests.

use crate::types::Dimensions;

/// Longest side the inpainting service is asked to render.
pub const MAX_SIDE: u32 = 768;

/// Both sides are rounded down to a multiple of this.
pub const ALIGN: u32 = 64;

/// Neither side drops below this after rounding.
pub const MIN_SIDE: u32 = 256;

/// Request width and height for a source image.
///
/// Downscales so the longer side is at most [`MAX_SIDE`] (never
/// upscales), floors each side to a multiple of [`ALIGN`], and clamps
/// each side to at least [`MIN_SIDE`].
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
pub fn target_dimensions(source: Dimensions) -> Dimensions {
    let longest = source.max_side().max(1);
    let scale = (f64::from(MAX_SIDE) / f64::from(longest)).min(1.0);
    let fit = |side: u32| {
        let scaled = (f64::from(side) * scale).floor() as u32;
        ((scaled / ALIGN) * ALIGN).max(MIN_SIDE)
    };
    Dimensions::new(fit(source.width), fit(source.height))
}
