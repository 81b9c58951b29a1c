//! Shared types for the retouch pipeline.

use serde::{Deserialize, Serialize};

/// Re-export `GrayImage` so downstream crates can handle masks
/// without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can handle portraits
/// without depending on `image` directly.
pub use image::RgbImage;

/// A single-channel edit-strength map: 0 leaves a pixel untouched,
/// 255 edits it fully.
pub type Mask = GrayImage;

/// A position expressed as fractions of image width and height.
///
/// `(0.0, 0.0)` is the top-left corner, `(1.0, 1.0)` the bottom-right.
/// Serialized as a two-element `[x, y]` sequence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct RelPoint {
    /// Horizontal fraction of the image width.
    pub x: f64,
    /// Vertical fraction of the image height.
    pub y: f64,
}

impl RelPoint {
    /// Create a new relative point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Convert to pixel coordinates for an image of the given size.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_pixels(self, dims: Dimensions) -> (f32, f32) {
        (
            (self.x * f64::from(dims.width)) as f32,
            (self.y * f64::from(dims.height)) as f32,
        )
    }
}

impl From<(f64, f64)> for RelPoint {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<RelPoint> for (f64, f64) {
    fn from(p: RelPoint) -> Self {
        (p.x, p.y)
    }
}

/// Ellipse radii as fractions of image width (horizontal) and height
/// (vertical). Serialized as `[rx, ry]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct RelRadii {
    /// Horizontal radius as a fraction of the image width.
    pub rx: f64,
    /// Vertical radius as a fraction of the image height.
    pub ry: f64,
}

impl RelRadii {
    /// Create new relative radii.
    #[must_use]
    pub const fn new(rx: f64, ry: f64) -> Self {
        Self { rx, ry }
    }

    /// Convert to pixel radii for an image of the given size.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn to_pixels(self, dims: Dimensions) -> (f32, f32) {
        (
            (self.rx * f64::from(dims.width)) as f32,
            (self.ry * f64::from(dims.height)) as f32,
        )
    }
}

impl From<(f64, f64)> for RelRadii {
    fn from((rx, ry): (f64, f64)) -> Self {
        Self::new(rx, ry)
    }
}

impl From<RelRadii> for (f64, f64) {
    fn from(r: RelRadii) -> Self {
        (r.rx, r.ry)
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Dimensions of an existing image buffer.
    #[must_use]
    pub fn of<I: image::GenericImageView>(image: &I) -> Self {
        let (width, height) = image.dimensions();
        Self { width, height }
    }

    /// The longer of the two sides.
    #[must_use]
    pub const fn max_side(self) -> u32 {
        if self.width > self.height {
            self.width
        } else {
            self.height
        }
    }

    /// The shorter of the two sides.
    #[must_use]
    pub const fn min_side(self) -> u32 {
        if self.width < self.height {
            self.width
        } else {
            self.height
        }
    }
}

impl std::fmt::Display for Dimensions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Errors raised by the pure pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Failed to decode an input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// An image had zero width or height.
    #[error("image has zero area ({0})")]
    ZeroArea(Dimensions),

    /// Two buffers that must share a size did not.
    #[error("size mismatch: expected {expected}, found {found}")]
    SizeMismatch {
        /// Size of the reference image.
        expected: Dimensions,
        /// Size of the offending buffer.
        found: Dimensions,
    },
}

/// Decode raw image bytes into an RGB image.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyInput`] if `bytes` is empty and
/// [`PipelineError::ImageDecode`] if the format is unrecognized.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    if bytes.is_empty() {
        return Err(PipelineError::EmptyInput);
    }
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}
