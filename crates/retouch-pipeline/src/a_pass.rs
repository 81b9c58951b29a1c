//! A-pass: face mask, sharpened base image and contour guide.
//!
//! Everything here is a pure function of the input pixels and the
//! [`APassConfig`]; identical input yields bit-identical output.

use serde::{Deserialize, Serialize};

use crate::blur::{gaussian_blur, unsharp_mask};
use crate::geometry::{
    blur_radius_px, erode, fill_ellipse, intersect_masks, invert_mask, keep_rows, subtract_mask,
};
use crate::guide::guide_strokes_mask;
use crate::types::{Dimensions, Mask, PipelineError, RelPoint, RelRadii, RgbImage};

/// Relative placement of the face-selection ellipse and its cut-outs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaceMaskGeometry {
    /// Center of the face ellipse.
    pub center: RelPoint,
    /// Radii of the face ellipse.
    pub radii: RelRadii,
    /// Centers of the two eye cut-outs.
    pub eye_centers: [RelPoint; 2],
    /// Radii shared by both eye cut-outs.
    pub eye_radii: RelRadii,
    /// Center of the mouth cut-out.
    pub mouth_center: RelPoint,
    /// Radii of the mouth cut-out.
    pub mouth_radii: RelRadii,
    /// Rows at or above this fraction of the height are cleared (hairline).
    pub top_band: f64,
    /// Rows at or below this fraction of the height are cleared (neck).
    pub bottom_band: f64,
    /// Feathering blur relative to the longer side.
    pub blur_rel: f64,
    /// Erosion window relative to the shorter side.
    pub erode_rel: f64,
}

impl Default for FaceMaskGeometry {
    fn default() -> Self {
        Self {
            center: RelPoint::new(0.50, 0.48),
            radii: RelRadii::new(0.22, 0.28),
            eye_centers: [RelPoint::new(0.34, 0.41), RelPoint::new(0.66, 0.41)],
            eye_radii: RelRadii::new(0.088, 0.046),
            mouth_center: RelPoint::new(0.50, 0.62),
            mouth_radii: RelRadii::new(0.15, 0.05),
            top_band: 0.18,
            bottom_band: 0.65,
            blur_rel: 0.012,
            erode_rel: 0.012,
        }
    }
}

impl FaceMaskGeometry {
    /// Odd erosion window for an image of the given size, at least 3.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn erode_size(&self, dims: Dimensions) -> u32 {
        let raw = (f64::from(dims.min_side()) * self.erode_rel).floor() as u32;
        raw.max(3) | 1
    }
}

/// Unsharp-mask parameters for the base image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SharpenParams {
    /// Blur radius relative to the longer side.
    pub radius_rel: f64,
    /// Strength in percent.
    pub percent: u32,
    /// Minimum per-channel difference that gets sharpened.
    pub threshold: u8,
}

impl Default for SharpenParams {
    fn default() -> Self {
        Self {
            radius_rel: 0.004,
            percent: 180,
            threshold: 2,
        }
    }
}

/// A-pass settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct APassConfig {
    /// Face mask placement.
    pub face: FaceMaskGeometry,
    /// Base-image sharpening.
    pub sharpen: SharpenParams,
}

/// The three A-pass artifacts, all the size of the input.
#[derive(Debug, Clone, PartialEq)]
pub struct APassOutput {
    /// Where the B-pass may edit.
    pub face_mask: Mask,
    /// Input sharpened inside the face mask.
    pub base_image: RgbImage,
    /// White canvas with facial contour strokes darkened.
    pub contour_guide: Mask,
}

/// Run the A-pass over an input portrait.
///
/// # Errors
///
/// Returns [`PipelineError::ZeroArea`] if the image has no pixels.
pub fn synthesize(input: &RgbImage, config: &APassConfig) -> Result<APassOutput, PipelineError> {
    let dims = Dimensions::of(input);
    if dims.width == 0 || dims.height == 0 {
        return Err(PipelineError::ZeroArea(dims));
    }

    let face_mask = face_mask(dims, &config.face);

    let sigma = blur_radius_px(dims, config.sharpen.radius_rel);
    let sharp = unsharp_mask(input, sigma, config.sharpen.percent, config.sharpen.threshold);
    let base_image = composite(&sharp, input, &face_mask);

    let strokes = guide_strokes_mask(dims);
    let contour_guide = invert_mask(&intersect_masks(&strokes, &face_mask));

    tracing::debug!(%dims, "a-pass synthesized");
    Ok(APassOutput {
        face_mask,
        base_image,
        contour_guide,
    })
}

/// Face-selection mask: ellipse minus eyes, mouth and the top and
/// bottom bands, feathered then eroded.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn face_mask(dims: Dimensions, geometry: &FaceMaskGeometry) -> Mask {
    let mut mask = fill_ellipse(dims, geometry.center, geometry.radii);
    for eye in geometry.eye_centers {
        mask = subtract_mask(&mask, &fill_ellipse(dims, eye, geometry.eye_radii));
    }
    mask = subtract_mask(&mask, &fill_ellipse(dims, geometry.mouth_center, geometry.mouth_radii));

    let h = f64::from(dims.height);
    let top = (h * geometry.top_band).floor() as u32;
    let bottom = (h * geometry.bottom_band).floor() as u32;
    mask = keep_rows(&mask, top.saturating_add(1)..bottom);

    let mask = gaussian_blur(&mask, blur_radius_px(dims, geometry.blur_rel));
    erode(&mask, geometry.erode_size(dims))
}

/// Blend `fg` over `bg` with `weight` as per-pixel alpha.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn composite(fg: &RgbImage, bg: &RgbImage, weight: &Mask) -> RgbImage {
    let mut out = bg.clone();
    for ((dst, src), w) in out.pixels_mut().zip(fg.pixels()).zip(weight.pixels()) {
        let a = u16::from(w.0[0]);
        for c in 0..3 {
            let blended = u16::from(src.0[c]) * a + u16::from(dst.0[c]) * (255 - a);
            dst.0[c] = ((blended + 127) / 255) as u8;
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn portrait(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = u8::try_from((x * 7 + y * 3) % 256).unwrap();
            image::Rgb([v, v.wrapping_add(40), v.wrapping_mul(3)])
        })
    }

    #[test]
    fn outputs_match_input_size() {
        let img = portrait(120, 160);
        let out = synthesize(&img, &APassConfig::default()).unwrap();
        assert_eq!(out.face_mask.dimensions(), (120, 160));
        assert_eq!(out.base_image.dimensions(), (120, 160));
        assert_eq!(out.contour_guide.dimensions(), (120, 160));
    }

    #[test]
    fn synthesize_is_deterministic() {
        let img = portrait(96, 128);
        let a = synthesize(&img, &APassConfig::default()).unwrap();
        let b = synthesize(&img, &APassConfig::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_area_is_rejected() {
        let img = RgbImage::new(0, 10);
        assert!(matches!(
            synthesize(&img, &APassConfig::default()),
            Err(PipelineError::ZeroArea(_))
        ));
    }

    #[test]
    fn face_mask_selects_cheeks_not_eyes_or_bands() {
        let dims = Dimensions::new(400, 400);
        let mask = face_mask(dims, &FaceMaskGeometry::default());
        let at = |x: f64, y: f64| {
            mask.get_pixel((x * 400.0) as u32, (y * 400.0) as u32).0[0]
        };
        // Cheek, left of the nose and below the eyes.
        assert!(at(0.40, 0.52) > 200, "cheek = {}", at(0.40, 0.52));
        assert_eq!(at(0.34, 0.41), 0, "eye");
        assert_eq!(at(0.50, 0.62), 0, "mouth");
        assert_eq!(at(0.50, 0.10), 0, "hairline band");
        assert_eq!(at(0.50, 0.80), 0, "neck band");
        assert_eq!(at(0.02, 0.50), 0, "outside ellipse");
    }

    #[test]
    fn erode_size_is_odd_and_at_least_three() {
        let g = FaceMaskGeometry::default();
        assert_eq!(g.erode_size(Dimensions::new(100, 100)), 3);
        assert_eq!(g.erode_size(Dimensions::new(1024, 768)), 9);
        assert_eq!(g.erode_size(Dimensions::new(2000, 1000)), 13);
    }

    #[test]
    fn base_image_unchanged_outside_face() {
        let img = portrait(120, 160);
        let out = synthesize(&img, &APassConfig::default()).unwrap();
        assert_eq!(out.base_image.get_pixel(0, 0), img.get_pixel(0, 0));
        assert_eq!(out.base_image.get_pixel(119, 159), img.get_pixel(119, 159));
    }

    #[test]
    fn contour_guide_is_white_outside_face() {
        let img = portrait(200, 200);
        let out = synthesize(&img, &APassConfig::default()).unwrap();
        assert_eq!(out.contour_guide.get_pixel(0, 0).0[0], 255);
        assert_eq!(out.contour_guide.get_pixel(100, 190).0[0], 255);
        assert!(out.contour_guide.pixels().any(|p| p.0[0] < 255));
    }

    #[test]
    fn composite_respects_weight() {
        let fg = RgbImage::from_pixel(2, 1, image::Rgb([200, 200, 200]));
        let bg = RgbImage::from_pixel(2, 1, image::Rgb([100, 100, 100]));
        let w = Mask::from_fn(2, 1, |x, _| image::Luma([if x == 0 { 0 } else { 255 }]));
        let out = composite(&fg, &bg, &w);
        assert_eq!(out.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(out.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn config_parses_partial_yaml() {
        let cfg: APassConfig = serde_yaml::from_str("face:\n  center: [0.5, 0.5]\nsharpen:\n  percent: 120\n").unwrap();
        assert_eq!(cfg.face.center, RelPoint::new(0.5, 0.5));
        assert_eq!(cfg.face.radii, RelRadii::new(0.22, 0.28));
        assert_eq!(cfg.sharpen.percent, 120);
        assert_eq!(cfg.sharpen.threshold, 2);
    }
}
