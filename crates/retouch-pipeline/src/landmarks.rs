//! Refinement masks built from face-mesh landmarks.

use crate::blur::gaussian_blur;
use crate::geometry::{dilate, fill_polygon, keep_rows, union_masks};
use crate::service::FaceLandmarks;
use crate::types::{Dimensions, Mask, RelPoint};

/// Left malar region, closed.
pub const LEFT_CHEEK: &[usize] = &[50, 101, 118, 117, 123, 147, 177, 215, 50];
/// Right malar region, closed.
pub const RIGHT_CHEEK: &[usize] = &[280, 330, 347, 346, 352, 376, 405, 435, 280];
/// Right eye contour.
pub const RIGHT_EYE: &[usize] = &[33, 7, 163, 144, 145, 153, 154, 155, 133, 173, 157, 158, 159, 160, 161, 246];
/// Left eye contour.
pub const LEFT_EYE: &[usize] = &[362, 382, 381, 380, 374, 373, 390, 249, 263, 466, 388, 387, 386, 385, 384, 398];

/// Landmark positions for `indices`, skipping any the mesh lacks.
fn polygon(landmarks: &FaceLandmarks, indices: &[usize]) -> Vec<RelPoint> {
    indices
        .iter()
        .filter_map(|&i| landmarks.get(i))
        .map(RelPoint::from)
        .collect()
}

/// Max filter then Gaussian blur, each skipped at zero.
#[allow(clippy::cast_precision_loss)]
fn soften(mask: &Mask, dilate_px: u32, blur_px: u32) -> Mask {
    let mask = if dilate_px > 0 {
        dilate(mask, (dilate_px | 1).max(3))
    } else {
        mask.clone()
    };
    if blur_px > 0 {
        gaussian_blur(&mask, blur_px as f32)
    } else {
        mask
    }
}

/// Both cheek regions, dilated and blurred.
///
/// Returns `None` when neither polygon has three usable points.
#[must_use]
pub fn cheek_mask(dims: Dimensions, landmarks: &FaceLandmarks, dilate_px: u32, blur_px: u32) -> Option<Mask> {
    let regions: Vec<Mask> = [LEFT_CHEEK, RIGHT_CHEEK]
        .into_iter()
        .map(|idx| polygon(landmarks, idx))
        .filter(|poly| poly.len() >= 3)
        .map(|poly| fill_polygon(dims, &poly))
        .collect();
    if regions.is_empty() {
        return None;
    }
    Some(soften(&union_masks(dims, &regions), dilate_px, blur_px))
}

/// Upper half of both eye regions, where the lashes sit, dilated and
/// blurred.
///
/// Returns `None` when neither eye polygon has three usable points.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn eyelash_mask(dims: Dimensions, landmarks: &FaceLandmarks, dilate_px: u32, blur_px: u32) -> Option<Mask> {
    let regions: Vec<Mask> = [RIGHT_EYE, LEFT_EYE]
        .into_iter()
        .map(|idx| polygon(landmarks, idx))
        .filter(|poly| poly.len() >= 3)
        .map(|poly| {
            let (top, bottom) = poly
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
            let h = f64::from(dims.height);
            let start = (top * h).floor().max(0.0) as u32;
            let mid = ((top + bottom) / 2.0 * h).ceil().max(0.0) as u32;
            keep_rows(&fill_polygon(dims, &poly), start..mid)
        })
        .collect();
    if regions.is_empty() {
        return None;
    }
    Some(soften(&union_masks(dims, &regions), dilate_px, blur_px))
}
