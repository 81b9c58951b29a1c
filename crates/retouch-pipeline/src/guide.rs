//! Anatomical guide strokes for the contour guide image.
//!
//! Each stroke is a polyline or an elliptical ring in relative
//! coordinates with a hand-tuned relative width and blur. The table is
//! ordered roughly top-to-bottom within each feature group; order does
//! not affect the result because strokes combine by union.

use crate::geometry::{polyline_mask, stroked_ellipse_mask, union_masks};
use crate::types::{Dimensions, Mask, RelPoint, RelRadii};

/// Geometry of a single guide stroke.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StrokeShape {
    /// Open polyline through the given relative points.
    Polyline(&'static [(f64, f64)]),
    /// Elliptical ring around a center.
    Ring {
        /// Relative center `(x, y)`.
        center: (f64, f64),
        /// Relative radii `(rx, ry)`.
        radii: (f64, f64),
    },
}

/// One named stroke of the contour guide.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GuideStroke {
    /// Anatomical name, used in debug output.
    pub name: &'static str,
    /// Stroke geometry.
    pub shape: StrokeShape,
    /// Stroke width relative to the shorter image side.
    pub width_rel: f64,
    /// Blur radius relative to the longer image side.
    pub blur_rel: f64,
}

impl GuideStroke {
    const fn line(name: &'static str, points: &'static [(f64, f64)], width_rel: f64, blur_rel: f64) -> Self {
        Self {
            name,
            shape: StrokeShape::Polyline(points),
            width_rel,
            blur_rel,
        }
    }

    const fn ring(name: &'static str, center: (f64, f64), radii: (f64, f64), width_rel: f64, blur_rel: f64) -> Self {
        Self {
            name,
            shape: StrokeShape::Ring { center, radii },
            width_rel,
            blur_rel,
        }
    }

    /// Rasterise this stroke at the given image size.
    #[must_use]
    pub fn render(&self, dims: Dimensions) -> Mask {
        match self.shape {
            StrokeShape::Polyline(points) => {
                let points: Vec<RelPoint> = points.iter().copied().map(RelPoint::from).collect();
                polyline_mask(dims, &points, self.width_rel, self.blur_rel)
            }
            StrokeShape::Ring { center, radii } => stroked_ellipse_mask(
                dims,
                RelPoint::from(center),
                RelRadii::from(radii),
                self.width_rel,
                self.blur_rel,
            ),
        }
    }
}

/// Every stroke that makes up the contour guide.
pub static GUIDE_STROKES: &[GuideStroke] = &[
    // Outline
    GuideStroke::ring("oval", (0.50, 0.50), (0.24, 0.30), 0.0032, 0.010),
    GuideStroke::line("jaw", &[(0.38, 0.64), (0.50, 0.648), (0.62, 0.64)], 0.0032, 0.012),
    GuideStroke::line("temple_L", &[(0.30, 0.28), (0.28, 0.24), (0.32, 0.22)], 0.003, 0.012),
    GuideStroke::line("temple_R", &[(0.70, 0.28), (0.72, 0.24), (0.68, 0.22)], 0.003, 0.012),
    // Cheekbones
    GuideStroke::line("cheek_main_L", &[(0.33, 0.56), (0.40, 0.59), (0.46, 0.58)], 0.006, 0.005),
    GuideStroke::line("cheek_main_R", &[(0.67, 0.56), (0.60, 0.59), (0.54, 0.58)], 0.006, 0.005),
    GuideStroke::line("cheek_upper_L", &[(0.36, 0.50), (0.42, 0.52), (0.48, 0.51)], 0.0042, 0.005),
    GuideStroke::line("cheek_upper_R", &[(0.64, 0.50), (0.58, 0.52), (0.52, 0.51)], 0.0042, 0.005),
    GuideStroke::line("cheek_ridge_L", &[(0.33, 0.54), (0.40, 0.565), (0.47, 0.555)], 0.003, 0.004),
    GuideStroke::line("cheek_ridge_R", &[(0.67, 0.54), (0.60, 0.565), (0.53, 0.555)], 0.003, 0.004),
    GuideStroke::line("cheek_shadow_L", &[(0.42, 0.60), (0.46, 0.62), (0.48, 0.64)], 0.0042, 0.009),
    GuideStroke::line("cheek_shadow_R", &[(0.58, 0.60), (0.54, 0.62), (0.52, 0.64)], 0.0042, 0.009),
    GuideStroke::line("forehead", &[(0.38, 0.26), (0.50, 0.24), (0.62, 0.26)], 0.0028, 0.012),
    // Eyes
    GuideStroke::line("upper_lid_L", &[(0.40, 0.41), (0.45, 0.405), (0.50, 0.41)], 0.0034, 0.006),
    GuideStroke::line("lower_lid_L", &[(0.40, 0.43), (0.45, 0.435), (0.50, 0.43)], 0.0029, 0.006),
    GuideStroke::line("upper_lid_R", &[(0.60, 0.41), (0.55, 0.405), (0.50, 0.41)], 0.0034, 0.006),
    GuideStroke::line("lower_lid_R", &[(0.60, 0.43), (0.55, 0.435), (0.50, 0.43)], 0.0029, 0.006),
    GuideStroke::line("crow_L", &[(0.50, 0.42), (0.52, 0.425), (0.535, 0.43)], 0.0024, 0.010),
    GuideStroke::line("crow_R", &[(0.50, 0.42), (0.48, 0.425), (0.465, 0.43)], 0.0024, 0.010),
    // Nose
    GuideStroke::line("nose_bridge", &[(0.50, 0.38), (0.50, 0.52)], 0.0032, 0.006),
    GuideStroke::ring("nose_tip", (0.50, 0.55), (0.020, 0.012), 0.003, 0.007),
    GuideStroke::line("nose_L", &[(0.488, 0.47), (0.486, 0.53)], 0.003, 0.008),
    GuideStroke::line("nose_R", &[(0.512, 0.47), (0.514, 0.53)], 0.003, 0.008),
    // Mouth
    GuideStroke::line("upper_lip", &[(0.44, 0.62), (0.50, 0.615), (0.56, 0.62)], 0.0042, 0.009),
    GuideStroke::line("lower_lip", &[(0.44, 0.63), (0.50, 0.635), (0.56, 0.63)], 0.0038, 0.009),
    GuideStroke::line("cupid_bow", &[(0.485, 0.615), (0.50, 0.61), (0.515, 0.615)], 0.0036, 0.008),
    GuideStroke::line("naso_L", &[(0.485, 0.56), (0.47, 0.60)], 0.003, 0.011),
    GuideStroke::line("naso_R", &[(0.515, 0.56), (0.53, 0.60)], 0.003, 0.011),
    GuideStroke::line("marionette_L", &[(0.47, 0.64), (0.47, 0.66)], 0.0028, 0.011),
    GuideStroke::line("marionette_R", &[(0.53, 0.64), (0.53, 0.66)], 0.0028, 0.011),
    // Chin and neck
    GuideStroke::line("under_chin", &[(0.44, 0.655), (0.50, 0.66), (0.56, 0.655)], 0.0028, 0.014),
    GuideStroke::line("neck_L", &[(0.46, 0.67), (0.46, 0.64)], 0.0022, 0.014),
    GuideStroke::line("neck_R", &[(0.54, 0.67), (0.54, 0.64)], 0.0022, 0.014),
];

/// Union of every guide stroke at the given size, before face clipping.
#[must_use]
pub fn guide_strokes_mask(dims: Dimensions) -> Mask {
    let rendered: Vec<Mask> = GUIDE_STROKES.iter().map(|s| s.render(dims)).collect();
    union_masks(dims, &rendered)
}
