//! Mask geometry: resolution-independent region masks.
//!
//! Shapes are described in fractions of the reference image's width and
//! height ([`RelPoint`], [`RelRadii`]) and rasterised with `tiny-skia`
//! into a single-channel [`Mask`] of exactly the reference size. Stroke
//! widths are relative to the shorter image side, blur radii to the
//! longer side; both are floored to whole pixels and never drop below
//! one pixel.
//!
//! Masks combine by pointwise maximum ([`union_masks`]), pointwise
//! multiplication ([`intersect_masks`]), saturating difference
//! ([`subtract_mask`]) and inversion ([`invert_mask`]).

use image::Luma;
use imageproc::morphology::Mask as Kernel;
use tiny_skia::{FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::blur::gaussian_blur;
use crate::types::{Dimensions, Mask, RelPoint, RelRadii};

/// Stroke width in pixels for a width relative to the shorter side.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn stroke_width_px(dims: Dimensions, width_rel: f64) -> f32 {
    ((f64::from(dims.min_side()) * width_rel).floor() as f32).max(1.0)
}

/// Blur radius in pixels for a radius relative to the longer side.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn blur_radius_px(dims: Dimensions, blur_rel: f64) -> f32 {
    ((f64::from(dims.max_side()) * blur_rel).floor() as f32).max(1.0)
}

/// Filled, unblurred ellipse.
#[must_use]
pub fn fill_ellipse(dims: Dimensions, center: RelPoint, radii: RelRadii) -> Mask {
    let (cx, cy) = center.to_pixels(dims);
    let (rx, ry) = radii.to_pixels(dims);
    rasterize(dims, |pixmap, paint| {
        if let Some(path) = Rect::from_ltrb(cx - rx, cy - ry, cx + rx, cy + ry)
            .and_then(PathBuilder::from_oval)
        {
            pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
        }
    })
}

/// Filled, unblurred polygon. Fewer than three points draws nothing.
#[must_use]
pub fn fill_polygon(dims: Dimensions, points: &[RelPoint]) -> Mask {
    if points.len() < 3 {
        return Mask::new(dims.width, dims.height);
    }
    rasterize(dims, |pixmap, paint| {
        if let Some(path) = build_path(dims, points, true) {
            pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
        }
    })
}

/// Filled ellipse, feathered by a Gaussian blur.
#[must_use]
pub fn ellipse_mask(dims: Dimensions, center: RelPoint, radii: RelRadii, blur_rel: f64) -> Mask {
    gaussian_blur(&fill_ellipse(dims, center, radii), blur_radius_px(dims, blur_rel))
}

/// Elliptical ring: the outer ellipse minus the same ellipse inset by
/// the stroke width on every side, then blurred.
#[must_use]
pub fn stroked_ellipse_mask(
    dims: Dimensions,
    center: RelPoint,
    radii: RelRadii,
    width_rel: f64,
    blur_rel: f64,
) -> Mask {
    let inset = stroke_width_px(dims, width_rel);
    let outer = fill_ellipse(dims, center, radii);
    let (cx, cy) = center.to_pixels(dims);
    let (rx, ry) = radii.to_pixels(dims);
    let inner = rasterize(dims, |pixmap, paint| {
        if let Some(path) = Rect::from_ltrb(cx - rx + inset, cy - ry + inset, cx + rx - inset, cy + ry - inset)
            .and_then(PathBuilder::from_oval)
        {
            pixmap.fill_path(&path, paint, FillRule::Winding, Transform::identity(), None);
        }
    });
    gaussian_blur(&subtract_mask(&outer, &inner), blur_radius_px(dims, blur_rel))
}

/// Stroked polyline with round joins, then blurred.
///
/// A polyline with fewer than two points yields an empty mask.
#[must_use]
pub fn polyline_mask(dims: Dimensions, points: &[RelPoint], width_rel: f64, blur_rel: f64) -> Mask {
    let stroke = Stroke {
        width: stroke_width_px(dims, width_rel),
        line_cap: LineCap::Butt,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    let line = rasterize(dims, |pixmap, paint| {
        if let Some(path) = build_path(dims, points, false) {
            pixmap.stroke_path(&path, paint, &stroke, Transform::identity(), None);
        }
    });
    gaussian_blur(&line, blur_radius_px(dims, blur_rel))
}

/// Pointwise maximum across any number of masks.
///
/// Masks whose size differs from `dims` are ignored. With no masks the
/// result is all zeros.
#[must_use]
pub fn union_masks<'a, I>(dims: Dimensions, masks: I) -> Mask
where
    I: IntoIterator<Item = &'a Mask>,
{
    let mut out = Mask::new(dims.width, dims.height);
    for mask in masks {
        if Dimensions::of(mask) != dims {
            continue;
        }
        for (dst, src) in out.pixels_mut().zip(mask.pixels()) {
            dst.0[0] = dst.0[0].max(src.0[0]);
        }
    }
    out
}

/// Pointwise product, rescaled so `255 * 255` maps back to 255.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn intersect_masks(a: &Mask, b: &Mask) -> Mask {
    Mask::from_fn(a.width(), a.height(), |x, y| {
        let bv = b.get_pixel_checked(x, y).map_or(0, |p| p.0[0]);
        let product = u16::from(a.get_pixel(x, y).0[0]) * u16::from(bv);
        Luma([((product + 127) / 255) as u8])
    })
}

/// Saturating pointwise difference `a - b`.
#[must_use]
pub fn subtract_mask(a: &Mask, b: &Mask) -> Mask {
    Mask::from_fn(a.width(), a.height(), |x, y| {
        let bv = b.get_pixel_checked(x, y).map_or(0, |p| p.0[0]);
        Luma([a.get_pixel(x, y).0[0].saturating_sub(bv)])
    })
}

/// `255 - v` for every pixel.
#[must_use]
pub fn invert_mask(mask: &Mask) -> Mask {
    let mut out = mask.clone();
    for p in out.pixels_mut() {
        p.0[0] = 255 - p.0[0];
    }
    out
}

/// Minimum filter over a square window of odd side `size`.
#[must_use]
pub fn erode(mask: &Mask, size: u32) -> Mask {
    match square_kernel(size) {
        Some(kernel) => imageproc::morphology::grayscale_erode(mask, &kernel),
        None => mask.clone(),
    }
}

/// Maximum filter over a square window of odd side `size`.
#[must_use]
pub fn dilate(mask: &Mask, size: u32) -> Mask {
    match square_kernel(size) {
        Some(kernel) => imageproc::morphology::grayscale_dilate(mask, &kernel),
        None => mask.clone(),
    }
}

/// Zero every row outside `keep` (inclusive start, exclusive end).
#[must_use]
pub fn keep_rows(mask: &Mask, keep: std::ops::Range<u32>) -> Mask {
    let mut out = mask.clone();
    for (_, y, p) in out.enumerate_pixels_mut() {
        if !keep.contains(&y) {
            p.0[0] = 0;
        }
    }
    out
}

/// Square structuring element of side `size`; `None` for sizes below 3.
#[allow(clippy::cast_possible_truncation)]
fn square_kernel(size: u32) -> Option<Kernel> {
    let radius = (size / 2).min(u32::from(u8::MAX)) as u8;
    (radius > 0).then(|| Kernel::square(radius))
}

fn build_path(dims: Dimensions, points: &[RelPoint], close: bool) -> Option<tiny_skia::Path> {
    let (first, rest) = points.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let mut pb = PathBuilder::new();
    let (x, y) = first.to_pixels(dims);
    pb.move_to(x, y);
    for p in rest {
        let (x, y) = p.to_pixels(dims);
        pb.line_to(x, y);
    }
    if close {
        pb.close();
    }
    pb.finish()
}

/// Draw opaque white onto a transparent canvas and keep the alpha
/// channel as the mask.
fn rasterize(dims: Dimensions, draw: impl FnOnce(&mut Pixmap, &Paint<'_>)) -> Mask {
    let Some(mut pixmap) = Pixmap::new(dims.width, dims.height) else {
        return Mask::new(dims.width, dims.height);
    };
    let mut paint = Paint::default();
    paint.set_color_rgba8(255, 255, 255, 255);
    paint.anti_alias = true;
    draw(&mut pixmap, &paint);

    let alpha: Vec<u8> = pixmap.pixels().iter().map(|p| p.alpha()).collect();
    Mask::from_raw(dims.width, dims.height, alpha)
        .unwrap_or_else(|| Mask::new(dims.width, dims.height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIMS: Dimensions = Dimensions::new(200, 100);

    fn value(mask: &Mask, x: u32, y: u32) -> u8 {
        mask.get_pixel(x, y).0[0]
    }

    #[test]
    fn stroke_and_blur_never_below_one_pixel() {
        let tiny = Dimensions::new(10, 10);
        assert!((stroke_width_px(tiny, 0.0001) - 1.0).abs() < f32::EPSILON);
        assert!((blur_radius_px(tiny, 0.0001) - 1.0).abs() < f32::EPSILON);
        assert!((blur_radius_px(Dimensions::new(1000, 500), 0.012) - 12.0).abs() < f32::EPSILON);
        assert!((stroke_width_px(Dimensions::new(1000, 500), 0.004) - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn filled_ellipse_covers_center_not_corners() {
        let m = fill_ellipse(DIMS, RelPoint::new(0.5, 0.5), RelRadii::new(0.25, 0.25));
        assert_eq!(m.dimensions(), (200, 100));
        assert_eq!(value(&m, 100, 50), 255);
        assert_eq!(value(&m, 0, 0), 0);
        assert_eq!(value(&m, 199, 99), 0);
    }

    #[test]
    fn ring_is_hollow() {
        let m = stroked_ellipse_mask(
            Dimensions::new(400, 400),
            RelPoint::new(0.5, 0.5),
            RelRadii::new(0.3, 0.3),
            0.01,
            0.001,
        );
        // Center is far from the ring, the rim (x = 80) sits on it.
        assert_eq!(value(&m, 200, 200), 0);
        assert!(value(&m, 81, 200) > 100, "rim = {}", value(&m, 81, 200));
    }

    #[test]
    fn polyline_marks_its_path() {
        let points = [RelPoint::new(0.1, 0.5), RelPoint::new(0.9, 0.5)];
        let m = polyline_mask(DIMS, &points, 0.05, 0.001);
        assert!(value(&m, 100, 50) > 200);
        assert_eq!(value(&m, 100, 5), 0);
    }

    #[test]
    fn single_point_polyline_is_empty() {
        let m = polyline_mask(DIMS, &[RelPoint::new(0.5, 0.5)], 0.05, 0.01);
        assert!(m.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn polygon_with_two_points_is_empty() {
        let m = fill_polygon(DIMS, &[RelPoint::new(0.1, 0.1), RelPoint::new(0.9, 0.9)]);
        assert!(m.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn polygon_fills_interior() {
        let square = [
            RelPoint::new(0.25, 0.25),
            RelPoint::new(0.75, 0.25),
            RelPoint::new(0.75, 0.75),
            RelPoint::new(0.25, 0.75),
        ];
        let m = fill_polygon(DIMS, &square);
        assert_eq!(value(&m, 100, 50), 255);
        assert_eq!(value(&m, 10, 10), 0);
    }

    #[test]
    fn union_takes_pointwise_maximum() {
        let a = Mask::from_fn(4, 1, |x, _| Luma([[10, 200, 0, 50][x as usize]]));
        let b = Mask::from_fn(4, 1, |x, _| Luma([[20, 100, 0, 40][x as usize]]));
        let u = union_masks(Dimensions::new(4, 1), [&a, &b]);
        assert_eq!(u.as_raw(), &vec![20, 200, 0, 50]);
    }

    #[test]
    fn union_of_nothing_is_blank() {
        let u = union_masks(DIMS, Vec::<&Mask>::new());
        assert_eq!(u.dimensions(), (200, 100));
        assert!(u.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn intersect_and_invert() {
        let a = Mask::from_fn(3, 1, |x, _| Luma([[255, 255, 128][x as usize]]));
        let b = Mask::from_fn(3, 1, |x, _| Luma([[255, 0, 255][x as usize]]));
        assert_eq!(intersect_masks(&a, &b).as_raw(), &vec![255, 0, 128]);
        assert_eq!(invert_mask(&a).as_raw(), &vec![0, 0, 127]);
        assert_eq!(subtract_mask(&a, &b).as_raw(), &vec![0, 255, 0]);
    }

    #[test]
    fn erode_shrinks_and_dilate_grows() {
        let mut m = Mask::new(11, 11);
        for y in 3..8 {
            for x in 3..8 {
                m.put_pixel(x, y, Luma([255]));
            }
        }
        let eroded = erode(&m, 3);
        assert_eq!(value(&eroded, 5, 5), 255);
        assert_eq!(value(&eroded, 3, 3), 0);
        let dilated = dilate(&m, 3);
        assert_eq!(value(&dilated, 2, 2), 255);
        assert_eq!(value(&dilated, 1, 1), 0);
    }

    #[test]
    fn window_below_three_is_identity() {
        let m = Mask::from_fn(5, 5, |x, y| Luma([u8::try_from(x * 10 + y).unwrap_or(0)]));
        assert_eq!(erode(&m, 1), m);
        assert_eq!(dilate(&m, 0), m);
    }

    #[test]
    fn keep_rows_clears_outside_range() {
        let m = Mask::from_pixel(2, 4, Luma([255]));
        let kept = keep_rows(&m, 1..3);
        assert_eq!(kept.as_raw(), &vec![0, 0, 255, 255, 255, 255, 0, 0]);
    }
}
