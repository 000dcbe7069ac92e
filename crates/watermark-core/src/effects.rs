//! Raster effects used to build watermark layers
//!
//! Text effects work on single-channel coverage masks: the glyph mask is
//! rendered once, then stamped, dilated or blurred per pass and finally
//! painted in the pass color. Geometry transforms (rotation, slant) work on
//! finished RGBA layers.

use crate::composite::blend_over;
use crate::geometry::rotated_bounding_box;
use crate::models::Color;
use image::imageops;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::filter::box_filter;
use imageproc::geometric_transformations::{rotate_about_center, warp, Interpolation, Projection};

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Horizontal slant used for synthetic italics
pub const ITALIC_SHEAR: f32 = 0.2;

/// `255 · percent / 100`, truncated
pub fn opacity_to_alpha(opacity_percent: u8) -> u8 {
    (255 * opacity_percent.min(100) as u32 / 100) as u8
}

/// Max-stamp `mask` into `canvas` with its top-left at `(x, y)`
pub fn stamp_max(canvas: &mut GrayImage, mask: &GrayImage, x: i32, y: i32) {
    for (mx, my, coverage) in mask.enumerate_pixels() {
        if coverage[0] == 0 {
            continue;
        }
        let cx = x + mx as i32;
        let cy = y + my as i32;
        if cx < 0 || cy < 0 || cx >= canvas.width() as i32 || cy >= canvas.height() as i32 {
            continue;
        }
        let pixel = canvas.get_pixel_mut(cx as u32, cy as u32);
        pixel[0] = pixel[0].max(coverage[0]);
    }
}

/// Grow a mask by one pixel in all eight directions. The result is one pixel
/// larger on every side.
pub fn dilate(mask: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(mask.width() + 2, mask.height() + 2);
    for dy in 0..=2 {
        for dx in 0..=2 {
            stamp_max(&mut out, mask, dx, dy);
        }
    }
    out
}

/// Coverage of an outline of `width` pixels around `mask` placed at `origin`
/// on a `canvas_width × canvas_height` canvas
pub fn outline_coverage(
    mask: &GrayImage,
    canvas_width: u32,
    canvas_height: u32,
    origin: (i32, i32),
    width: u32,
) -> GrayImage {
    let mut canvas = GrayImage::new(canvas_width, canvas_height);
    let w = width as i32;
    for dy in -w..=w {
        for dx in -w..=w {
            if dx == 0 && dy == 0 {
                continue;
            }
            stamp_max(&mut canvas, mask, origin.0 + dx, origin.1 + dy);
        }
    }
    canvas
}

/// Coverage of a drop shadow: `mask` shifted by `offset` on both axes, then
/// softened by `blur_radius` passes of a radius-1 box filter
pub fn shadow_coverage(
    mask: &GrayImage,
    canvas_width: u32,
    canvas_height: u32,
    origin: (i32, i32),
    offset: i32,
    blur_radius: u32,
) -> GrayImage {
    let mut canvas = GrayImage::new(canvas_width, canvas_height);
    stamp_max(&mut canvas, mask, origin.0 + offset, origin.1 + offset);
    blur(canvas, blur_radius)
}

/// Repeated radius-1 box blur
pub fn blur(mut mask: GrayImage, passes: u32) -> GrayImage {
    for _ in 0..passes {
        mask = box_filter(&mask, 1, 1);
    }
    mask
}

/// Paint `coverage` in `color` at `alpha` over `layer` (same dimensions)
pub fn paint_coverage(layer: &mut RgbaImage, coverage: &GrayImage, color: Color, alpha: u8) {
    if alpha == 0 {
        return;
    }
    for (x, y, value) in coverage.enumerate_pixels() {
        let Luma([value]) = *value;
        if value == 0 {
            continue;
        }
        let pass_alpha = ((value as u32 * alpha as u32 + 127) / 255) as u8;
        let pixel = layer.get_pixel_mut(x, y);
        *pixel = blend_over(*pixel, color.with_alpha(pass_alpha));
    }
}

/// Multiply every alpha value by `opacity_percent / 100`
pub fn scale_alpha(image: &mut RgbaImage, opacity_percent: u8) {
    let opacity = opacity_percent.min(100) as u32;
    if opacity == 100 {
        return;
    }
    for pixel in image.pixels_mut() {
        pixel[3] = ((pixel[3] as u32 * opacity + 50) / 100) as u8;
    }
}

/// Slant a layer horizontally about its vertical center; the top leans right
pub fn shear_horizontal(image: &RgbaImage, factor: f32) -> RgbaImage {
    let center_y = image.height() as f32 / 2.0;
    let matrix = [1.0, -factor, factor * center_y, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0];
    match Projection::from_matrix(matrix) {
        Some(projection) => warp(image, &projection, Interpolation::Bilinear, TRANSPARENT),
        None => image.clone(),
    }
}

/// Rotate counter-clockwise by `degrees`, growing the canvas to the rotated
/// bounding box. The input's center stays at the output's center.
pub fn rotate_expand(image: &RgbaImage, degrees: i32) -> RgbaImage {
    match degrees.rem_euclid(360) {
        0 => return image.clone(),
        90 => return imageops::rotate270(image),
        180 => return imageops::rotate180(image),
        270 => return imageops::rotate90(image),
        _ => {}
    }

    let (width, height) = image.dimensions();
    let (rot_width, rot_height) = rotated_bounding_box(width, height, degrees as f64);
    let canvas_width = width.max(rot_width);
    let canvas_height = height.max(rot_height);

    let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, TRANSPARENT);
    imageops::overlay(
        &mut canvas,
        image,
        ((canvas_width - width) / 2) as i64,
        ((canvas_height - height) / 2) as i64,
    );

    // imageproc turns clockwise for positive angles
    let rotated = rotate_about_center(
        &canvas,
        -(degrees as f32).to_radians(),
        Interpolation::Bicubic,
        TRANSPARENT,
    );

    imageops::crop_imm(
        &rotated,
        (canvas_width - rot_width) / 2,
        (canvas_height - rot_height) / 2,
        rot_width,
        rot_height,
    )
    .to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot() -> GrayImage {
        GrayImage::from_pixel(1, 1, Luma([255]))
    }

    #[test]
    fn test_opacity_to_alpha() {
        assert_eq!(opacity_to_alpha(80), 204);
        assert_eq!(opacity_to_alpha(100), 255);
        assert_eq!(opacity_to_alpha(0), 0);
        assert_eq!(opacity_to_alpha(200), 255);
    }

    #[test]
    fn test_dilate_grows_by_one() {
        let grown = dilate(&dot());
        assert_eq!(grown.dimensions(), (3, 3));
        assert!(grown.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_outline_surrounds_but_skips_origin() {
        let outline = outline_coverage(&dot(), 5, 5, (2, 2), 1);
        assert_eq!(outline.get_pixel(2, 2)[0], 0);
        assert_eq!(outline.get_pixel(1, 1)[0], 255);
        assert_eq!(outline.get_pixel(3, 2)[0], 255);
        assert_eq!(outline.get_pixel(0, 0)[0], 0);
    }

    #[test]
    fn test_shadow_offset_and_blur() {
        let sharp = shadow_coverage(&dot(), 7, 7, (2, 2), 2, 0);
        assert_eq!(sharp.get_pixel(4, 4)[0], 255);
        assert_eq!(sharp.get_pixel(2, 2)[0], 0);

        let soft = shadow_coverage(&dot(), 7, 7, (2, 2), 2, 1);
        assert!(soft.get_pixel(4, 4)[0] < 255);
        assert!(soft.get_pixel(5, 5)[0] > 0);
    }

    #[test]
    fn test_paint_coverage() {
        let mut layer = RgbaImage::new(2, 1);
        let mut coverage = GrayImage::new(2, 1);
        coverage.put_pixel(0, 0, Luma([255]));
        paint_coverage(&mut layer, &coverage, Color::rgb(10, 20, 30), 204);
        assert_eq!(layer.get_pixel(0, 0), &Rgba([10, 20, 30, 204]));
        assert_eq!(layer.get_pixel(1, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_scale_alpha_preserves_gradient() {
        let mut image = RgbaImage::from_fn(3, 1, |x, _| Rgba([0, 0, 0, [255, 100, 0][x as usize]]));
        scale_alpha(&mut image, 50);
        assert_eq!(image.get_pixel(0, 0)[3], 128);
        assert_eq!(image.get_pixel(1, 0)[3], 50);
        assert_eq!(image.get_pixel(2, 0)[3], 0);
    }

    #[test]
    fn test_rotate_expand_right_angles() {
        let image = RgbaImage::from_fn(4, 2, |x, y| Rgba([x as u8, y as u8, 0, 255]));
        let rotated = rotate_expand(&image, 90);
        assert_eq!(rotated.dimensions(), (2, 4));
        // Counter-clockwise: the top-right corner moves to the top-left
        assert_eq!(rotated.get_pixel(0, 0), image.get_pixel(3, 0));
        assert_eq!(rotate_expand(&image, 180).dimensions(), (4, 2));
        assert_eq!(rotate_expand(&image, 0), image);
    }

    #[test]
    fn test_rotate_expand_arbitrary_angle() {
        let image = RgbaImage::from_pixel(100, 100, Rgba([255, 255, 255, 255]));
        let rotated = rotate_expand(&image, 45);
        assert_eq!(rotated.dimensions(), (141, 141));
        // Center stays opaque, corners become transparent
        assert_eq!(rotated.get_pixel(70, 70)[3], 255);
        assert_eq!(rotated.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn test_shear_keeps_dimensions() {
        let image = RgbaImage::from_pixel(20, 10, Rgba([255, 0, 0, 255]));
        let sheared = shear_horizontal(&image, ITALIC_SHEAR);
        assert_eq!(sheared.dimensions(), (20, 10));
        // The middle row does not move
        assert_eq!(sheared.get_pixel(10, 5)[3], 255);
    }
}
