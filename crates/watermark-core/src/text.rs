//! Text watermark layers
//!
//! The text is rasterized once into a coverage mask whose size is the tight
//! box of the laid-out glyphs. Shadow, outline and fill are stamped from that
//! mask onto a transparent canvas with enough margin for every effect and
//! for a later slant or rotation, then painted back to front:
//! outline, shadow, fill.

use crate::composite::WatermarkLayer;
use crate::effects::{
    dilate, opacity_to_alpha, outline_coverage, paint_coverage, rotate_expand, shadow_coverage,
    shear_horizontal, stamp_max, ITALIC_SHEAR,
};
use crate::font::{builtin, FaceMatch, FontProvider};
use crate::models::TextWatermark;
use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use image::{GrayImage, Luma, RgbaImage};
use tracing::debug;

enum Face {
    Outline(FaceMatch),
    Builtin,
}

impl Face {
    fn resolve(fonts: &dyn FontProvider, text: &TextWatermark) -> Self {
        match fonts.resolve(&text.font_family, text.bold, text.italic) {
            Some(face) => Face::Outline(face),
            None => {
                debug!(
                    "Font family '{}' not found, using built-in face",
                    text.font_family
                );
                Face::Builtin
            }
        }
    }

    fn needs_synthetic_bold(&self, requested: bool) -> bool {
        requested
            && match self {
                Face::Outline(face) => !face.native_bold,
                Face::Builtin => true,
            }
    }

    fn needs_synthetic_italic(&self, requested: bool) -> bool {
        requested
            && match self {
                Face::Outline(face) => !face.native_italic,
                Face::Builtin => true,
            }
    }
}

fn drawable_chars(content: &str) -> impl Iterator<Item = char> + '_ {
    content.chars().filter(|c| !c.is_control())
}

/// Coverage mask for an outline font, cropped to the glyph box. The vertical
/// extent always spans the font's ascent and descent.
fn rasterize_outline(font: &FontVec, content: &str, size_px: u32) -> GrayImage {
    let scale = PxScale::from(size_px as f32);
    let scaled = font.as_scaled(scale);
    let ascent = scaled.ascent();

    let mut cursor = 0.0f32;
    let mut previous = None;
    let mut outlines = Vec::new();
    for c in drawable_chars(content) {
        let glyph_id = scaled.glyph_id(c);
        if let Some(previous) = previous {
            cursor += scaled.kern(previous, glyph_id);
        }
        let glyph = glyph_id.with_scale_and_position(scale, point(cursor, ascent));
        if let Some(outlined) = font.outline_glyph(glyph) {
            outlines.push(outlined);
        }
        cursor += scaled.h_advance(glyph_id);
        previous = Some(glyph_id);
    }

    let (mut min_x, mut max_x) = if outlines.is_empty() {
        (0.0f32, cursor)
    } else {
        (f32::MAX, f32::MIN)
    };
    let (mut min_y, mut max_y) = (0.0f32, ascent - scaled.descent());
    for outlined in &outlines {
        let bounds = outlined.px_bounds();
        min_x = min_x.min(bounds.min.x);
        max_x = max_x.max(bounds.max.x);
        min_y = min_y.min(bounds.min.y);
        max_y = max_y.max(bounds.max.y);
    }

    let origin_x = min_x.floor() as i32;
    let origin_y = min_y.floor() as i32;
    let width = (max_x.ceil() as i32 - origin_x).max(0) as u32;
    let height = (max_y.ceil() as i32 - origin_y).max(0) as u32;

    let mut mask = GrayImage::new(width, height);
    for outlined in &outlines {
        let bounds = outlined.px_bounds();
        outlined.draw(|px, py, coverage| {
            let x = bounds.min.x as i32 + px as i32 - origin_x;
            let y = bounds.min.y as i32 + py as i32 - origin_y;
            if x < 0 || y < 0 || x >= width as i32 || y >= height as i32 {
                return;
            }
            let value = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
            let pixel = mask.get_pixel_mut(x as u32, y as u32);
            pixel[0] = pixel[0].max(value);
        });
    }
    mask
}

/// Coverage mask for the built-in bitmap face. Every inked font unit becomes
/// a solid `scale × scale` block.
fn rasterize_builtin(content: &str, size_px: u32) -> GrayImage {
    let scale = builtin::unit_scale(size_px);
    let chars: Vec<char> = drawable_chars(content).collect();
    let (width, height) = builtin::text_size(chars.len(), scale);

    let mut mask = GrayImage::new(width, height);
    for (index, c) in chars.iter().enumerate() {
        let cell_x = index as u32 * builtin::CELL_WIDTH * scale;
        for col in 0..builtin::GLYPH_WIDTH {
            for row in 0..builtin::GLYPH_HEIGHT {
                if !builtin::is_set(*c, col, row) {
                    continue;
                }
                for dy in 0..scale {
                    for dx in 0..scale {
                        mask.put_pixel(cell_x + col * scale + dx, row * scale + dy, Luma([255]));
                    }
                }
            }
        }
    }
    mask
}

fn glyph_mask(face: &Face, text: &TextWatermark) -> GrayImage {
    if text.content.is_empty() {
        return GrayImage::new(0, 0);
    }
    let mask = match face {
        Face::Outline(face) => rasterize_outline(&face.font, &text.content, text.font_size_px),
        Face::Builtin => rasterize_builtin(&text.content, text.font_size_px),
    };
    if face.needs_synthetic_bold(text.bold) && !mask.is_empty() {
        dilate(&mask)
    } else {
        mask
    }
}

/// Nominal box of the rendered text, before effects and rotation
pub fn measure_text(fonts: &dyn FontProvider, text: &TextWatermark) -> (u32, u32) {
    let text = text.clamped();
    let face = Face::resolve(fonts, &text);
    glyph_mask(&face, &text).dimensions()
}

/// Margin added on every side of the glyph box
pub fn canvas_margin(box_width: u32, box_height: u32, text: &TextWatermark) -> u32 {
    let half_extent = (box_width.max(box_height) + 1) / 2;
    let outline = text.outline.map(|outline| outline.width_px).unwrap_or(0);
    let (offset, blur) = text
        .shadow
        .map(|shadow| (shadow.offset_px.unsigned_abs(), shadow.blur_radius_px))
        .unwrap_or((0, 0));
    half_extent + outline + offset + 2 * blur
}

/// Render a text watermark into a transparent layer, rotated
/// counter-clockwise by `rotation_degrees`.
///
/// Never fails: unknown fonts use the built-in face, empty text yields an
/// empty layer and zero opacity yields a fully transparent one.
pub fn render_text(
    fonts: &dyn FontProvider,
    text: &TextWatermark,
    rotation_degrees: i32,
) -> WatermarkLayer {
    let text = text.clamped();
    let face = Face::resolve(fonts, &text);
    let mask = glyph_mask(&face, &text);
    let (box_width, box_height) = mask.dimensions();
    if box_width == 0 || box_height == 0 {
        return WatermarkLayer::empty();
    }

    let margin = canvas_margin(box_width, box_height, &text);
    let canvas_width = box_width + 2 * margin;
    let canvas_height = box_height + 2 * margin;
    let origin = (margin as i32, margin as i32);
    let alpha = opacity_to_alpha(text.opacity_percent);

    let mut layer = RgbaImage::new(canvas_width, canvas_height);
    if alpha > 0 {
        if let Some(outline) = text.outline {
            let coverage =
                outline_coverage(&mask, canvas_width, canvas_height, origin, outline.width_px);
            paint_coverage(&mut layer, &coverage, outline.color, alpha);
        }
        if let Some(shadow) = text.shadow {
            let coverage = shadow_coverage(
                &mask,
                canvas_width,
                canvas_height,
                origin,
                shadow.offset_px,
                shadow.blur_radius_px,
            );
            paint_coverage(&mut layer, &coverage, shadow.color, alpha);
        }
        let mut fill = GrayImage::new(canvas_width, canvas_height);
        stamp_max(&mut fill, &mask, origin.0, origin.1);
        paint_coverage(&mut layer, &fill, text.fill_color, alpha);
    }

    if face.needs_synthetic_italic(text.italic) {
        layer = shear_horizontal(&layer, ITALIC_SHEAR);
    }

    WatermarkLayer {
        image: rotate_expand(&layer, rotation_degrees),
        box_width,
        box_height,
    }
}
