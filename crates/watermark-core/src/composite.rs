//! Alpha compositing of watermark layers onto base images

use crate::models::OutputFormat;
use image::{ColorType, DynamicImage, Rgba, RgbaImage};

/// A rendered watermark ready to be pasted.
///
/// `image` may be larger than the nominal box (effects margin, rotation); the
/// box is always centered in it, so the box center is the layer center.
#[derive(Clone)]
pub struct WatermarkLayer {
    pub image: RgbaImage,
    /// Unrotated size of the watermark content
    pub box_width: u32,
    pub box_height: u32,
}

impl WatermarkLayer {
    /// Layer that renders nothing
    pub fn empty() -> Self {
        Self {
            image: RgbaImage::new(0, 0),
            box_width: 0,
            box_height: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.box_width == 0 || self.box_height == 0 || self.image.is_empty()
    }
}

impl std::fmt::Debug for WatermarkLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkLayer")
            .field("dimensions", &self.image.dimensions())
            .field("box", &(self.box_width, self.box_height))
            .finish()
    }
}

/// Porter-Duff "over" for straight-alpha pixels.
///
/// A fully transparent source returns the destination unchanged; over an
/// opaque destination this reduces to `src·a + dst·(1 - a)`.
pub fn blend_over(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let src_alpha = src[3] as f32 / 255.0;
    let dst_alpha = dst[3] as f32 / 255.0;
    let out_alpha = src_alpha + dst_alpha * (1.0 - src_alpha);

    let blend_channel = |s: u8, d: u8| -> u8 {
        let value = (s as f32 * src_alpha + d as f32 * dst_alpha * (1.0 - src_alpha)) / out_alpha;
        value.round().clamp(0.0, 255.0) as u8
    };

    Rgba([
        blend_channel(src[0], dst[0]),
        blend_channel(src[1], dst[1]),
        blend_channel(src[2], dst[2]),
        (out_alpha * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

/// Blend `layer` onto `target` in place with its top-left at `(x, y)`.
/// Layer pixels outside the target are dropped.
pub fn composite_onto(target: &mut RgbaImage, layer: &RgbaImage, x: i32, y: i32) {
    let target_width = target.width() as i64;
    let target_height = target.height() as i64;
    let (x, y) = (x as i64, y as i64);

    let x_start = x.max(0);
    let y_start = y.max(0);
    let x_end = (x + layer.width() as i64).min(target_width);
    let y_end = (y + layer.height() as i64).min(target_height);

    for ty in y_start..y_end {
        for tx in x_start..x_end {
            let layer_pixel = *layer.get_pixel((tx - x) as u32, (ty - y) as u32);
            if layer_pixel[3] == 0 {
                continue;
            }
            let target_pixel = target.get_pixel_mut(tx as u32, ty as u32);
            *target_pixel = blend_over(*target_pixel, layer_pixel);
        }
    }
}

/// Composite `layer` onto a copy of `base` and return it in the base's
/// original color type. `base` itself is never modified.
pub fn composite(base: &DynamicImage, layer: &RgbaImage, x: i32, y: i32) -> DynamicImage {
    let mut working = base.to_rgba8();
    composite_onto(&mut working, layer, x, y);
    restore_color_type(working, base.color())
}

/// Convert an RGBA working buffer back to `color`
pub fn restore_color_type(working: RgbaImage, color: ColorType) -> DynamicImage {
    let working = DynamicImage::ImageRgba8(working);
    match color {
        ColorType::L8 => DynamicImage::ImageLuma8(working.to_luma8()),
        ColorType::La8 => DynamicImage::ImageLumaA8(working.to_luma_alpha8()),
        ColorType::Rgb8 => DynamicImage::ImageRgb8(working.to_rgb8()),
        ColorType::L16 => DynamicImage::ImageLuma16(working.to_luma16()),
        ColorType::La16 => DynamicImage::ImageLumaA16(working.to_luma_alpha16()),
        ColorType::Rgb16 => DynamicImage::ImageRgb16(working.to_rgb16()),
        ColorType::Rgba16 => DynamicImage::ImageRgba16(working.to_rgba16()),
        ColorType::Rgb32F => DynamicImage::ImageRgb32F(working.to_rgb32f()),
        ColorType::Rgba32F => DynamicImage::ImageRgba32F(working.to_rgba32f()),
        _ => working,
    }
}

/// Coerce a rendered image into a color mode the output format can store:
/// JPEG drops alpha, PNG keeps it but has no float channels.
pub fn encode_for_format(image: DynamicImage, format: OutputFormat) -> DynamicImage {
    match format {
        OutputFormat::Jpeg => match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        OutputFormat::Png => match image {
            DynamicImage::ImageRgb32F(_) => DynamicImage::ImageRgb8(image.to_rgb8()),
            DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgba8(image.to_rgba8()),
            other => other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage};

    fn gray_base(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([value, value, value])))
    }

    #[test]
    fn test_blend_over_opaque_base() {
        let out = blend_over(Rgba([100, 100, 100, 255]), Rgba([255, 255, 255, 204]));
        // 255·0.8 + 100·0.2 = 224
        assert_eq!(out, Rgba([224, 224, 224, 255]));
    }

    #[test]
    fn test_blend_over_transparent_destination() {
        let out = blend_over(Rgba([0, 0, 0, 0]), Rgba([10, 20, 30, 128]));
        assert_eq!(out, Rgba([10, 20, 30, 128]));
    }

    #[test]
    fn test_transparent_layer_is_identity() {
        let base = gray_base(40, 30, 77);
        let layer = RgbaImage::from_pixel(20, 20, Rgba([255, 0, 0, 0]));
        let out = composite(&base, &layer, 5, 5);
        assert_eq!(out, base);
    }

    #[test]
    fn test_opaque_layer_is_idempotent() {
        let base = gray_base(40, 30, 77);
        let layer = RgbaImage::from_pixel(10, 10, Rgba([200, 10, 10, 255]));
        let once = composite(&base, &layer, 3, 4);
        let twice = composite(&once, &layer, 3, 4);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_semi_transparent_layer_builds_up() {
        let base = gray_base(40, 30, 0);
        let layer = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 128]));
        let once = composite(&base, &layer, 0, 0).to_rgb8();
        let twice = composite(&DynamicImage::ImageRgb8(once.clone()), &layer, 0, 0).to_rgb8();
        assert!(twice.get_pixel(5, 5)[0] > once.get_pixel(5, 5)[0]);
    }

    #[test]
    fn test_out_of_bounds_pixels_are_discarded() {
        let base = gray_base(20, 20, 0);
        let layer = RgbaImage::from_pixel(10, 10, Rgba([255, 255, 255, 255]));
        let out = composite(&base, &layer, 15, -5).to_rgb8();
        assert_eq!(out.get_pixel(19, 0), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(19, 5), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(14, 0), &Rgb([0, 0, 0]));

        // Entirely outside
        let out = composite(&base, &layer, 100, 100);
        assert_eq!(out, base);
    }

    #[test]
    fn test_color_type_is_preserved() {
        let base = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([50])));
        let layer = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));
        let out = composite(&base, &layer, 0, 0);
        assert_eq!(out.color(), ColorType::L8);
        assert_eq!(out.to_luma8().get_pixel(0, 0), &Luma([255]));
        assert_eq!(out.to_luma8().get_pixel(4, 4), &Luma([50]));
    }

    #[test]
    fn test_encode_for_format() {
        let rgba = DynamicImage::ImageRgba8(RgbaImage::new(4, 4));
        assert_eq!(
            encode_for_format(rgba.clone(), OutputFormat::Jpeg).color(),
            ColorType::Rgb8
        );
        assert_eq!(encode_for_format(rgba, OutputFormat::Png).color(), ColorType::Rgba8);
    }
}
