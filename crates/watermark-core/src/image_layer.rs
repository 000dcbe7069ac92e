//! Image watermark layers

use crate::composite::WatermarkLayer;
use crate::effects::{rotate_expand, scale_alpha};
use crate::models::{ImageWatermark, MAX_SCALE_PERCENT};
use image::imageops::FilterType;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Scaled size of a `width × height` bitmap, at least 1×1.
/// The scale is clamped to `[1, MAX_SCALE_PERCENT]`.
pub fn scaled_size(width: u32, height: u32, scale_percent: u32) -> (u32, u32) {
    let factor = scale_percent.clamp(1, MAX_SCALE_PERCENT) as f64 / 100.0;
    (
        ((width as f64 * factor).round() as u32).max(1),
        ((height as f64 * factor).round() as u32).max(1),
    )
}

/// Render an image watermark into a layer, rotated counter-clockwise by
/// `rotation_degrees`.
///
/// A missing bitmap yields an empty layer. Opacity multiplies the existing
/// alpha so transparent regions of the source stay transparent.
pub fn render_image_watermark(watermark: &ImageWatermark, rotation_degrees: i32) -> WatermarkLayer {
    let watermark = watermark.clamped();
    let Some(bitmap) = watermark.bitmap.as_deref() else {
        return WatermarkLayer::empty();
    };
    if bitmap.width() == 0 || bitmap.height() == 0 {
        return WatermarkLayer::empty();
    }

    let (box_width, box_height) =
        scaled_size(bitmap.width(), bitmap.height(), watermark.scale_percent);
    let mut scaled = if (box_width, box_height) == (bitmap.width(), bitmap.height()) {
        bitmap.to_rgba8()
    } else {
        debug!(
            "Scaling watermark from {}x{} to {}x{}",
            bitmap.width(),
            bitmap.height(),
            box_width,
            box_height
        );
        bitmap
            .resize_exact(box_width, box_height, FilterType::Lanczos3)
            .to_rgba8()
    };
    scale_alpha(&mut scaled, watermark.opacity_percent);

    WatermarkLayer {
        image: rotate_expand(&scaled, rotation_degrees),
        box_width,
        box_height,
    }
}

/// Load a watermark bitmap from disk. An unreadable file gives a watermark
/// that renders nothing.
pub fn load_image_watermark(path: &Path, scale_percent: u32, opacity_percent: u8) -> ImageWatermark {
    let bitmap = match image::open(path) {
        Ok(bitmap) => Some(Arc::new(bitmap)),
        Err(e) => {
            warn!("Watermark image {} unavailable: {}", path.display(), e);
            None
        }
    };
    ImageWatermark {
        bitmap,
        scale_percent,
        opacity_percent,
    }
}
