//! Watermark placement geometry
//!
//! Maps a [`Placement`] plus the watermark box and base image sizes to an
//! absolute top-left coordinate.
//!
//! # Anchor grid
//!
//! The nine named anchors form a 3×3 grid: the outer ring sits
//! [`ANCHOR_MARGIN`] pixels from the relevant edges, and any "through" axis is
//! centered with floor division, so `TopCenter` on an 800 px wide image with a
//! 100 px box lands at `x = 350, y = 10`.
//!
//! # Rotation
//!
//! Anchors are resolved against the axis-aligned bounding box of the
//! *rotated* watermark. The pivot is the center of that box, so the visual
//! center of a watermark stays put no matter the angle.
//!
//! # Clamping
//!
//! Anchored placements (including any positional bias) are clamped so the
//! rotated box starts inside the image, for text and image watermarks alike.
//! Custom placements are never clamped: a dragged watermark lands exactly
//! where it was dropped, even partially off-canvas.

use crate::models::{Anchor, Placement};
use serde::{Deserialize, Serialize};

/// Distance between the outer anchors and the image edges
pub const ANCHOR_MARGIN: i32 = 10;

/// Top-left coordinate for one of the nine named anchors.
///
/// The result may be negative when the box is larger than the image.
pub fn resolve_anchor(
    anchor: Anchor,
    image_width: u32,
    image_height: u32,
    box_width: u32,
    box_height: u32,
) -> (i32, i32) {
    let img_w = image_width as i32;
    let img_h = image_height as i32;
    let box_w = box_width as i32;
    let box_h = box_height as i32;
    let m = ANCHOR_MARGIN;

    let left = m;
    let h_center = (img_w - box_w).div_euclid(2);
    let right = img_w - box_w - m;
    let top = m;
    let v_center = (img_h - box_h).div_euclid(2);
    let bottom = img_h - box_h - m;

    match anchor {
        Anchor::TopLeft => (left, top),
        Anchor::TopCenter => (h_center, top),
        Anchor::TopRight => (right, top),
        Anchor::CenterLeft => (left, v_center),
        Anchor::Center => (h_center, v_center),
        Anchor::CenterRight => (right, v_center),
        Anchor::BottomLeft => (left, bottom),
        Anchor::BottomCenter => (h_center, bottom),
        Anchor::BottomRight => (right, bottom),
    }
}

/// Custom offsets already are base-image coordinates
pub fn resolve_custom(x: i32, y: i32) -> (i32, i32) {
    (x, y)
}

/// Add a per-image bias on top of a resolved anchor
pub fn apply_positional_bias(x: i32, y: i32, bias_x: i32, bias_y: i32) -> (i32, i32) {
    (x.saturating_add(bias_x), y.saturating_add(bias_y))
}

/// Keep the box's top-left within `[0, image - box]` on both axes.
///
/// When the box is larger than the image the coordinate collapses to 0.
pub fn clamp_to_bounds(
    x: i32,
    y: i32,
    image_width: u32,
    image_height: u32,
    box_width: u32,
    box_height: u32,
) -> (i32, i32) {
    let max_x = (image_width as i32 - box_width as i32).max(0);
    let max_y = (image_height as i32 - box_height as i32).max(0);
    (x.clamp(0, max_x), y.clamp(0, max_y))
}

/// Axis-aligned bounding box of a `width × height` rectangle rotated by
/// `degrees`, rounded to whole pixels
pub fn rotated_bounding_box(width: u32, height: u32, degrees: f64) -> (u32, u32) {
    let theta = degrees.to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let w = width as f64;
    let h = height as f64;
    let rot_w = w * cos + h * sin;
    let rot_h = w * sin + h * cos;
    (rot_w.round() as u32, rot_h.round() as u32)
}

/// A resolved placement: the rotated watermark box in base-image pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placed {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Placed {
    /// Rotation pivot: center of the rotated box
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Top-left at which a layer of the given size must be pasted so that its
    /// center lands on the pivot
    pub fn layer_origin(&self, layer_width: u32, layer_height: u32) -> (i32, i32) {
        let (cx, cy) = self.center();
        (
            (cx - layer_width as f64 / 2.0).round() as i32,
            (cy - layer_height as f64 / 2.0).round() as i32,
        )
    }
}

/// Resolve a placement for an unrotated `box_width × box_height` watermark
/// turned by `rotation_degrees`
pub fn place(
    placement: &Placement,
    image_width: u32,
    image_height: u32,
    box_width: u32,
    box_height: u32,
    rotation_degrees: i32,
) -> Placed {
    let (width, height) = if rotation_degrees.rem_euclid(360) == 0 {
        (box_width, box_height)
    } else {
        rotated_bounding_box(box_width, box_height, rotation_degrees as f64)
    };

    let (x, y) = match *placement {
        Placement::Anchored {
            anchor,
            bias_x,
            bias_y,
        } => {
            let (x, y) = resolve_anchor(anchor, image_width, image_height, width, height);
            let (x, y) = apply_positional_bias(x, y, bias_x, bias_y);
            clamp_to_bounds(x, y, image_width, image_height, width, height)
        }
        Placement::Custom { x, y } => resolve_custom(x, y),
    };

    Placed {
        x,
        y,
        width,
        height,
    }
}

/// A downscaled view of a base image, e.g. an on-screen preview.
///
/// Custom positions are stored in base-image pixels. A position picked on the
/// preview is converted exactly once with [`PreviewSurface::to_base`] and the
/// stored value is what both preview and export render with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewSurface {
    pub base_width: u32,
    pub base_height: u32,
    pub preview_width: u32,
    pub preview_height: u32,
}

impl PreviewSurface {
    /// Largest aspect-preserving surface fitting `max_width × max_height`.
    /// Never upscales.
    pub fn fit(base_width: u32, base_height: u32, max_width: u32, max_height: u32) -> Self {
        let base_w = base_width.max(1) as f64;
        let base_h = base_height.max(1) as f64;
        let scale = (max_width as f64 / base_w)
            .min(max_height as f64 / base_h)
            .min(1.0);
        Self {
            base_width,
            base_height,
            preview_width: ((base_w * scale).round() as u32).max(1),
            preview_height: ((base_h * scale).round() as u32).max(1),
        }
    }

    /// Convert a preview-space point to base-image pixels
    pub fn to_base(&self, preview_x: i32, preview_y: i32) -> (i32, i32) {
        let sx = self.base_width as f64 / self.preview_width.max(1) as f64;
        let sy = self.base_height as f64 / self.preview_height.max(1) as f64;
        (
            (preview_x as f64 * sx).round() as i32,
            (preview_y as f64 * sy).round() as i32,
        )
    }

    /// Convert a base-image point to preview pixels
    pub fn to_preview(&self, x: i32, y: i32) -> (i32, i32) {
        let sx = self.preview_width as f64 / self.base_width.max(1) as f64;
        let sy = self.preview_height as f64 / self.base_height.max(1) as f64;
        ((x as f64 * sx).round() as i32, (y as f64 * sy).round() as i32)
    }

    /// Custom placement for a point picked on the preview
    pub fn custom_placement(&self, preview_x: i32, preview_y: i32) -> Placement {
        let (x, y) = self.to_base(preview_x, preview_y);
        Placement::custom(x, y)
    }
}
