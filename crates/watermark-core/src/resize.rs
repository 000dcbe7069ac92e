//! Base image resizing applied before watermarking

use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How the base image is resized before the watermark is composited
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ResizePolicy {
    /// Scale both sides by a percentage
    Percent { percent: f64 },
    /// Fit into a box, either aspect-locked or taken literally
    Box {
        width: u32,
        height: u32,
        #[serde(default = "default_keep_aspect")]
        keep_aspect: bool,
    },
    /// Fixed width, height follows the aspect ratio
    Width { width: u32 },
    /// Fixed height, width follows the aspect ratio
    Height { height: u32 },
}

fn default_keep_aspect() -> bool {
    true
}

impl ResizePolicy {
    /// Output dimensions for an `width × height` source, each at least 1
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let w = width.max(1) as f64;
        let h = height.max(1) as f64;
        let ratio = w / h;

        let (new_w, new_h) = match *self {
            ResizePolicy::Percent { percent } => {
                let factor = percent.max(0.0) / 100.0;
                ((w * factor).round(), (h * factor).round())
            }
            ResizePolicy::Box {
                width: 0,
                height: 0,
                ..
            } => (w, h),
            ResizePolicy::Box {
                width: target_w,
                height: 0,
                ..
            } => return ResizePolicy::Width { width: target_w }.target_dimensions(width, height),
            ResizePolicy::Box {
                width: 0,
                height: target_h,
                ..
            } => {
                return ResizePolicy::Height { height: target_h }.target_dimensions(width, height)
            }
            ResizePolicy::Box {
                width: target_w,
                height: target_h,
                keep_aspect: true,
            } => {
                let target_w = target_w as f64;
                let target_h = target_h as f64;
                if target_w / target_h > ratio {
                    ((target_h * ratio).round(), target_h)
                } else {
                    (target_w, (target_w / ratio).round())
                }
            }
            ResizePolicy::Box {
                width: target_w,
                height: target_h,
                keep_aspect: false,
            } => (target_w as f64, target_h as f64),
            ResizePolicy::Width { width: target_w } => {
                let target_w = target_w as f64;
                (target_w, (target_w / ratio).round())
            }
            ResizePolicy::Height { height: target_h } => {
                let target_h = target_h as f64;
                ((target_h * ratio).round(), target_h)
            }
        };

        ((new_w as u32).max(1), (new_h as u32).max(1))
    }

    /// Resize with Lanczos3. The source is returned untouched when the size
    /// does not change.
    pub fn apply(&self, image: &DynamicImage) -> DynamicImage {
        let (new_w, new_h) = self.target_dimensions(image.width(), image.height());
        if (new_w, new_h) == (image.width(), image.height()) {
            return image.clone();
        }
        debug!(
            "Resizing base image from {}x{} to {}x{}",
            image.width(),
            image.height(),
            new_w,
            new_h
        );
        image.resize_exact(new_w, new_h, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_percent() {
        let policy = ResizePolicy::Percent { percent: 50.0 };
        assert_eq!(policy.target_dimensions(801, 600), (401, 300));
        let policy = ResizePolicy::Percent { percent: 0.0 };
        assert_eq!(policy.target_dimensions(801, 600), (1, 1));
    }

    #[test]
    fn test_box_keep_aspect_fits_height() {
        // 4:3 source into a wide box is limited by height
        let policy = ResizePolicy::Box {
            width: 1000,
            height: 300,
            keep_aspect: true,
        };
        assert_eq!(policy.target_dimensions(800, 600), (400, 300));
    }

    #[test]
    fn test_box_keep_aspect_fits_width() {
        let policy = ResizePolicy::Box {
            width: 400,
            height: 1000,
            keep_aspect: true,
        };
        assert_eq!(policy.target_dimensions(800, 600), (400, 300));
    }

    #[test]
    fn test_box_literal_distorts() {
        let policy = ResizePolicy::Box {
            width: 100,
            height: 100,
            keep_aspect: false,
        };
        assert_eq!(policy.target_dimensions(800, 600), (100, 100));
    }

    #[test]
    fn test_single_side() {
        assert_eq!(
            ResizePolicy::Width { width: 400 }.target_dimensions(800, 600),
            (400, 300)
        );
        assert_eq!(
            ResizePolicy::Height { height: 150 }.target_dimensions(800, 600),
            (200, 150)
        );
        let policy = ResizePolicy::Box {
            width: 0,
            height: 150,
            keep_aspect: false,
        };
        assert_eq!(policy.target_dimensions(800, 600), (200, 150));
    }

    #[test]
    fn test_apply_resizes_pixels() {
        let image = DynamicImage::new_rgb8(64, 32);
        let resized = ResizePolicy::Percent { percent: 25.0 }.apply(&image);
        assert_eq!((resized.width(), resized.height()), (16, 8));
    }

    #[test]
    fn test_policy_serialization() {
        let policy = ResizePolicy::Box {
            width: 1920,
            height: 1080,
            keep_aspect: true,
        };
        let json = serde_json::to_string(&policy).unwrap();
        assert!(json.contains("\"mode\":\"box\""));
        let back: ResizePolicy =
            serde_json::from_str(r#"{"mode":"box","width":1920,"height":1080}"#).unwrap();
        assert_eq!(back, policy);
    }

    proptest! {
        #[test]
        fn prop_percent_then_reciprocal_restores_size(
            w in 10u32..3000,
            h in 10u32..3000,
            percent in prop::sample::select(vec![25.0f64, 50.0, 200.0, 400.0]),
        ) {
            let (sw, sh) = ResizePolicy::Percent { percent }.target_dimensions(w, h);
            let back = 100.0 * 100.0 / percent;
            let (rw, rh) = ResizePolicy::Percent { percent: back }.target_dimensions(sw, sh);
            // Shrinking by 4 loses up to 0.5 px which grows back to 2 px
            let tolerance = (100.0 / percent).ceil().max(1.0) as i64;
            prop_assert!((rw as i64 - w as i64).abs() <= tolerance);
            prop_assert!((rh as i64 - h as i64).abs() <= tolerance);
        }
    }
}
