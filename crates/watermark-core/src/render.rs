//! The watermark rendering pipeline
//!
//! [`Renderer::render`] is the only path from a base image and a resolved
//! watermark to a composited image. Preview and export both go through it;
//! a preview is the same render followed by a downscale.

use crate::composite::{composite, WatermarkLayer};
use crate::config::PreviewConfig;
use crate::error::Result;
use crate::font::{FontLibrary, FontProvider};
use crate::geometry::{place, Placed, PreviewSurface};
use crate::image_layer::render_image_watermark;
use crate::models::{Placement, WatermarkKind, WatermarkSpec};
use crate::orientation::OrientedImageCache;
use crate::resize::ResizePolicy;
use crate::text::render_text;
use image::imageops::FilterType;
use image::DynamicImage;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One render call: the base is only read, never modified
#[derive(Debug, Clone, Copy)]
pub struct RenderRequest<'a> {
    pub base: &'a DynamicImage,
    pub spec: &'a WatermarkSpec,
    pub placement: &'a Placement,
}

impl<'a> RenderRequest<'a> {
    pub fn new(base: &'a DynamicImage, spec: &'a WatermarkSpec, placement: &'a Placement) -> Self {
        Self {
            base,
            spec,
            placement,
        }
    }
}

/// Result of a render together with where the watermark went
#[derive(Debug, Clone)]
pub struct Rendered {
    pub image: DynamicImage,
    /// Rotated watermark box in base-image pixels; `None` when nothing was drawn
    pub placed: Option<Placed>,
}

/// Stateless compositor; cheap to clone and safe to share across threads
#[derive(Clone)]
pub struct Renderer {
    fonts: Arc<dyn FontProvider>,
}

impl Renderer {
    pub fn new(fonts: Arc<dyn FontProvider>) -> Self {
        Self { fonts }
    }

    /// Renderer that only knows the built-in bitmap face
    pub fn with_builtin_font() -> Self {
        Self::new(Arc::new(FontLibrary::empty()))
    }

    pub fn fonts(&self) -> &dyn FontProvider {
        self.fonts.as_ref()
    }

    /// Rasterize the watermark, including effects and rotation
    pub fn build_layer(&self, spec: &WatermarkSpec) -> WatermarkLayer {
        match spec.kind() {
            WatermarkKind::Text(text) => {
                render_text(self.fonts.as_ref(), text, spec.rotation_degrees())
            }
            WatermarkKind::Image(image) => render_image_watermark(image, spec.rotation_degrees()),
        }
    }

    /// Composite the watermark and report its placement
    #[instrument(skip_all, fields(width = request.base.width(), height = request.base.height()))]
    pub fn render_detailed(&self, request: &RenderRequest<'_>) -> Rendered {
        let layer = self.build_layer(request.spec);
        if layer.is_empty() {
            debug!("Watermark renders nothing, returning a copy of the base image");
            return Rendered {
                image: request.base.clone(),
                placed: None,
            };
        }

        let placed = place(
            request.placement,
            request.base.width(),
            request.base.height(),
            layer.box_width,
            layer.box_height,
            request.spec.rotation_degrees(),
        );
        let (x, y) = placed.layer_origin(layer.image.width(), layer.image.height());
        debug!(
            "Placing {}x{} layer at ({}, {}) for box {:?}",
            layer.image.width(),
            layer.image.height(),
            x,
            y,
            placed
        );

        Rendered {
            image: composite(request.base, &layer.image, x, y),
            placed: Some(placed),
        }
    }

    /// Composite the watermark onto a copy of the base image
    pub fn render(&self, request: &RenderRequest<'_>) -> DynamicImage {
        self.render_detailed(request).image
    }

    /// Full-resolution render scaled down to fit `max_width × max_height`.
    /// The returned surface converts preview positions back to base pixels.
    pub fn preview(
        &self,
        request: &RenderRequest<'_>,
        max_width: u32,
        max_height: u32,
    ) -> (DynamicImage, PreviewSurface) {
        let surface = PreviewSurface::fit(
            request.base.width(),
            request.base.height(),
            max_width,
            max_height,
        );
        let rendered = self.render(request);
        let preview = if (surface.preview_width, surface.preview_height)
            == (rendered.width(), rendered.height())
        {
            rendered
        } else {
            rendered.resize_exact(
                surface.preview_width,
                surface.preview_height,
                FilterType::Triangle,
            )
        };
        (preview, surface)
    }
}

/// Repeated previews of source files. Each file is decoded and oriented
/// once; every preview after that only re-renders.
#[derive(Debug)]
pub struct PreviewSession {
    renderer: Renderer,
    cache: OrientedImageCache,
    max_width: u32,
    max_height: u32,
}

impl PreviewSession {
    pub fn new(renderer: Renderer, max_width: u32, max_height: u32) -> Self {
        Self {
            renderer,
            cache: OrientedImageCache::new(),
            max_width: max_width.max(1),
            max_height: max_height.max(1),
        }
    }

    pub fn from_config(renderer: Renderer, config: &PreviewConfig) -> Self {
        Self::new(renderer, config.max_width, config.max_height)
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn cache(&self) -> &OrientedImageCache {
        &self.cache
    }

    /// Preview `path` as it would be exported. With a resize policy the
    /// surface maps preview positions onto the resized base.
    pub fn preview(
        &self,
        path: &Path,
        spec: &WatermarkSpec,
        placement: &Placement,
        resize: Option<&ResizePolicy>,
    ) -> Result<(DynamicImage, PreviewSurface)> {
        let source = self.cache.get(path)?;
        let resized;
        let base = match resize {
            Some(policy) => {
                resized = policy.apply(&source);
                &resized
            }
            None => source.as_ref(),
        };
        Ok(self.renderer.preview(
            &RenderRequest::new(base, spec, placement),
            self.max_width,
            self.max_height,
        ))
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::with_builtin_font()
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Anchor, ImageWatermark, TextWatermark};
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn base(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([40, 80, 120])))
    }

    #[test]
    fn test_base_is_not_modified() {
        let renderer = Renderer::default();
        let original = base(200, 100);
        let snapshot = original.clone();
        let spec = WatermarkSpec::text(TextWatermark::new("HI"));
        let out = renderer.render(&RenderRequest::new(&original, &spec, &Placement::default()));
        assert_eq!(original, snapshot);
        assert_ne!(out, original);
    }

    #[test]
    fn test_repeated_renders_are_identical() {
        let renderer = Renderer::default();
        let image = base(200, 100);
        let spec = WatermarkSpec::text(TextWatermark::new("HI")).with_rotation(30);
        let placement = Placement::anchored(Anchor::Center);
        let request = RenderRequest::new(&image, &spec, &placement);
        assert_eq!(renderer.render(&request), renderer.render(&request));
    }

    #[test]
    fn test_empty_text_returns_base() {
        let renderer = Renderer::default();
        let image = base(50, 50);
        let spec = WatermarkSpec::text(TextWatermark::new(""));
        let rendered =
            renderer.render_detailed(&RenderRequest::new(&image, &spec, &Placement::default()));
        assert_eq!(rendered.image, image);
        assert!(rendered.placed.is_none());
    }

    #[test]
    fn test_image_watermark_placement() {
        let renderer = Renderer::default();
        let image = base(300, 200);
        let logo = ImageWatermark::new(DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            20,
            10,
            Rgba([255, 255, 255, 255]),
        )));
        let spec = WatermarkSpec::image(ImageWatermark {
            opacity_percent: 100,
            ..logo
        });
        let rendered = renderer.render_detailed(&RenderRequest::new(
            &image,
            &spec,
            &Placement::anchored(Anchor::TopLeft),
        ));
        let placed = rendered.placed.unwrap();
        assert_eq!((placed.x, placed.y, placed.width, placed.height), (10, 10, 20, 10));
        let out = rendered.image.to_rgb8();
        assert_eq!(out.get_pixel(10, 10), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(29, 19), &Rgb([255, 255, 255]));
        assert_eq!(out.get_pixel(30, 20), &Rgb([40, 80, 120]));
        assert_eq!(out.get_pixel(9, 9), &Rgb([40, 80, 120]));
    }

    #[test]
    fn test_preview_session_decodes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.png");
        base(400, 300).save(&path).unwrap();

        let session = PreviewSession::new(Renderer::default(), 200, 200);
        let spec = WatermarkSpec::text(TextWatermark::new("A"));
        for anchor in [Anchor::TopLeft, Anchor::BottomRight] {
            let (preview, surface) = session
                .preview(&path, &spec, &Placement::anchored(anchor), None)
                .unwrap();
            assert_eq!((preview.width(), preview.height()), (200, 150));
            assert_eq!(surface.base_width, 400);
        }
        assert_eq!(session.cache().load_count(), 1);

        let resize = ResizePolicy::Percent { percent: 50.0 };
        let (_, surface) = session
            .preview(&path, &spec, &Placement::default(), Some(&resize))
            .unwrap();
        assert_eq!((surface.base_width, surface.base_height), (200, 150));
        assert_eq!(session.cache().load_count(), 1);
    }

    #[test]
    fn test_preview_matches_scaled_render() {
        let renderer = Renderer::default();
        let image = base(2000, 1500);
        let spec = WatermarkSpec::text(TextWatermark::new("PREVIEW"));
        let placement = Placement::custom(200, 200);
        let (preview, surface) =
            renderer.preview(&RenderRequest::new(&image, &spec, &placement), 500, 500);
        assert_eq!((preview.width(), preview.height()), (500, 375));
        assert_eq!(surface.to_base(50, 50), (200, 200));
    }
}
