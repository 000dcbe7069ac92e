//! Saved watermark templates
//!
//! A template is a flat JSON document holding every setting needed to
//! reproduce a watermark and its export options. Missing keys fall back to
//! the application defaults, so older or hand-written templates still load.

use crate::config::TemplateConfig;
use crate::error::{Result, WatermarkError};
use crate::image_layer::load_image_watermark;
use crate::models::{
    Anchor, Color, ExportSettings, ImageWatermark, OutlineStyle, OutputFormat, Placement,
    ShadowStyle, TextWatermark, WatermarkKind, WatermarkSpec,
};
use crate::resize::ResizePolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const TEMPLATE_EXTENSION: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateKind {
    #[default]
    Text,
    Image,
}

/// Serialized watermark settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkTemplate {
    #[serde(rename = "type")]
    pub kind: TemplateKind,
    pub text: String,
    pub font_family: String,
    pub font_size: u32,
    pub bold: bool,
    pub italic: bool,
    pub color: Color,
    pub opacity: u8,
    pub position: Anchor,
    /// Overrides `position` when set
    pub custom_position: Option<(i32, i32)>,
    pub position_bias: (i32, i32),
    pub shadow: bool,
    pub shadow_color: Color,
    pub shadow_offset: i32,
    pub shadow_blur: u32,
    pub outline: bool,
    pub outline_color: Color,
    pub outline_width: u32,
    pub image_path: Option<PathBuf>,
    pub image_scale: u32,
    pub image_opacity: u8,
    pub rotation: i32,
    pub output_format: OutputFormat,
    pub quality: u8,
    pub optimize: bool,
    pub resize_enabled: bool,
    pub resize_width: u32,
    pub resize_height: u32,
    pub resize_percent: u32,
    pub resize_keep_aspect: bool,
    pub naming_prefix: String,
    pub naming_suffix: String,
}

impl Default for WatermarkTemplate {
    fn default() -> Self {
        Self {
            kind: TemplateKind::Text,
            text: "Watermark".to_string(),
            font_family: "Arial".to_string(),
            font_size: 40,
            bold: false,
            italic: false,
            color: Color::white(),
            opacity: 80,
            position: Anchor::BottomRight,
            custom_position: None,
            position_bias: (0, 0),
            shadow: false,
            shadow_color: Color::black(),
            shadow_offset: 2,
            shadow_blur: 0,
            outline: false,
            outline_color: Color::black(),
            outline_width: 1,
            image_path: None,
            image_scale: 100,
            image_opacity: 80,
            rotation: 0,
            output_format: OutputFormat::Jpeg,
            quality: 90,
            optimize: false,
            resize_enabled: false,
            resize_width: 0,
            resize_height: 0,
            resize_percent: 100,
            resize_keep_aspect: false,
            naming_prefix: String::new(),
            naming_suffix: "_watermarked".to_string(),
        }
    }
}

/// Watermark, placement and export settings rebuilt from a template
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub spec: WatermarkSpec,
    pub placement: Placement,
    pub export: ExportSettings,
}

impl WatermarkTemplate {
    /// Capture the current settings. `image_path` is recorded for image
    /// watermarks since the decoded bitmap itself is not stored.
    pub fn capture(
        spec: &WatermarkSpec,
        placement: &Placement,
        export: &ExportSettings,
        image_path: Option<&Path>,
    ) -> Self {
        let mut template = Self {
            rotation: spec.rotation_degrees(),
            output_format: export.format,
            quality: export.jpeg_quality,
            optimize: export.optimize,
            naming_prefix: export.prefix.clone(),
            naming_suffix: export.suffix.clone(),
            image_path: image_path.map(Path::to_path_buf),
            ..Self::default()
        };

        match spec.kind() {
            WatermarkKind::Text(text) => {
                template.kind = TemplateKind::Text;
                template.text = text.content.clone();
                template.font_family = text.font_family.clone();
                template.font_size = text.font_size_px;
                template.bold = text.bold;
                template.italic = text.italic;
                template.color = text.fill_color;
                template.opacity = text.opacity_percent;
                if let Some(shadow) = text.shadow {
                    template.shadow = true;
                    template.shadow_color = shadow.color;
                    template.shadow_offset = shadow.offset_px;
                    template.shadow_blur = shadow.blur_radius_px;
                }
                if let Some(outline) = text.outline {
                    template.outline = true;
                    template.outline_color = outline.color;
                    template.outline_width = outline.width_px;
                }
            }
            WatermarkKind::Image(image) => {
                template.kind = TemplateKind::Image;
                template.image_scale = image.scale_percent;
                template.image_opacity = image.opacity_percent;
            }
        }

        match *placement {
            Placement::Anchored {
                anchor,
                bias_x,
                bias_y,
            } => {
                template.position = anchor;
                template.position_bias = (bias_x, bias_y);
            }
            Placement::Custom { x, y } => template.custom_position = Some((x, y)),
        }

        if let Some(policy) = export.resize {
            template.resize_enabled = true;
            match policy {
                ResizePolicy::Percent { percent } => {
                    template.resize_percent = percent.round().max(1.0) as u32
                }
                ResizePolicy::Box {
                    width,
                    height,
                    keep_aspect,
                } => {
                    template.resize_width = width;
                    template.resize_height = height;
                    template.resize_keep_aspect = keep_aspect;
                }
                ResizePolicy::Width { width } => template.resize_width = width,
                ResizePolicy::Height { height } => template.resize_height = height,
            }
        }

        template
    }

    pub fn text_watermark(&self) -> TextWatermark {
        TextWatermark {
            content: self.text.clone(),
            font_family: self.font_family.clone(),
            font_size_px: self.font_size,
            bold: self.bold,
            italic: self.italic,
            fill_color: self.color,
            opacity_percent: self.opacity,
            shadow: self.shadow.then_some(ShadowStyle {
                color: self.shadow_color,
                offset_px: self.shadow_offset,
                blur_radius_px: self.shadow_blur,
            }),
            outline: self.outline.then_some(OutlineStyle {
                color: self.outline_color,
                width_px: self.outline_width,
            }),
        }
    }

    /// Decode the watermark bitmap; a missing or unreadable file renders
    /// nothing
    pub fn image_watermark(&self) -> ImageWatermark {
        match &self.image_path {
            Some(path) => load_image_watermark(path, self.image_scale, self.image_opacity),
            None => ImageWatermark {
                scale_percent: self.image_scale,
                opacity_percent: self.image_opacity,
                ..ImageWatermark::missing()
            },
        }
    }

    pub fn placement(&self) -> Placement {
        match self.custom_position {
            Some((x, y)) => Placement::custom(x, y),
            None => Placement::Anchored {
                anchor: self.position,
                bias_x: self.position_bias.0,
                bias_y: self.position_bias.1,
            },
        }
    }

    /// Width and height together resize exactly (or fit, with
    /// `resize_keep_aspect`); a single side keeps the aspect ratio;
    /// otherwise the percentage applies
    pub fn resize_policy(&self) -> Option<ResizePolicy> {
        if !self.resize_enabled {
            return None;
        }
        let policy = match (self.resize_width, self.resize_height) {
            (0, 0) => ResizePolicy::Percent {
                percent: self.resize_percent as f64,
            },
            (width, 0) => ResizePolicy::Width { width },
            (0, height) => ResizePolicy::Height { height },
            (width, height) => ResizePolicy::Box {
                width,
                height,
                keep_aspect: self.resize_keep_aspect,
            },
        };
        Some(policy)
    }

    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            format: self.output_format,
            jpeg_quality: self.quality,
            optimize: self.optimize,
            prefix: self.naming_prefix.clone(),
            suffix: self.naming_suffix.clone(),
            resize: self.resize_policy(),
        }
    }

    pub fn resolve(&self) -> ResolvedTemplate {
        let spec = match self.kind {
            TemplateKind::Text => WatermarkSpec::text(self.text_watermark()),
            TemplateKind::Image => WatermarkSpec::image(self.image_watermark()),
        }
        .with_rotation(self.rotation);

        ResolvedTemplate {
            spec,
            placement: self.placement(),
            export: self.export_settings(),
        }
    }
}

/// Directory of `<name>.json` templates
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn from_config(config: &TemplateConfig) -> Self {
        Self::new(config.directory.clone())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self
            .dir
            .join(format!("{}.{}", name, TEMPLATE_EXTENSION)))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Write a template, replacing any existing one with the same name
    pub fn save(&self, name: &str, template: &WatermarkTemplate) -> Result<PathBuf> {
        let path = self.path_for(name)?;
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(template)?;
        std::fs::write(&path, json)?;
        info!("Saved template '{}' to {}", name, path.display());
        Ok(path)
    }

    pub fn load(&self, name: &str) -> Result<WatermarkTemplate> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(WatermarkError::TemplateNotFound {
                name: name.to_string(),
            });
        }
        let content = std::fs::read_to_string(&path)?;
        let template = serde_json::from_str(&content).map_err(|e| {
            WatermarkError::TemplateError {
                message: format!("failed to parse template '{}': {}", name, e),
            }
        })?;
        debug!("Loaded template '{}' from {}", name, path.display());
        Ok(template)
    }

    /// Template names, sorted. A missing directory has no templates.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TEMPLATE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn delete(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        if !path.is_file() {
            return Err(WatermarkError::TemplateNotFound {
                name: name.to_string(),
            });
        }
        std::fs::remove_file(&path)?;
        info!("Deleted template '{}'", name);
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty()
        || trimmed != name
        || name.contains(['/', '\\'])
        || name == "."
        || name == ".."
    {
        return Err(WatermarkError::TemplateError {
            message: format!("invalid template name '{}'", name),
        });
    }
    Ok(())
}
