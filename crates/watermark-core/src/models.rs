//! Core data models for watermark rendering
//!
//! Every value here is fully resolved before it reaches the renderer: colors
//! are typed, per-image overrides are already merged, and custom positions are
//! already expressed in the pixel space of the image being rendered.

use crate::error::{Result, WatermarkError};
use crate::geometry::apply_positional_bias;
use crate::resize::ResizePolicy;
use image::DynamicImage;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn black() -> Self {
        Self::rgb(0, 0, 0)
    }

    pub const fn white() -> Self {
        Self::rgb(255, 255, 255)
    }

    /// Pixel with this color and the given alpha
    pub fn with_alpha(&self, alpha: u8) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, alpha])
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name {
            "white" => Self::white(),
            "black" => Self::black(),
            "red" => Self::rgb(255, 0, 0),
            "green" => Self::rgb(0, 128, 0),
            "blue" => Self::rgb(0, 0, 255),
            "yellow" => Self::rgb(255, 255, 0),
            "gray" | "grey" => Self::rgb(128, 128, 128),
            _ => return None,
        };
        Some(color)
    }
}

fn rgb_function_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^rgb\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*\)$")
            .expect("static rgb() pattern is valid")
    })
}

impl FromStr for Color {
    type Err = WatermarkError;

    /// Parse `#RGB`, `#RRGGBB`, `rgb(r, g, b)` or a basic color name
    fn from_str(value: &str) -> Result<Self> {
        let trimmed = value.trim().to_ascii_lowercase();
        let invalid = || WatermarkError::InvalidColor {
            value: value.to_string(),
        };

        if let Some(hex) = trimmed.strip_prefix('#') {
            if !hex.is_ascii() {
                return Err(invalid());
            }
            let digit = |s: &str| u8::from_str_radix(s, 16).map_err(|_| invalid());
            return match hex.len() {
                3 => Ok(Self::rgb(
                    digit(&hex[0..1])? * 17,
                    digit(&hex[1..2])? * 17,
                    digit(&hex[2..3])? * 17,
                )),
                6 => Ok(Self::rgb(
                    digit(&hex[0..2])?,
                    digit(&hex[2..4])?,
                    digit(&hex[4..6])?,
                )),
                _ => Err(invalid()),
            };
        }

        if let Some(captures) = rgb_function_pattern().captures(&trimmed) {
            let channel = |i: usize| -> Result<u8> {
                captures[i].parse::<u8>().map_err(|_| invalid())
            };
            return Ok(Self::rgb(channel(1)?, channel(2)?, channel(3)?));
        }

        Self::named(&trimmed).ok_or_else(invalid)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = WatermarkError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// The nine named watermark anchors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Anchor {
    TopLeft,
    TopCenter,
    TopRight,
    CenterLeft,
    Center,
    CenterRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::BottomRight
    }
}

impl Anchor {
    pub const ALL: [Anchor; 9] = [
        Anchor::TopLeft,
        Anchor::TopCenter,
        Anchor::TopRight,
        Anchor::CenterLeft,
        Anchor::Center,
        Anchor::CenterRight,
        Anchor::BottomLeft,
        Anchor::BottomCenter,
        Anchor::BottomRight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Anchor::TopLeft => "top-left",
            Anchor::TopCenter => "top-center",
            Anchor::TopRight => "top-right",
            Anchor::CenterLeft => "center-left",
            Anchor::Center => "center",
            Anchor::CenterRight => "center-right",
            Anchor::BottomLeft => "bottom-left",
            Anchor::BottomCenter => "bottom-center",
            Anchor::BottomRight => "bottom-right",
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Anchor {
    type Err = WatermarkError;

    fn from_str(value: &str) -> Result<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let anchor = match normalized.as_str() {
            "top-left" | "nw" => Anchor::TopLeft,
            "top-center" | "top" | "n" => Anchor::TopCenter,
            "top-right" | "ne" => Anchor::TopRight,
            "center-left" | "left" | "w" => Anchor::CenterLeft,
            "center" | "middle" | "c" => Anchor::Center,
            "center-right" | "right" | "e" => Anchor::CenterRight,
            "bottom-left" | "sw" => Anchor::BottomLeft,
            "bottom-center" | "bottom" | "s" => Anchor::BottomCenter,
            "bottom-right" | "se" => Anchor::BottomRight,
            _ => {
                return Err(WatermarkError::InvalidInput {
                    message: format!("unknown anchor '{}'", value),
                })
            }
        };
        Ok(anchor)
    }
}

/// Where a watermark goes on the base image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Placement {
    /// Named anchor plus an additive per-image bias
    Anchored {
        anchor: Anchor,
        #[serde(default)]
        bias_x: i32,
        #[serde(default)]
        bias_y: i32,
    },
    /// Free position of the (rotated) watermark box's top-left corner, in
    /// base-image pixels. Never clamped.
    Custom { x: i32, y: i32 },
}

impl Placement {
    pub fn anchored(anchor: Anchor) -> Self {
        Placement::Anchored {
            anchor,
            bias_x: 0,
            bias_y: 0,
        }
    }

    pub fn custom(x: i32, y: i32) -> Self {
        Placement::Custom { x, y }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Placement::anchored(Anchor::default())
    }
}

/// Drop shadow drawn behind text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowStyle {
    pub color: Color,
    pub offset_px: i32,
    #[serde(default)]
    pub blur_radius_px: u32,
}

impl Default for ShadowStyle {
    fn default() -> Self {
        Self {
            color: Color::black(),
            offset_px: 2,
            blur_radius_px: 0,
        }
    }
}

/// Stroke drawn around text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineStyle {
    pub color: Color,
    pub width_px: u32,
}

/// Text watermark parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextWatermark {
    pub content: String,
    pub font_family: String,
    pub font_size_px: u32,
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    pub fill_color: Color,
    pub opacity_percent: u8,
    #[serde(default)]
    pub shadow: Option<ShadowStyle>,
    #[serde(default)]
    pub outline: Option<OutlineStyle>,
}

impl Default for TextWatermark {
    fn default() -> Self {
        Self {
            content: "Watermark".to_string(),
            font_family: "Arial".to_string(),
            font_size_px: 40,
            bold: false,
            italic: false,
            fill_color: Color::white(),
            opacity_percent: 80,
            shadow: None,
            outline: None,
        }
    }
}

/// Largest accepted font size; larger requests are clamped
pub const MAX_FONT_SIZE_PX: u32 = 200;
/// Largest accepted image watermark scale
pub const MAX_SCALE_PERCENT: u32 = 500;

impl TextWatermark {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// Copy with every numeric field pulled into its valid range
    pub fn clamped(&self) -> Self {
        Self {
            font_size_px: self.font_size_px.clamp(1, MAX_FONT_SIZE_PX),
            opacity_percent: self.opacity_percent.min(100),
            outline: self.outline.map(|outline| OutlineStyle {
                width_px: outline.width_px.max(1),
                ..outline
            }),
            ..self.clone()
        }
    }
}

/// Image watermark parameters
#[derive(Clone)]
pub struct ImageWatermark {
    /// Decoded watermark bitmap; `None` when the source could not be loaded
    pub bitmap: Option<Arc<DynamicImage>>,
    pub scale_percent: u32,
    pub opacity_percent: u8,
}

impl ImageWatermark {
    pub fn new(bitmap: DynamicImage) -> Self {
        Self {
            bitmap: Some(Arc::new(bitmap)),
            scale_percent: 100,
            opacity_percent: 80,
        }
    }

    /// Image watermark whose source is unavailable; renders as a no-op
    pub fn missing() -> Self {
        Self {
            bitmap: None,
            scale_percent: 100,
            opacity_percent: 80,
        }
    }

    pub fn clamped(&self) -> Self {
        Self {
            bitmap: self.bitmap.clone(),
            scale_percent: self.scale_percent.clamp(1, MAX_SCALE_PERCENT),
            opacity_percent: self.opacity_percent.min(100),
        }
    }
}

impl fmt::Debug for ImageWatermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageWatermark")
            .field(
                "bitmap",
                &self.bitmap.as_ref().map(|b| (b.width(), b.height())),
            )
            .field("scale_percent", &self.scale_percent)
            .field("opacity_percent", &self.opacity_percent)
            .finish()
    }
}

/// Text or image content of a watermark
#[derive(Debug, Clone)]
pub enum WatermarkKind {
    Text(TextWatermark),
    Image(ImageWatermark),
}

/// Fully resolved watermark description handed to the renderer
#[derive(Debug, Clone)]
pub struct WatermarkSpec {
    kind: WatermarkKind,
    rotation_degrees: i32,
}

impl WatermarkSpec {
    pub fn text(text: TextWatermark) -> Self {
        Self {
            kind: WatermarkKind::Text(text),
            rotation_degrees: 0,
        }
    }

    pub fn image(image: ImageWatermark) -> Self {
        Self {
            kind: WatermarkKind::Image(image),
            rotation_degrees: 0,
        }
    }

    /// Set the counter-clockwise rotation; wrapped into `[0, 360)`
    pub fn with_rotation(mut self, degrees: i32) -> Self {
        self.rotation_degrees = degrees.rem_euclid(360);
        self
    }

    pub fn kind(&self) -> &WatermarkKind {
        &self.kind
    }

    pub fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    pub fn is_text(&self) -> bool {
        matches!(self.kind, WatermarkKind::Text(_))
    }
}

/// Encoded output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    #[serde(alias = "JPEG", alias = "jpg")]
    Jpeg,
    #[serde(alias = "PNG")]
    Png,
}

impl OutputFormat {
    /// Get the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    /// Check if this format supports transparency
    pub fn supports_transparency(&self) -> bool {
        matches!(self, OutputFormat::Png)
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            OutputFormat::Jpeg => image::ImageFormat::Jpeg,
            OutputFormat::Png => image::ImageFormat::Png,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = WatermarkError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(WatermarkError::UnsupportedFormat {
                format: other.to_string(),
            }),
        }
    }
}

/// Output encoding and naming used by batch export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub format: OutputFormat,
    pub jpeg_quality: u8,
    pub optimize: bool,
    pub prefix: String,
    pub suffix: String,
    pub resize: Option<ResizePolicy>,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Jpeg,
            jpeg_quality: 90,
            optimize: false,
            prefix: String::new(),
            suffix: "_watermarked".to_string(),
            resize: None,
        }
    }
}

impl ExportSettings {
    /// JPEG quality pulled into `[1, 100]`
    pub fn quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }

    /// `{prefix}{stem}{suffix}.{ext}`
    pub fn output_file_name(&self, stem: &str) -> String {
        format!(
            "{}{}{}.{}",
            self.prefix,
            stem,
            self.suffix,
            self.format.extension()
        )
    }
}

/// Per-image adjustments layered over the shared watermark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WatermarkOverride {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub font_size_px: Option<u32>,
    #[serde(default)]
    pub opacity_percent: Option<u8>,
    #[serde(default)]
    pub rotation_degrees: Option<i32>,
    #[serde(default)]
    pub anchor: Option<Anchor>,
    /// Added to whatever bias the anchored placement already carries
    #[serde(default)]
    pub bias: Option<(i32, i32)>,
    /// Replaces the placement entirely
    #[serde(default)]
    pub custom_position: Option<(i32, i32)>,
}

impl WatermarkOverride {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Merge a per-image override into the shared watermark and placement.
///
/// Text-only fields are ignored for image watermarks.
pub fn merge_override(
    shared: &WatermarkSpec,
    placement: &Placement,
    item: &WatermarkOverride,
) -> (WatermarkSpec, Placement) {
    let kind = match shared.kind() {
        WatermarkKind::Text(text) => {
            let mut text = text.clone();
            if let Some(content) = &item.content {
                text.content = content.clone();
            }
            if let Some(size) = item.font_size_px {
                text.font_size_px = size;
            }
            if let Some(opacity) = item.opacity_percent {
                text.opacity_percent = opacity;
            }
            WatermarkKind::Text(text)
        }
        WatermarkKind::Image(image) => {
            let mut image = image.clone();
            if let Some(opacity) = item.opacity_percent {
                image.opacity_percent = opacity;
            }
            WatermarkKind::Image(image)
        }
    };

    let rotation = item
        .rotation_degrees
        .unwrap_or_else(|| shared.rotation_degrees());
    let spec = WatermarkSpec {
        kind,
        rotation_degrees: 0,
    }
    .with_rotation(rotation);

    let (extra_x, extra_y) = item.bias.unwrap_or((0, 0));
    let placement = if let Some((x, y)) = item.custom_position {
        Placement::custom(x, y)
    } else {
        match (*placement, item.anchor) {
            (Placement::Custom { x, y }, None) => {
                let (x, y) = apply_positional_bias(x, y, extra_x, extra_y);
                Placement::custom(x, y)
            }
            (Placement::Custom { .. }, Some(anchor)) => Placement::Anchored {
                anchor,
                bias_x: extra_x,
                bias_y: extra_y,
            },
            (
                Placement::Anchored {
                    anchor,
                    bias_x,
                    bias_y,
                },
                item_anchor,
            ) => Placement::Anchored {
                anchor: item_anchor.unwrap_or(anchor),
                bias_x: bias_x.saturating_add(extra_x),
                bias_y: bias_y.saturating_add(extra_y),
            },
        }
    };

    (spec, placement)
}
