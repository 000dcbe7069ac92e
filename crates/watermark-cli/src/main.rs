//! Command-line interface for the watermark tool

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use watermark_core::batch::collect_sources;
use watermark_core::export::export_image;
use watermark_core::metadata::capture_date_label;
use watermark_core::orientation::load_oriented;
use watermark_core::template::{ResolvedTemplate, TemplateKind};
use watermark_core::{
    init_logging_with, merge_override, version, Anchor, AppConfig, BatchItem, BatchJob,
    BatchRunner, Color, ConfigManager, FontLibrary, ItemOutcome, OutputFormat, PreviewSession,
    ProgressUpdate, RenderRequest, Renderer, ResizePolicy, TemplateStore, TextWatermark,
    WatermarkOverride, WatermarkSpec, WatermarkTemplate,
};

#[derive(Parser)]
#[command(name = "watermark")]
#[command(about = "Batch watermarking with text and image overlays")]
#[command(version = version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Extra directory to search for fonts
    #[arg(long, global = true)]
    font_dir: Vec<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watermark a single image
    Render {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        watermark: WatermarkArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Write a downscaled preview of a watermarked image
    Preview {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Preview file path
        #[arg(short, long)]
        output: PathBuf,

        /// Preview bounds, defaults from configuration
        #[arg(long)]
        max_width: Option<u32>,

        #[arg(long)]
        max_height: Option<u32>,

        /// Print the base-image position of a preview point
        #[arg(long, value_name = "X,Y", value_parser = parse_point)]
        map: Option<(i32, i32)>,

        #[command(flatten)]
        watermark: WatermarkArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Watermark many images into an output directory
    Batch {
        /// Input files or directories
        #[arg(required = true)]
        inputs: Vec<PathBuf>,

        /// Output directory
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,

        /// Worker threads, defaults from configuration
        #[arg(short, long)]
        workers: Option<usize>,

        /// Print the batch report as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        watermark: WatermarkArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Manage saved templates
    Template {
        #[command(subcommand)]
        command: TemplateCommand,
    },

    /// List font families found in the font directories
    Fonts,

    /// Show system information and settings
    Info,
}

#[derive(Subcommand)]
enum TemplateCommand {
    /// List saved templates
    List,

    /// Print a template as JSON
    Show { name: String },

    /// Save the given settings as a template
    Save {
        name: String,

        #[command(flatten)]
        watermark: WatermarkArgs,

        #[command(flatten)]
        export: ExportArgs,
    },

    /// Delete a template
    Delete { name: String },
}

#[derive(Args, Debug, Clone, Default)]
struct WatermarkArgs {
    /// Start from a saved template
    #[arg(short = 'T', long)]
    template: Option<String>,

    /// Watermark text
    #[arg(short, long, conflicts_with = "image")]
    text: Option<String>,

    /// Use each image's capture date as the text
    #[arg(long, conflicts_with = "image")]
    date: bool,

    /// Watermark image path
    #[arg(long)]
    image: Option<PathBuf>,

    /// Font family
    #[arg(long)]
    font: Option<String>,

    /// Font size in pixels
    #[arg(long)]
    size: Option<u32>,

    #[arg(long)]
    bold: bool,

    #[arg(long)]
    italic: bool,

    /// Text colour (#RRGGBB, rgb(r, g, b) or a name)
    #[arg(long)]
    color: Option<String>,

    /// Opacity percentage (0-100)
    #[arg(long)]
    opacity: Option<u8>,

    /// Image watermark scale percentage
    #[arg(long)]
    scale: Option<u32>,

    /// Anchor such as bottom-right or center
    #[arg(short, long)]
    position: Option<String>,

    /// Custom top-left offset in base-image pixels
    #[arg(long, value_name = "X,Y", value_parser = parse_point, conflicts_with = "position")]
    at: Option<(i32, i32)>,

    /// Rotation in degrees, counter-clockwise
    #[arg(long, allow_hyphen_values = true)]
    rotation: Option<i32>,

    /// Enable a drop shadow in this colour
    #[arg(long)]
    shadow: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    shadow_offset: Option<i32>,

    /// Enable an outline in this colour
    #[arg(long)]
    outline: Option<String>,

    #[arg(long)]
    outline_width: Option<u32>,
}

#[derive(Args, Debug, Clone, Default)]
struct ExportArgs {
    /// Output format (jpeg or png)
    #[arg(short, long)]
    format: Option<String>,

    /// JPEG quality (1-100)
    #[arg(short, long)]
    quality: Option<u8>,

    /// Output file name prefix
    #[arg(long)]
    prefix: Option<String>,

    /// Output file name suffix
    #[arg(long)]
    suffix: Option<String>,

    /// Resize before watermarking: 50%, 800x600, 800x, x600 or fit:800x600
    #[arg(long, value_parser = parse_resize)]
    resize: Option<ResizePolicy>,

    /// Spend more time compressing PNG output
    #[arg(long)]
    optimize: bool,
}

fn parse_point(value: &str) -> std::result::Result<(i32, i32), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected X,Y, got '{}'", value))?;
    let x = x.trim().parse().map_err(|e| format!("invalid x: {}", e))?;
    let y = y.trim().parse().map_err(|e| format!("invalid y: {}", e))?;
    Ok((x, y))
}

fn parse_resize(value: &str) -> std::result::Result<ResizePolicy, String> {
    let value = value.trim();
    if let Some(percent) = value.strip_suffix('%') {
        let percent: f64 = percent
            .parse()
            .map_err(|e| format!("invalid percentage: {}", e))?;
        return Ok(ResizePolicy::Percent { percent });
    }

    let (keep_aspect, size) = match value.strip_prefix("fit:") {
        Some(size) => (true, size),
        None => (false, value),
    };
    let (width, height) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH or N%, got '{}'", value))?;
    let side = |s: &str| -> std::result::Result<u32, String> {
        if s.is_empty() {
            Ok(0)
        } else {
            s.parse().map_err(|e| format!("invalid size '{}': {}", s, e))
        }
    };
    match (side(width)?, side(height)?) {
        (0, 0) => Err("resize needs a width or a height".to_string()),
        (width, 0) => Ok(ResizePolicy::Width { width }),
        (0, height) => Ok(ResizePolicy::Height { height }),
        (width, height) => Ok(ResizePolicy::Box {
            width,
            height,
            keep_aspect,
        }),
    }
}

/// Template to start from: the named one, the remembered one, or the
/// configured export defaults
fn base_template(
    name: Option<&str>,
    store: &TemplateStore,
    config: &AppConfig,
) -> Result<WatermarkTemplate> {
    if let Some(name) = name {
        return store
            .load(name)
            .with_context(|| format!("Failed to load template '{}'", name));
    }
    if let Some(name) = config.templates.startup_template() {
        match store.load(name) {
            Ok(template) => {
                info!("Using last template '{}'", name);
                return Ok(template);
            }
            Err(e) => warn!("Ignoring last template '{}': {}", name, e),
        }
    }
    Ok(WatermarkTemplate::capture(
        &WatermarkSpec::text(TextWatermark::default()),
        &Default::default(),
        &config.export,
        None,
    ))
}

fn parse_color(value: &str) -> Result<Color> {
    value
        .parse()
        .with_context(|| format!("Invalid colour '{}'", value))
}

/// Layer command-line settings over a template
fn apply_args(
    template: &mut WatermarkTemplate,
    watermark: &WatermarkArgs,
    export: &ExportArgs,
) -> Result<()> {
    if let Some(text) = &watermark.text {
        template.kind = TemplateKind::Text;
        template.text = text.clone();
    }
    if watermark.date {
        template.kind = TemplateKind::Text;
    }
    if let Some(image) = &watermark.image {
        template.kind = TemplateKind::Image;
        template.image_path = Some(image.clone());
    }
    if let Some(font) = &watermark.font {
        template.font_family = font.clone();
    }
    if let Some(size) = watermark.size {
        template.font_size = size;
    }
    template.bold |= watermark.bold;
    template.italic |= watermark.italic;
    if let Some(color) = &watermark.color {
        template.color = parse_color(color)?;
    }
    if let Some(opacity) = watermark.opacity {
        template.opacity = opacity;
        template.image_opacity = opacity;
    }
    if let Some(scale) = watermark.scale {
        template.image_scale = scale;
    }
    if let Some(position) = &watermark.position {
        template.position = position.parse::<Anchor>()?;
        template.custom_position = None;
    }
    if let Some(at) = watermark.at {
        template.custom_position = Some(at);
    }
    if let Some(rotation) = watermark.rotation {
        template.rotation = rotation;
    }
    if let Some(color) = &watermark.shadow {
        template.shadow = true;
        template.shadow_color = parse_color(color)?;
    }
    if let Some(offset) = watermark.shadow_offset {
        template.shadow_offset = offset;
    }
    if let Some(color) = &watermark.outline {
        template.outline = true;
        template.outline_color = parse_color(color)?;
    }
    if let Some(width) = watermark.outline_width {
        template.outline_width = width;
    }

    if let Some(format) = &export.format {
        template.output_format = format.parse::<OutputFormat>()?;
    }
    if let Some(quality) = export.quality {
        template.quality = quality;
    }
    if let Some(prefix) = &export.prefix {
        template.naming_prefix = prefix.clone();
    }
    if let Some(suffix) = &export.suffix {
        template.naming_suffix = suffix.clone();
    }
    template.optimize |= export.optimize;
    if let Some(policy) = export.resize {
        let captured = WatermarkTemplate::capture(
            &WatermarkSpec::text(TextWatermark::default()),
            &Default::default(),
            &watermark_core::ExportSettings {
                resize: Some(policy),
                ..Default::default()
            },
            None,
        );
        template.resize_enabled = true;
        template.resize_width = captured.resize_width;
        template.resize_height = captured.resize_height;
        template.resize_percent = captured.resize_percent;
        template.resize_keep_aspect = captured.resize_keep_aspect;
    }
    Ok(())
}

struct App {
    manager: ConfigManager,
    store: TemplateStore,
    renderer: Renderer,
}

impl App {
    fn settings(&self, watermark: &WatermarkArgs, export: &ExportArgs) -> Result<WatermarkTemplate> {
        let mut template =
            base_template(watermark.template.as_deref(), &self.store, self.manager.config())?;
        apply_args(&mut template, watermark, export)?;
        Ok(template)
    }

    fn resolve(&self, watermark: &WatermarkArgs, export: &ExportArgs) -> Result<ResolvedTemplate> {
        let settings = self.settings(watermark, export)?;
        if let Some(path) = &settings.image_path {
            if settings.kind == TemplateKind::Image && !path.exists() {
                warn!("Watermark image {} not found", path.display());
            }
        }
        Ok(settings.resolve())
    }
}

fn date_override(watermark: &WatermarkArgs, source: &Path) -> WatermarkOverride {
    WatermarkOverride {
        content: watermark.date.then(|| capture_date_label(source)),
        ..WatermarkOverride::default()
    }
}

fn print_progress(update: &ProgressUpdate) {
    let name = update
        .outcome
        .source()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let status = match &update.outcome {
        ItemOutcome::Succeeded { .. } => "ok".to_string(),
        ItemOutcome::Failed { message, .. } => message.clone(),
        ItemOutcome::Skipped { .. } => "skipped".to_string(),
    };
    eprintln!("[{}/{}] {}: {}", update.completed, update.total, name, status);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    }
    .context("Failed to load configuration")?;

    let mut logging = manager.config().logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    let _log_guard = init_logging_with(&logging)?;
    info!("Watermark CLI v{} starting", version());

    let mut fonts = manager.config().fonts.clone();
    fonts.directories.extend(cli.font_dir.iter().cloned());
    let library = Arc::new(FontLibrary::from_config(&fonts));
    let mut app = App {
        store: TemplateStore::from_config(&manager.config().templates),
        renderer: Renderer::new(library.clone()),
        manager,
    };

    match cli.command {
        Commands::Render {
            input,
            output,
            watermark,
            mut export,
        } => {
            if export.format.is_none() {
                export.format = output
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .filter(|ext| ext.parse::<OutputFormat>().is_ok())
                    .map(str::to_string);
            }
            let resolved = app.resolve(&watermark, &export)?;
            let (spec, placement) = merge_override(
                &resolved.spec,
                &resolved.placement,
                &date_override(&watermark, &input),
            );

            let renderer = app.renderer.clone();
            let settings = resolved.export.clone();
            let written = tokio::task::spawn_blocking(move || -> Result<u64> {
                let mut base = load_oriented(&input)
                    .with_context(|| format!("Failed to load {}", input.display()))?;
                if let Some(policy) = &settings.resize {
                    base = policy.apply(&base);
                }
                let rendered = renderer.render(&RenderRequest::new(&base, &spec, &placement));
                Ok(export_image(&rendered, &settings, &output)?)
            })
            .await??;
            println!("Wrote {} bytes", written);
        }

        Commands::Preview {
            input,
            output,
            max_width,
            max_height,
            map,
            watermark,
            export,
        } => {
            let resolved = app.resolve(&watermark, &export)?;
            let (spec, placement) = merge_override(
                &resolved.spec,
                &resolved.placement,
                &date_override(&watermark, &input),
            );
            let preview_config = &app.manager.config().preview;
            let session = PreviewSession::new(
                app.renderer.clone(),
                max_width.unwrap_or(preview_config.max_width),
                max_height.unwrap_or(preview_config.max_height),
            );
            let (preview, surface) =
                session.preview(&input, &spec, &placement, resolved.export.resize.as_ref())?;
            preview
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!(
                "Preview {}x{} of {}x{}",
                surface.preview_width,
                surface.preview_height,
                surface.base_width,
                surface.base_height
            );
            if let Some((x, y)) = map {
                let (bx, by) = surface.to_base(x, y);
                println!("Preview ({}, {}) is base ({}, {})", x, y, bx, by);
            }
        }

        Commands::Batch {
            inputs,
            output_dir,
            recursive,
            workers,
            json,
            watermark,
            export,
        } => {
            let resolved = app.resolve(&watermark, &export)?;
            let mut sources = Vec::new();
            for input in &inputs {
                if input.is_dir() {
                    sources.extend(collect_sources(input, recursive)?);
                } else {
                    sources.push(input.clone());
                }
            }
            if sources.is_empty() {
                bail!("No images found");
            }

            let mut job = BatchJob::new(
                resolved.spec,
                resolved.placement,
                resolved.export,
                &output_dir,
            );
            for source in sources {
                let overrides = date_override(&watermark, &source);
                job.add_item(BatchItem::new(source).with_override(overrides));
            }
            if job.writes_into_source_dir() {
                warn!("Output directory contains source images; originals are never overwritten");
            }

            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, finishing images already in progress");
                    signal.cancel();
                }
            });

            let workers = workers.unwrap_or_else(|| app.manager.config().batch.workers());
            let runner = BatchRunner::new(app.renderer.clone()).with_workers(workers);
            let report = runner
                .run_async(job, cancel, move |update| {
                    if !json {
                        print_progress(&update);
                    }
                })
                .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Exported {} of {} images to {}",
                    report.succeeded(),
                    report.outcomes.len(),
                    output_dir.display()
                );
            }
            if report.cancelled {
                bail!("Batch cancelled after {} images", report.succeeded());
            }
            if report.failed() > 0 {
                bail!(
                    "{} of {} images failed",
                    report.failed(),
                    report.outcomes.len()
                );
            }
        }

        Commands::Template { command } => match command {
            TemplateCommand::List => {
                let names = app.store.list()?;
                if names.is_empty() {
                    println!("No templates in {}", app.store.dir().display());
                }
                for name in names {
                    println!("{}", name);
                }
            }
            TemplateCommand::Show { name } => {
                let template = app
                    .store
                    .load(&name)
                    .with_context(|| format!("Failed to load template '{}'", name))?;
                println!("{}", serde_json::to_string_pretty(&template)?);
            }
            TemplateCommand::Save {
                name,
                watermark,
                export,
            } => {
                let template = app.settings(&watermark, &export)?;
                let path = app.store.save(&name, &template)?;
                app.manager.remember_template(&name)?;
                println!("Saved template '{}' to {}", name, path.display());
            }
            TemplateCommand::Delete { name } => {
                app.store.delete(&name)?;
                println!("Deleted template '{}'", name);
            }
        },

        Commands::Fonts => {
            let families = library.families();
            if families.is_empty() {
                println!("No font files found; text uses the built-in bitmap face");
            }
            for family in families {
                println!("{}", family);
            }
        }

        Commands::Info => {
            let config = app.manager.config();
            println!("Watermark v{}", version());
            println!("Text and image watermarking tool");
            println!("\nSystem Information:");
            println!("  CPU cores: {}", num_cpus::get());
            println!("  Batch workers: {}", config.batch.workers());
            println!("  Platform: {}", std::env::consts::OS);
            println!("  Architecture: {}", std::env::consts::ARCH);
            println!("\nSettings:");
            println!("  Config file: {}", app.manager.config_path().display());
            println!("  Templates: {}", app.store.dir().display());
            println!("  Font families: {}", library.families().len());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["watermark", "info"]);
        assert!(cli.is_ok());

        let cli = Cli::try_parse_from([
            "watermark", "render", "-i", "in.jpg", "-o", "out.png", "--text", "Hi", "--at",
            "10,-5", "--rotation", "-30",
        ])
        .unwrap();
        match cli.command {
            Commands::Render { watermark, .. } => {
                assert_eq!(watermark.at, Some((10, -5)));
                assert_eq!(watermark.rotation, Some(-30));
            }
            _ => panic!("expected render"),
        }
    }

    #[test]
    fn test_text_and_image_conflict() {
        let cli = Cli::try_parse_from([
            "watermark", "render", "-i", "a.jpg", "-o", "b.jpg", "--text", "x", "--image",
            "logo.png",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_parse_resize() {
        assert_eq!(
            parse_resize("50%").unwrap(),
            ResizePolicy::Percent { percent: 50.0 }
        );
        assert_eq!(
            parse_resize("800x600").unwrap(),
            ResizePolicy::Box {
                width: 800,
                height: 600,
                keep_aspect: false
            }
        );
        assert_eq!(
            parse_resize("fit:800x600").unwrap(),
            ResizePolicy::Box {
                width: 800,
                height: 600,
                keep_aspect: true
            }
        );
        assert_eq!(parse_resize("800x").unwrap(), ResizePolicy::Width { width: 800 });
        assert_eq!(parse_resize("x600").unwrap(), ResizePolicy::Height { height: 600 });
        assert!(parse_resize("x").is_err());
        assert!(parse_resize("big").is_err());
    }

    #[test]
    fn test_apply_args_overrides_template() {
        let mut template = WatermarkTemplate::default();
        let watermark = WatermarkArgs {
            text: Some("Proof".to_string()),
            color: Some("#FF0000".to_string()),
            position: Some("top-left".to_string()),
            shadow: Some("black".to_string()),
            ..WatermarkArgs::default()
        };
        let export = ExportArgs {
            format: Some("png".to_string()),
            resize: Some(ResizePolicy::Width { width: 640 }),
            ..ExportArgs::default()
        };
        apply_args(&mut template, &watermark, &export).unwrap();

        assert_eq!(template.text, "Proof");
        assert_eq!(template.color, Color::rgb(255, 0, 0));
        assert_eq!(template.position, Anchor::TopLeft);
        assert!(template.shadow);
        assert_eq!(template.output_format, OutputFormat::Png);
        assert_eq!(
            template.resize_policy(),
            Some(ResizePolicy::Width { width: 640 })
        );
    }

    #[test]
    fn test_apply_args_rejects_bad_colour() {
        let mut template = WatermarkTemplate::default();
        let watermark = WatermarkArgs {
            color: Some("not-a-colour".to_string()),
            ..WatermarkArgs::default()
        };
        assert!(apply_args(&mut template, &watermark, &ExportArgs::default()).is_err());
    }
}
