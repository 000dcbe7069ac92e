//! # Watermark Core
//!
//! Watermark compositing engine: anchor and rotation geometry, text and
//! image watermark layers, alpha compositing, preview scaling and parallel
//! batch export with saved templates.

pub mod batch;
pub mod composite;
pub mod config;
pub mod effects;
pub mod error;
pub mod export;
pub mod font;
pub mod geometry;
pub mod image_layer;
pub mod logging;
pub mod metadata;
pub mod models;
pub mod orientation;
pub mod render;
pub mod resize;
pub mod template;
pub mod text;

// Re-export commonly used types
pub use batch::{BatchItem, BatchJob, BatchReport, BatchRunner, ItemOutcome, ProgressUpdate};
pub use config::*;
pub use error::*;
pub use font::{FontLibrary, FontProvider};
pub use geometry::{place, Placed, PreviewSurface};
pub use logging::*;
pub use models::*;
pub use render::{PreviewSession, RenderRequest, Rendered, Renderer};
pub use resize::ResizePolicy;
pub use template::{TemplateStore, WatermarkTemplate};

/// Initialize the watermark core library with default logging
pub fn init() -> Result<()> {
    logging::init_logging()?;

    tracing::info!("Watermark core {} initialized", version());
    Ok(())
}

/// Get the version of the watermark core
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
