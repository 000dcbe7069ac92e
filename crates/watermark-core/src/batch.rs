//! Batch export
//!
//! A [`BatchJob`] pairs a shared watermark with a list of source files. The
//! [`BatchRunner`] fans the items out over a rayon pool; each item is
//! loaded, optionally resized, rendered and written independently, so one
//! bad file never stops the others.

use crate::error::{Result, WatermarkError};
use crate::export::export_image;
use crate::models::{merge_override, ExportSettings, Placement, WatermarkOverride, WatermarkSpec};
use crate::orientation::load_oriented;
use crate::render::{RenderRequest, Renderer};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub type BatchId = Uuid;

/// Extensions picked up when a directory is given as batch input
pub const SOURCE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

pub fn is_source_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SOURCE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Image files under `dir`, sorted by path. Without `recursive` only the
/// top level is read.
pub fn collect_sources(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(WatermarkError::FileNotFound {
            path: dir.to_path_buf(),
        });
    }
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut sources = Vec::new();
    for entry in WalkDir::new(dir).max_depth(max_depth) {
        let entry = entry.map_err(|e| WatermarkError::Io(e.into()))?;
        if entry.file_type().is_file() && is_source_image(entry.path()) {
            sources.push(entry.into_path());
        }
    }
    sources.sort();
    debug!("Found {} images in {}", sources.len(), dir.display());
    Ok(sources)
}

/// One source image plus its per-image adjustments
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    pub source: PathBuf,
    pub overrides: WatermarkOverride,
}

impl BatchItem {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            overrides: WatermarkOverride::default(),
        }
    }

    pub fn with_override(mut self, overrides: WatermarkOverride) -> Self {
        self.overrides = overrides;
        self
    }
}

/// Everything needed to export a set of images
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub id: BatchId,
    pub items: Vec<BatchItem>,
    pub spec: WatermarkSpec,
    pub placement: Placement,
    pub export: ExportSettings,
    pub output_dir: PathBuf,
}

impl BatchJob {
    pub fn new(
        spec: WatermarkSpec,
        placement: Placement,
        export: ExportSettings,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            items: Vec::new(),
            spec,
            placement,
            export,
            output_dir: output_dir.into(),
        }
    }

    pub fn add_item(&mut self, item: BatchItem) {
        self.items.push(item);
    }

    pub fn with_sources<I, P>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.items.extend(sources.into_iter().map(BatchItem::new));
        self
    }

    /// Where the export of `item` will be written
    pub fn output_path(&self, item: &BatchItem) -> PathBuf {
        let stem = item
            .source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.output_dir.join(self.export.output_file_name(&stem))
    }

    /// True when any source lives in the output directory
    pub fn writes_into_source_dir(&self) -> bool {
        self.items.iter().any(|item| {
            item.source
                .parent()
                .map(|parent| same_location(parent, &self.output_dir))
                .unwrap_or(false)
        })
    }
}

/// What happened to one item
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded {
        source: PathBuf,
        output: PathBuf,
        bytes: u64,
    },
    Failed {
        source: PathBuf,
        message: String,
    },
    /// Not attempted because the batch was cancelled first
    Skipped { source: PathBuf },
}

impl ItemOutcome {
    pub fn source(&self) -> &Path {
        match self {
            ItemOutcome::Succeeded { source, .. }
            | ItemOutcome::Failed { source, .. }
            | ItemOutcome::Skipped { source } => source,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Succeeded { .. })
    }
}

/// Emitted once per finished item, from whichever worker finished it
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub batch_id: BatchId,
    pub completed: usize,
    pub total: usize,
    pub outcome: ItemOutcome,
    pub timestamp: DateTime<Utc>,
}

impl ProgressUpdate {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f32 * 100.0 / self.total as f32
        }
    }
}

/// Outcomes in input order
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub batch_id: BatchId,
    pub outcomes: Vec<ItemOutcome>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Failed { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, ItemOutcome::Skipped { .. }))
            .count()
    }

    pub fn is_complete_success(&self) -> bool {
        !self.cancelled && self.succeeded() == self.outcomes.len()
    }
}

/// Runs batch jobs on a bounded worker pool
#[derive(Debug, Clone)]
pub struct BatchRunner {
    renderer: Renderer,
    workers: usize,
}

impl BatchRunner {
    pub fn new(renderer: Renderer) -> Self {
        Self {
            renderer,
            workers: num_cpus::get(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process every item, blocking the calling thread until done or
    /// cancelled. Items still waiting when `cancel` fires are skipped;
    /// items already written stay on disk.
    pub fn run<F>(&self, job: &BatchJob, cancel: &CancellationToken, progress: F) -> Result<BatchReport>
    where
        F: Fn(ProgressUpdate) + Send + Sync,
    {
        let started_at = Utc::now();
        let total = job.items.len();
        info!(
            "Starting batch {} with {} images on {} workers",
            job.id, total, self.workers
        );
        if job.writes_into_source_dir() {
            warn!(
                "Batch {} writes into a source directory: {}",
                job.id,
                job.output_dir.display()
            );
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| WatermarkError::ProcessingFailed {
                message: format!("failed to start worker pool: {}", e),
            })?;

        let completed = AtomicUsize::new(0);
        let outcomes: Vec<ItemOutcome> = pool.install(|| {
            job.items
                .par_iter()
                .map(|item| {
                    let outcome = self.process(job, item, cancel);
                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    progress(ProgressUpdate {
                        batch_id: job.id,
                        completed: done,
                        total,
                        outcome: outcome.clone(),
                        timestamp: Utc::now(),
                    });
                    outcome
                })
                .collect()
        });

        let report = BatchReport {
            batch_id: job.id,
            outcomes,
            started_at,
            finished_at: Utc::now(),
            cancelled: cancel.is_cancelled(),
        };
        info!(
            "Batch {} finished: {} succeeded, {} failed, {} skipped",
            job.id,
            report.succeeded(),
            report.failed(),
            report.skipped()
        );
        Ok(report)
    }

    /// [`BatchRunner::run`] on the blocking thread pool
    pub async fn run_async<F>(
        self,
        job: BatchJob,
        cancel: CancellationToken,
        progress: F,
    ) -> Result<BatchReport>
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        tokio::task::spawn_blocking(move || self.run(&job, &cancel, progress))
            .await
            .map_err(|e| WatermarkError::ProcessingFailed {
                message: format!("batch task failed: {}", e),
            })?
    }

    fn process(&self, job: &BatchJob, item: &BatchItem, cancel: &CancellationToken) -> ItemOutcome {
        let source = item.source.clone();
        if cancel.is_cancelled() {
            return ItemOutcome::Skipped { source };
        }

        match self.export_item(job, item, cancel) {
            Ok(Some((output, bytes))) => ItemOutcome::Succeeded {
                source,
                output,
                bytes,
            },
            Ok(None) => ItemOutcome::Skipped { source },
            Err(e) => {
                let message = failure_message(&source, &e);
                warn!("{}", message);
                ItemOutcome::Failed { source, message }
            }
        }
    }

    fn export_item(
        &self,
        job: &BatchJob,
        item: &BatchItem,
        cancel: &CancellationToken,
    ) -> Result<Option<(PathBuf, u64)>> {
        let output = job.output_path(item);
        if same_location(&item.source, &output) {
            return Err(WatermarkError::WouldOverwriteSource {
                path: item.source.clone(),
            });
        }

        let mut base = load_oriented(&item.source)?;
        if let Some(policy) = &job.export.resize {
            base = policy.apply(&base);
        }

        let (spec, placement) = merge_override(&job.spec, &job.placement, &item.overrides);
        let rendered = self
            .renderer
            .render(&RenderRequest::new(&base, &spec, &placement));

        if cancel.is_cancelled() {
            debug!("Cancelled before writing {}", output.display());
            return Ok(None);
        }
        let bytes = export_image(&rendered, &job.export, &output)?;
        Ok(Some((output, bytes)))
    }
}

fn failure_message(source: &Path, error: &WatermarkError) -> String {
    let name = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());
    format!("failed to process {}: {}", name, error)
}

/// Compare two paths after resolving symlinks and `..`. The second path
/// does not need to exist yet.
fn same_location(a: &Path, b: &Path) -> bool {
    match (resolve(a), resolve(b)) {
        (Some(a), Some(b)) => a == b,
        _ => a == b,
    }
}

fn resolve(path: &Path) -> Option<PathBuf> {
    if let Ok(resolved) = path.canonicalize() {
        return Some(resolved);
    }
    let parent = path.parent()?;
    let parent = if parent.as_os_str().is_empty() {
        Path::new(".")
    } else {
        parent
    };
    Some(parent.canonicalize().ok()?.join(path.file_name()?))
}
