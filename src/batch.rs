//! Batch fan-out: many items, one bounded worker pool.
//!
//! ## Fault isolation
//!
//! Every item runs in its own spawned task, so an error *or a panic* in one
//! item is caught at the item boundary, logged, and counted as a failure.
//! Siblings keep running and the batch always produces a summary.
//!
//! ## Output files
//!
//! Each item converts into a hidden `.part` file created next to its
//! destination and renames it into place only after the conversion
//! succeeded. On failure the `.part` file is deleted, so a destination path
//! either holds a complete document or does not exist.

use crate::discover::extension_of;
use crate::error::ConversionError;
use crate::output::{BatchSummary, ItemResult};
use crate::pipeline::input::{FileSource, InputSource};
use crate::pipeline::retry::{ConvertReport, RetryingConverter};
use crate::progress::ProgressCallback;
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// One input plus its destination.
#[derive(Clone)]
pub struct BatchItem {
    pub source: Arc<dyn InputSource>,
    pub source_format: String,
    pub target_format: String,
    pub destination: PathBuf,
}

impl BatchItem {
    /// Item for a local file; the source format is its extension.
    pub fn from_file(
        path: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        target_format: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let source_format = extension_of(&path).unwrap_or_default();
        Self {
            source: Arc::new(FileSource::new(path)),
            source_format,
            target_format: target_format.into(),
            destination: destination.into(),
        }
    }
}

impl std::fmt::Debug for BatchItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchItem")
            .field("source", &self.source.name())
            .field("source_format", &self.source_format)
            .field("target_format", &self.target_format)
            .field("destination", &self.destination)
            .finish()
    }
}

/// Runs items through a [`RetryingConverter`] with at most `pool_width`
/// of them in flight.
pub struct BatchDispatcher {
    pool_width: usize,
    progress: Option<ProgressCallback>,
}

impl BatchDispatcher {
    pub fn new(pool_width: usize) -> Result<Self, ConversionError> {
        if pool_width < 1 {
            return Err(ConversionError::InvalidConfig(format!(
                "threads_count must be 1 or more, but was {pool_width}"
            )));
        }
        Ok(Self {
            pool_width,
            progress: None,
        })
    }

    pub fn with_progress(mut self, progress: Option<ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    pub fn pool_width(&self) -> usize {
        self.pool_width
    }

    /// Convert every item and wait until each reached a terminal outcome.
    ///
    /// Items complete in any order; `summary.items` is in completion order.
    pub async fn run(
        &self,
        items: Vec<BatchItem>,
        converter: Arc<RetryingConverter>,
    ) -> BatchSummary {
        let total = items.len();
        let started = Instant::now();
        info!(
            "Will process {} files with {} workers",
            total, self.pool_width
        );
        if let Some(ref cb) = self.progress {
            cb.on_batch_start(total);
        }

        let results: Vec<ItemResult> = stream::iter(items.into_iter().enumerate().map(
            |(i, item)| {
                let converter = Arc::clone(&converter);
                let progress = self.progress.clone();
                async move { run_item(converter, item, i + 1, total, progress).await }
            },
        ))
        .buffer_unordered(self.pool_width)
        .collect()
        .await;

        let succeeded = results.iter().filter(|r| r.is_success()).count();
        info!("Converted successfully {} files from {}", succeeded, total);
        if let Some(ref cb) = self.progress {
            cb.on_batch_complete(total, succeeded);
        }

        BatchSummary {
            succeeded,
            total,
            duration_ms: started.elapsed().as_millis() as u64,
            items: results,
        }
    }
}

async fn run_item(
    converter: Arc<RetryingConverter>,
    item: BatchItem,
    index: usize,
    total: usize,
    progress: Option<ProgressCallback>,
) -> ItemResult {
    let name = item.source.name();
    let destination = item.destination.clone();
    debug!(
        "Start converting document {} to {}",
        name,
        destination.display()
    );
    if let Some(ref cb) = progress {
        cb.on_item_start(&name, index, total);
    }

    let started = Instant::now();
    let outcome = tokio::spawn(async move { convert_item(&converter, &item).await })
        .await
        .unwrap_or_else(|e| Err(ConversionError::Internal(format!("item task failed: {e}"))));
    let elapsed = started.elapsed();

    match outcome {
        Ok(report) => {
            debug!(
                "Finished converting document {} in {}ms",
                destination.display(),
                elapsed.as_millis()
            );
            if let Some(ref cb) = progress {
                cb.on_item_complete(&name, index, total, elapsed);
            }
            ItemResult {
                name,
                destination,
                attempts: report.attempts,
                bytes_written: report.bytes_written,
                duration_ms: elapsed.as_millis() as u64,
                error: None,
            }
        }
        Err(e) => {
            error!("Error converting document '{}': {}", name, e);
            let message = e.to_string();
            if let Some(ref cb) = progress {
                cb.on_item_error(&name, index, total, &message);
            }
            ItemResult {
                name,
                destination,
                attempts: e.attempts().unwrap_or(0),
                bytes_written: 0,
                duration_ms: elapsed.as_millis() as u64,
                error: Some(message),
            }
        }
    }
}

async fn convert_item(
    converter: &RetryingConverter,
    item: &BatchItem,
) -> Result<ConvertReport, ConversionError> {
    let name = item.source.name();
    let io_err = |e: std::io::Error| ConversionError::local_io(name.clone(), 0, e);

    let dir = item
        .destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await.map_err(io_err)?;

    let staging = tempfile::Builder::new()
        .prefix(".")
        .suffix(".part")
        .tempfile_in(dir)
        .map_err(io_err)?;
    // `part_path` deletes the file when dropped on any early return.
    let (file, part_path) = staging.into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let report = converter
        .convert(
            item.source.as_ref(),
            &item.source_format,
            &item.target_format,
            &mut file,
        )
        .await?;

    let attempts = report.attempts;
    let io_err = |e: std::io::Error| ConversionError::local_io(name.clone(), attempts, e);
    file.sync_all().await.map_err(io_err)?;
    drop(file);
    part_path
        .persist(&item.destination)
        .map_err(|e| io_err(e.error))?;
    Ok(report)
}
