//! Batch entry points.
//!
//! [`convert_directory`] is what the `office2pdf` binary runs: scan a source
//! directory, plan one destination per input, and push everything through a
//! [`BatchDispatcher`]. [`convert_files`] does the same for an explicit list
//! of files.

use crate::batch::{BatchDispatcher, BatchItem};
use crate::config::BatchConfig;
use crate::discover::{discover_inputs, plan_outputs};
use crate::error::ConversionError;
use crate::output::BatchSummary;
use crate::pipeline::attempt::TimedAttempt;
use crate::pipeline::retry::RetryingConverter;
use crate::service::ConversionService;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Convert every matching file directly inside `dir`.
///
/// # Returns
/// `Ok(BatchSummary)` once every item reached a terminal outcome, even if
/// some of them failed (check `summary.all_succeeded()`).
///
/// # Errors
/// Returns `Err(ConversionError)` only for fatal errors:
/// - invalid configuration
/// - `dir` cannot be listed
/// - the output directory cannot be created
pub async fn convert_directory(
    dir: impl AsRef<Path>,
    config: &BatchConfig,
    service: Arc<dyn ConversionService>,
) -> Result<BatchSummary, ConversionError> {
    let dir = dir.as_ref();
    config.validate()?;
    info!("Scanning '{}' for {:?}", dir.display(), config.extensions);

    let inputs = discover_inputs(dir, &config.extensions)
        .await
        .map_err(|e| ConversionError::local_io(dir.display().to_string(), 0, e))?;

    convert_files(inputs, config, service).await
}

/// Convert an explicit list of files into `config.output_dir`.
pub async fn convert_files(
    inputs: Vec<PathBuf>,
    config: &BatchConfig,
    service: Arc<dyn ConversionService>,
) -> Result<BatchSummary, ConversionError> {
    let total_start = Instant::now();
    config.validate()?;

    let out_dir = &config.output_dir;
    tokio::fs::create_dir_all(out_dir)
        .await
        .map_err(|e| ConversionError::local_io(out_dir.display().to_string(), 0, e))?;

    let destinations = plan_outputs(out_dir, &inputs, &config.target_format);
    let items: Vec<BatchItem> = inputs
        .into_iter()
        .zip(destinations)
        .map(|(input, destination)| {
            BatchItem::from_file(input, destination, config.target_format.clone())
        })
        .collect();
    debug!("Planned {} items into '{}'", items.len(), out_dir.display());

    let converter = Arc::new(build_converter(config, service)?);
    let dispatcher = BatchDispatcher::new(config.threads_count)?
        .with_progress(config.progress_callback.clone());
    let summary = dispatcher.run(items, converter).await;

    info!(
        "{} in {}ms",
        summary,
        total_start.elapsed().as_millis()
    );
    Ok(summary)
}

/// Assemble the per-item conversion stack described by `config`.
pub fn build_converter(
    config: &BatchConfig,
    service: Arc<dyn ConversionService>,
) -> Result<RetryingConverter, ConversionError> {
    config.validate()?;
    let params = config.connection_params()?;
    debug!("Conversion service at {}", params);

    let attempt = TimedAttempt::new(
        service,
        params,
        config.timeout,
        config.effective_attempt_slots(),
    )
    .with_cancel_grace(config.cancel_grace);
    Ok(RetryingConverter::new(attempt, config.retry_policy()))
}

/// Synchronous wrapper around [`convert_directory`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_directory_sync(
    dir: impl AsRef<Path>,
    config: &BatchConfig,
    service: Arc<dyn ConversionService>,
) -> Result<BatchSummary, ConversionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ConversionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert_directory(dir, config, service))
}
