//! # office2pdf
//!
//! Batch conversion of office documents (Word, Excel, ...) to PDF through a
//! running LibreOffice `unoserver`.
//!
//! ## Why this crate?
//!
//! A headless LibreOffice is the most faithful office-to-PDF converter
//! around, and also an unreliable one: it refuses connections while
//! restarting, fails documents it converted fine a moment ago, and
//! sometimes hangs forever on a single file. This crate wraps every
//! conversion in a per-attempt timeout that actively interrupts the hung
//! call, a bounded retry loop, and a fixed-width worker pool that isolates
//! one item's failure from the rest of the batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source dir
//!  │
//!  ├─ 1. Discover  top-level files with a convertible extension
//!  ├─ 2. Plan      one destination per input under the output dir
//!  ├─ 3. Dispatch  `threads_count` items in flight (BatchDispatcher)
//!  ├─ 4. Retry     up to `conversion_attempts` per item (RetryingConverter)
//!  ├─ 5. Attempt   one collaborator call under `timeout` (TimedAttempt)
//!  └─ 6. Output    `.part` file renamed into place on success + summary
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use office2pdf::{convert_directory, BatchConfig, FormatRegistry, UnoconvertService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BatchConfig::builder()
//!         .port(2003)
//!         .timeout_secs(30)
//!         .output_dir("out")
//!         .build()?;
//!     let service = Arc::new(UnoconvertService::new(Arc::new(
//!         FormatRegistry::office_defaults(),
//!     )));
//!     let summary = convert_directory("documents", &config, service).await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `office2pdf` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! office2pdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod cancel;
pub mod config;
pub mod convert;
pub mod discover;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod service;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{BatchDispatcher, BatchItem};
pub use cancel::{CancelToken, Interrupt};
pub use config::{BatchConfig, BatchConfigBuilder, ConnectionParams, RetryPolicy};
pub use convert::{build_converter, convert_directory, convert_directory_sync, convert_files};
pub use error::{ConversionError, ServiceError};
pub use format::{DocumentFamily, DocumentFormat, FormatRegistry};
pub use output::{BatchSummary, ItemResult};
pub use pipeline::attempt::{ConversionOutcome, ConversionRequest, StagedBuffer, TimedAttempt};
pub use pipeline::input::{FileSource, InputSource, MemorySource};
pub use pipeline::retry::{ConvertReport, RetryingConverter};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use service::{ConversionService, ServiceConnection, UnoconvertService};
