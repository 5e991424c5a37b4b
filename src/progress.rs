//! Progress-callback trait for per-item batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::BatchConfigBuilder::progress_callback`] to receive
//! events as the dispatcher moves each file through conversion.
//!
//! # Example
//!
//! ```rust
//! use office2pdf::{BatchConfig, BatchProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_item_error(&self, item: &str, _index: usize, _total: usize, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{item}: {error}");
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { failed: AtomicUsize::new(0) });
//!
//! let config = BatchConfig::builder()
//!     .progress_callback(counter as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;
use std::time::Duration;

/// Called by the batch dispatcher as it processes each item.
///
/// Items run concurrently, so every method except `on_batch_start` and
/// `on_batch_complete` may be called from several tasks at once.
/// All methods default to no-ops.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once before any item is submitted.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called when an item gets a pool slot.
    ///
    /// * `index`: 1-indexed position of the item in the batch
    fn on_item_start(&self, item: &str, index: usize, total: usize) {
        let _ = (item, index, total);
    }

    /// Called when an item's destination has been written.
    fn on_item_complete(&self, item: &str, index: usize, total: usize, elapsed: Duration) {
        let _ = (item, index, total, elapsed);
    }

    /// Called when an item reaches a terminal failure.
    fn on_item_error(&self, item: &str, index: usize, total: usize, error: &str) {
        let _ = (item, index, total, error);
    }

    /// Called once after every item reached a terminal outcome.
    fn on_batch_complete(&self, total: usize, success_count: usize) {
        let _ = (total, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::BatchConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
