//! Result types of a batch run.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Terminal outcome of one item.
#[derive(Debug, Clone, Serialize)]
pub struct ItemResult {
    /// Input identity (file name).
    pub name: String,
    /// Where the converted document was (or would have been) written.
    pub destination: PathBuf,
    /// Attempts consumed; 0 when the item failed before its first attempt.
    pub attempts: u32,
    pub bytes_written: usize,
    pub duration_ms: u64,
    /// `None` on success.
    pub error: Option<String>,
}

impl ItemResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregate of a batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub total: usize,
    pub duration_ms: u64,
    /// In completion order.
    pub items: Vec<ItemResult>,
}

impl BatchSummary {
    pub fn failed(&self) -> usize {
        self.total.saturating_sub(self.succeeded)
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total
    }

    /// The failed items.
    pub fn failures(&self) -> impl Iterator<Item = &ItemResult> {
        self.items.iter().filter(|i| !i.is_success())
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Converted successfully {} files from {}",
            self.succeeded, self.total
        )
    }
}
