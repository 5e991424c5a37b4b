//! Error types for the office2pdf library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`ServiceError`]: raised by the **conversion collaborator** for a single
//!   call (could not connect, conversion failed, call interrupted). The retry
//!   loop absorbs these until the attempt budget is exhausted.
//!
//! * [`ConversionError`]: what a caller of the library sees: a fatal
//!   configuration problem, or the terminal outcome of one item after its
//!   attempt budget ran out (or after a local I/O fault, which is never
//!   retried).
//!
//! The batch dispatcher catches every [`ConversionError`] at the item
//! boundary, so one bad file never takes its siblings down with it.

use std::time::Duration;
use thiserror::Error;

/// Failure reported by the external conversion collaborator for one call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The conversion service could not be reached.
    #[error("cannot connect to conversion service: {0}")]
    Connection(String),

    /// The service was reachable but the conversion itself failed
    /// (unsupported format, corrupt input, service-internal fault).
    #[error("conversion failed: {0}")]
    Generation(String),

    /// The call was interrupted from another thread.
    #[error("conversion call interrupted")]
    Interrupted,
}

/// All errors returned by the office2pdf library.
#[derive(Debug, Error)]
pub enum ConversionError {
    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder or policy validation failed. Fatal at startup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Item errors ───────────────────────────────────────────────────────
    /// The conversion service stayed unreachable for every attempt.
    #[error("'{item}' wasn't converted after {attempts} attempts: {cause}")]
    ConnectionFailed {
        item: String,
        attempts: u32,
        cause: ServiceError,
    },

    /// The service kept failing to convert the document.
    #[error("'{item}' wasn't converted after {attempts} attempts: {cause}")]
    GenerationFailed {
        item: String,
        attempts: u32,
        cause: ServiceError,
    },

    /// The last attempt exceeded its time budget.
    #[error("'{item}' wasn't converted after {attempts} attempts: last attempt timed out after {timeout:?}")]
    TimedOut {
        item: String,
        attempts: u32,
        timeout: Duration,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading the local input or writing the local output failed.
    /// Never retried. `attempts` counts the collaborator calls already made
    /// for the item when the fault surfaced.
    #[error("Local I/O failure on '{item}' after {attempts} attempts: {source}")]
    LocalIo {
        item: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. an item task panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConversionError {
    pub(crate) fn local_io(
        item: impl Into<String>,
        attempts: u32,
        source: std::io::Error,
    ) -> Self {
        Self::LocalIo {
            item: item.into(),
            attempts,
            source,
        }
    }

    /// Number of attempts consumed before this error surfaced, if it is an
    /// item-level error that went through the retry loop.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::ConnectionFailed { attempts, .. }
            | Self::GenerationFailed { attempts, .. }
            | Self::TimedOut { attempts, .. }
            | Self::LocalIo { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
