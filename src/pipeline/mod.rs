//! Per-item conversion layers.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ retry ──▶ attempt ──▶ collaborator
//! (source)  (budget,   (timeout,    (blocking
//!            staging)   cancel)      connect/convert)
//! ```
//!
//! 1. [`input`]: re-openable sources; every attempt reads from byte 0
//! 2. [`retry`]: attempt budget and copy-on-success staging; the only
//!    layer that touches the caller's destination
//! 3. [`attempt`]: one collaborator call on a blocking thread, raced
//!    against the timeout and interrupted when it loses

pub mod attempt;
pub mod input;
pub mod retry;
