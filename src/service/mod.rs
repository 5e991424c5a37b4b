//! The external conversion collaborator.
//!
//! The orchestration layer treats "convert bytes of format X into bytes of
//! format Y" as an opaque, fallible, **blocking** operation behind two
//! traits:
//!
//! * [`ConversionService`]: shared, read-only factory; `connect` opens one
//!   connection per attempt.
//! * [`ServiceConnection`]: the per-attempt session (`convert`, then
//!   `disconnect`). Its [`ServiceConnection::interrupter`] hands out a handle
//!   that another thread can use to force a hung `convert` to return.
//!
//! [`unoconvert::UnoconvertService`] is the production implementation.

pub mod unoconvert;

use crate::cancel::Interrupt;
use crate::config::ConnectionParams;
use crate::error::ServiceError;
use std::io::{Read, Write};

pub use unoconvert::UnoconvertService;

/// Factory for per-attempt connections to the conversion service.
///
/// `connect` must return [`ServiceError::Connection`] when the service is
/// unreachable. It may block.
pub trait ConversionService: Send + Sync {
    fn connect(&self, params: &ConnectionParams)
        -> Result<Box<dyn ServiceConnection>, ServiceError>;
}

/// One open connection to the conversion service.
pub trait ServiceConnection: Send {
    /// Handle that interrupts an in-flight [`ServiceConnection::convert`]
    /// from another thread. Interrupting an idle connection is harmless.
    fn interrupter(&self) -> Box<dyn Interrupt>;

    /// Convert everything readable from `input` (format `source_ext`) into
    /// `output` (format `target_ext`). Blocking; may hang without bound
    /// until interrupted.
    fn convert(
        &mut self,
        input: &mut (dyn Read + Send),
        source_ext: &str,
        output: &mut dyn Write,
        target_ext: &str,
    ) -> Result<(), ServiceError>;

    /// Release the connection. Called exactly once on every exit path.
    fn disconnect(&mut self);
}
