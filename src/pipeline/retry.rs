//! Bounded retry loop with copy-on-success output staging.
//!
//! ## Retry Strategy
//!
//! The conversion service is unreliable: it can refuse connections, fail a
//! document it converted fine a second ago, or hang. Each attempt re-opens
//! the input from the start and writes into its own
//! [`StagedBuffer`](crate::pipeline::attempt::StagedBuffer); the
//! caller's destination is written exactly once, after an attempt fully
//! succeeded. Failed and timed-out attempts leave nothing behind.
//!
//! Connection failures, generation failures and timeouts all consume one
//! attempt from the budget. Local I/O faults (unreadable input, unwritable
//! destination) are surfaced immediately: retrying cannot fix them.

use crate::config::RetryPolicy;
use crate::error::{ConversionError, ServiceError};
use crate::pipeline::attempt::{ConversionOutcome, ConversionRequest, TimedAttempt};
use crate::pipeline::input::InputSource;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::sleep;
use tracing::{debug, error, warn};

/// What a successful conversion cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertReport {
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Bytes written to the destination.
    pub bytes_written: usize,
}

/// The last failure seen by the retry loop.
enum LastFailure {
    Connection(ServiceError),
    Generation(ServiceError),
    Timeout,
}

/// Wraps [`TimedAttempt`] in the attempt budget of a [`RetryPolicy`].
pub struct RetryingConverter {
    attempt: TimedAttempt,
    policy: RetryPolicy,
}

impl RetryingConverter {
    pub fn new(attempt: TimedAttempt, policy: RetryPolicy) -> Self {
        Self { attempt, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The attempt runner, e.g. to inspect slot availability.
    pub fn attempts(&self) -> &TimedAttempt {
        &self.attempt
    }

    /// Convert `source` from `source_format` to `target_format` into `dest`.
    ///
    /// On a conversion failure `dest` has not been written to. The one
    /// exception is a `LocalIo` error raised while writing `dest` itself:
    /// the write may have stopped partway, leaving `dest` partly written.
    /// Callers that need the destination to stay untouched stage into a
    /// scratch file and rename it on success, as
    /// [`BatchDispatcher`](crate::batch::BatchDispatcher) does.
    pub async fn convert<W>(
        &self,
        source: &dyn InputSource,
        source_format: &str,
        target_format: &str,
        dest: &mut W,
    ) -> Result<ConvertReport, ConversionError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let name = source.name();
        let max = self.policy.max_attempts();
        let mut last = None;

        for attempt in 1..=max {
            let delay = self.policy.delay_before(attempt);
            if !delay.is_zero() {
                debug!("'{}': waiting {:?} before attempt #{}", name, delay, attempt);
                sleep(delay).await;
            }

            // A failed open costs no attempt; the previous ones were used.
            let input = source
                .open()
                .map_err(|e| ConversionError::local_io(name.clone(), attempt - 1, e))?;
            let request = ConversionRequest {
                name: name.clone(),
                input,
                source_format: source_format.to_string(),
                target_format: target_format.to_string(),
            };

            let outcome = self
                .attempt
                .attempt(request, attempt)
                .await
                .map_err(|e| ConversionError::local_io(name.clone(), attempt, e))?;

            last = Some(match outcome {
                ConversionOutcome::Success(staged) => {
                    dest.write_all(staged.as_bytes())
                        .await
                        .map_err(|e| ConversionError::local_io(name.clone(), attempt, e))?;
                    dest.flush()
                        .await
                        .map_err(|e| ConversionError::local_io(name.clone(), attempt, e))?;
                    debug!(
                        "'{}' converted on attempt #{} ({} bytes)",
                        name,
                        attempt,
                        staged.len()
                    );
                    return Ok(ConvertReport {
                        attempts: attempt,
                        bytes_written: staged.len(),
                    });
                }
                ConversionOutcome::ConnectionFailed(cause) => LastFailure::Connection(cause),
                ConversionOutcome::GenerationFailed(cause) => LastFailure::Generation(cause),
                ConversionOutcome::TimedOut => LastFailure::Timeout,
            });

            if attempt < max {
                warn!("'{}': attempt #{}/{} failed, retrying", name, attempt, max);
            }
        }

        error!("File '{}' wasn't converted after {} attempts", name, max);
        // `max >= 1`, so the loop recorded at least one failure.
        Err(match last.unwrap_or(LastFailure::Timeout) {
            LastFailure::Connection(cause) => ConversionError::ConnectionFailed {
                item: name,
                attempts: max,
                cause,
            },
            LastFailure::Generation(cause) => ConversionError::GenerationFailed {
                item: name,
                attempts: max,
                cause,
            },
            LastFailure::Timeout => ConversionError::TimedOut {
                item: name,
                attempts: max,
                timeout: self.attempt.timeout(),
            },
        })
    }
}
