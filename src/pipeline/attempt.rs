//! One timeout-bounded, cancellable conversion attempt.
//!
//! ## Why a blocking thread plus a cancel token?
//!
//! The collaborator call is blocking and may hang forever. Running it on a
//! `spawn_blocking` thread keeps the async worker free, and racing the join
//! handle against [`tokio::time::timeout`] bounds how long the caller waits.
//! Stopping the wait is not enough, though: a thread stuck in a socket read
//! keeps its attempt slot, and repeated timeouts would slowly drain the pool.
//! On expiry the attempt therefore fires the connection's interrupter
//! through a [`CancelToken`], which makes the blocked call return so the
//! thread exits, disconnects and gives its slot back.
//!
//! ## Slot accounting
//!
//! The inner semaphore permit is moved *into* the blocking closure and is
//! released only when that closure finishes. [`TimedAttempt::available_slots`]
//! therefore reflects threads that are really still running, not attempts
//! the caller has merely given up on.

use crate::cancel::CancelToken;
use crate::config::ConnectionParams;
use crate::error::ServiceError;
use crate::pipeline::input::InputTap;
use crate::service::{ConversionService, ServiceConnection};
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Input of a single attempt. Consumed by that attempt; never shared.
pub struct ConversionRequest {
    /// Identity used in logs.
    pub name: String,
    /// Reader positioned at the first byte of the document.
    pub input: Box<dyn Read + Send>,
    pub source_format: String,
    pub target_format: String,
}

impl std::fmt::Debug for ConversionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversionRequest")
            .field("name", &self.name)
            .field("source_format", &self.source_format)
            .field("target_format", &self.target_format)
            .finish_non_exhaustive()
    }
}

/// Private output accumulator of one attempt.
///
/// Nothing outside the attempt sees these bytes until the attempt succeeded
/// and the retry loop flushes them to the real destination.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagedBuffer(Vec<u8>);

impl StagedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Write for StagedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Result of one attempt.
#[derive(Debug)]
pub enum ConversionOutcome {
    /// The call completed in time; carries the fully converted bytes.
    Success(StagedBuffer),
    /// The service was reached but could not convert the document.
    GenerationFailed(ServiceError),
    /// The service could not be reached.
    ConnectionFailed(ServiceError),
    /// The timeout elapsed first; the call was interrupted.
    TimedOut,
}

enum WorkerFault {
    Service(ServiceError),
    Input(io::Error),
}

type Worker = JoinHandle<Result<StagedBuffer, WorkerFault>>;

/// Runs collaborator calls on blocking threads under a per-attempt timeout.
pub struct TimedAttempt {
    service: Arc<dyn ConversionService>,
    params: ConnectionParams,
    timeout: Duration,
    cancel_grace: Duration,
    slots: Arc<Semaphore>,
    slot_count: usize,
}

impl TimedAttempt {
    /// `slots` bounds how many collaborator calls may be in flight at once.
    pub fn new(
        service: Arc<dyn ConversionService>,
        params: ConnectionParams,
        timeout: Duration,
        slots: usize,
    ) -> Self {
        let slot_count = slots.max(1);
        Self {
            service,
            params,
            timeout,
            cancel_grace: Duration::from_secs(2),
            slots: Arc::new(Semaphore::new(slot_count)),
            slot_count,
        }
    }

    /// How long to wait for an interrupted call to exit after a timeout.
    pub fn with_cancel_grace(mut self, grace: Duration) -> Self {
        self.cancel_grace = grace;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Attempt slots not held by a running collaborator call.
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }

    pub fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Run one attempt.
    ///
    /// `Err` is reserved for failures reading the local input; those are not
    /// the service's fault and must not be retried.
    pub async fn attempt(
        &self,
        request: ConversionRequest,
        attempt: u32,
    ) -> io::Result<ConversionOutcome> {
        let name = request.name.clone();
        let permit = match Arc::clone(&self.slots).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => {
                return Ok(ConversionOutcome::GenerationFailed(
                    ServiceError::Generation("attempt slots closed".into()),
                ))
            }
        };

        let token = CancelToken::new();
        let worker_token = token.clone();
        let service = Arc::clone(&self.service);
        let params = self.params.clone();
        let started = Instant::now();

        let mut worker: Worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            connect_and_convert(service.as_ref(), &params, request, &worker_token)
        });

        match tokio::time::timeout(self.timeout, &mut worker).await {
            Ok(Ok(Ok(staged))) => {
                debug!(
                    "Conversion attempt #{} for '{}' produced {} bytes in {:?}",
                    attempt,
                    name,
                    staged.len(),
                    started.elapsed()
                );
                Ok(ConversionOutcome::Success(staged))
            }
            Ok(Ok(Err(WorkerFault::Input(e)))) => Err(e),
            Ok(Ok(Err(WorkerFault::Service(e @ ServiceError::Connection(_))))) => {
                warn!(
                    "Conversion attempt #{} for '{}' could not connect to {}: {}",
                    attempt, name, self.params, e
                );
                Ok(ConversionOutcome::ConnectionFailed(e))
            }
            Ok(Ok(Err(WorkerFault::Service(e)))) => {
                warn!("Conversion attempt #{} for '{}' failed: {}", attempt, name, e);
                Ok(ConversionOutcome::GenerationFailed(e))
            }
            Ok(Err(join_err)) => {
                warn!(
                    "Conversion attempt #{} for '{}' panicked: {}",
                    attempt, name, join_err
                );
                Ok(ConversionOutcome::GenerationFailed(ServiceError::Generation(
                    format!("conversion call panicked: {join_err}"),
                )))
            }
            Err(_elapsed) => {
                error!(
                    "Conversion attempt #{} for '{}' couldn't be executed within timeout of {:?}",
                    attempt, name, self.timeout
                );
                token.cancel();
                // Stops a worker that never got a thread; a running one
                // needs the interrupt above.
                worker.abort();
                self.await_release(worker, &name, attempt).await;
                Ok(ConversionOutcome::TimedOut)
            }
        }
    }

    async fn await_release(&self, worker: Worker, name: &str, attempt: u32) {
        match tokio::time::timeout(self.cancel_grace, worker).await {
            Ok(_) => debug!(
                "Cancelled attempt #{} for '{}' released its resources",
                attempt, name
            ),
            Err(_) => warn!(
                "Cancelled attempt #{} for '{}' ignored the interrupt for {:?}; \
                 its slot stays busy until the call returns",
                attempt, name, self.cancel_grace
            ),
        }
    }
}

/// Disconnects on drop, so every exit path (including unwinding) closes
/// the connection.
struct ConnectionGuard(Box<dyn ServiceConnection>);

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.0.disconnect();
    }
}

fn connect_and_convert(
    service: &dyn ConversionService,
    params: &ConnectionParams,
    request: ConversionRequest,
    token: &CancelToken,
) -> Result<StagedBuffer, WorkerFault> {
    if token.is_cancelled() {
        return Err(WorkerFault::Service(ServiceError::Interrupted));
    }
    let mut connection = ConnectionGuard(service.connect(params).map_err(WorkerFault::Service)?);
    token.on_cancel(connection.0.interrupter());

    let ConversionRequest {
        input,
        source_format,
        target_format,
        ..
    } = request;
    let mut input = InputTap::new(input);
    let mut staged = StagedBuffer::new();

    let result = connection
        .0
        .convert(&mut input, &source_format, &mut staged, &target_format);

    if let Some(fault) = input.take_fault() {
        return Err(WorkerFault::Input(fault));
    }
    result.map_err(WorkerFault::Service)?;
    Ok(staged)
}
