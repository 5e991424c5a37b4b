//! Configuration types for batch document conversion.
//!
//! All batch behaviour is controlled through [`BatchConfig`], built via its
//! [`BatchConfigBuilder`]. The builder never clamps: a zero thread count or
//! attempt budget is a mistake in the deployment, so [`BatchConfigBuilder::build`]
//! rejects it with [`ConversionError::InvalidConfig`] instead of guessing.
//!
//! [`ConnectionParams`] and [`RetryPolicy`] are the immutable slices of the
//! config that the conversion layers share across concurrent attempts.

use crate::error::ConversionError;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Host/port pair identifying the external conversion service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    host: String,
    port: u16,
}

impl ConnectionParams {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ConversionError> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(ConversionError::InvalidConfig(
                "host must not be empty".into(),
            ));
        }
        if port == 0 {
            return Err(ConversionError::InvalidConfig(
                "port must be between 1 and 65535".into(),
            ));
        }
        Ok(Self { host, port })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "host='{}', port={}", self.host, self.port)
    }
}

/// Attempt budget and per-attempt timeout for one item.
///
/// An item may take up to `max_attempts × timeout` (plus back-off) in the
/// worst case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    timeout: Duration,
    backoff: Duration,
}

impl RetryPolicy {
    /// Validate and build a policy with no back-off between attempts.
    pub fn new(max_attempts: u32, timeout: Duration) -> Result<Self, ConversionError> {
        if max_attempts < 1 {
            return Err(ConversionError::InvalidConfig(format!(
                "conversion_attempts must be 1 or more, but was {max_attempts}"
            )));
        }
        if timeout.is_zero() {
            return Err(ConversionError::InvalidConfig(
                "timeout must be greater than zero".into(),
            ));
        }
        Ok(Self {
            max_attempts,
            timeout,
            backoff: Duration::ZERO,
        })
    }

    /// Base delay before the second attempt; doubles for each later one.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Delay to wait before attempt number `attempt` (1-indexed).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.backoff.is_zero() {
            return Duration::ZERO;
        }
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(2)))
    }
}

/// Configuration for a batch conversion run.
///
/// Built via [`BatchConfig::builder()`] or using [`BatchConfig::default()`].
///
/// # Example
/// ```rust
/// use office2pdf::BatchConfig;
///
/// let config = BatchConfig::builder()
///     .host("127.0.0.1")
///     .port(2003)
///     .timeout_secs(30)
///     .conversion_attempts(3)
///     .threads_count(4)
///     .build()
///     .unwrap();
/// assert_eq!(config.retry_policy().max_attempts(), 3);
/// ```
#[derive(Clone)]
pub struct BatchConfig {
    /// Host of the conversion service. Default: `127.0.0.1`.
    pub host: String,

    /// Port of the conversion service. Default: 2003 (unoserver's default).
    pub port: u16,

    /// Per-attempt timeout. Default: 60 s.
    ///
    /// Applies to each attempt separately, never to the whole item.
    pub timeout: Duration,

    /// Maximum attempts per item, including the first. Default: 3.
    pub conversion_attempts: u32,

    /// Width of the outer batch pool: items converted concurrently. Default: 4.
    pub threads_count: usize,

    /// Width of the inner per-attempt budget. Default: `None`, meaning the
    /// same width as `threads_count`.
    ///
    /// Kept separate from `threads_count` because it only exists to make a
    /// blocking collaborator call preemptible; it is not a throughput knob.
    pub attempt_slots: Option<usize>,

    /// How long a timed-out attempt waits for its interrupted call to drain
    /// before giving up on it. Default: 2 s.
    pub cancel_grace: Duration,

    /// Base back-off between attempts, doubled each time. Default: 0.
    pub retry_backoff: Duration,

    /// Extension of the produced documents. Default: `pdf`.
    pub target_format: String,

    /// Input extensions picked up from the source directory.
    /// Default: `xls`, `xlsx`, `doc`, `docx`.
    pub extensions: Vec<String>,

    /// Directory receiving converted documents. Default: `./out`.
    pub output_dir: PathBuf,

    /// Receives per-item progress events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 2003,
            timeout: Duration::from_secs(60),
            conversion_attempts: 3,
            threads_count: 4,
            attempt_slots: None,
            cancel_grace: Duration::from_secs(2),
            retry_backoff: Duration::ZERO,
            target_format: "pdf".to_string(),
            extensions: ["xls", "xlsx", "doc", "docx"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            output_dir: PathBuf::from("./out"),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for BatchConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("timeout", &self.timeout)
            .field("conversion_attempts", &self.conversion_attempts)
            .field("threads_count", &self.threads_count)
            .field("attempt_slots", &self.attempt_slots)
            .field("cancel_grace", &self.cancel_grace)
            .field("retry_backoff", &self.retry_backoff)
            .field("target_format", &self.target_format)
            .field("extensions", &self.extensions)
            .field("output_dir", &self.output_dir)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl BatchConfig {
    /// Create a new builder for `BatchConfig`.
    pub fn builder() -> BatchConfigBuilder {
        BatchConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn connection_params(&self) -> Result<ConnectionParams, ConversionError> {
        ConnectionParams::new(self.host.clone(), self.port)
    }

    /// Retry policy derived from this config.
    ///
    /// Assumes the config came out of [`BatchConfigBuilder::build`]; run
    /// [`BatchConfig::validate`] first on a hand-assembled one.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.conversion_attempts.max(1),
            timeout: self.timeout,
            backoff: self.retry_backoff,
        }
    }

    /// Effective width of the inner attempt budget.
    pub fn effective_attempt_slots(&self) -> usize {
        self.attempt_slots.unwrap_or(self.threads_count)
    }

    /// Re-run the builder's checks; used for configs assembled by hand.
    pub fn validate(&self) -> Result<(), ConversionError> {
        if self.threads_count < 1 {
            return Err(ConversionError::InvalidConfig(format!(
                "threads_count must be 1 or more, but was {}",
                self.threads_count
            )));
        }
        if let Some(0) = self.attempt_slots {
            return Err(ConversionError::InvalidConfig(
                "attempt_slots must be 1 or more, but was 0".into(),
            ));
        }
        if self.target_format.trim().is_empty() {
            return Err(ConversionError::InvalidConfig(
                "target_format must not be empty".into(),
            ));
        }
        if self.extensions.is_empty() {
            return Err(ConversionError::InvalidConfig(
                "at least one input extension is required".into(),
            ));
        }
        RetryPolicy::new(self.conversion_attempts, self.timeout)?;
        self.connection_params()?;
        Ok(())
    }
}

/// Builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    config: BatchConfig,
}

impl BatchConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout = Duration::from_secs(secs);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn conversion_attempts(mut self, n: u32) -> Self {
        self.config.conversion_attempts = n;
        self
    }

    pub fn threads_count(mut self, n: usize) -> Self {
        self.config.threads_count = n;
        self
    }

    pub fn attempt_slots(mut self, n: usize) -> Self {
        self.config.attempt_slots = Some(n);
        self
    }

    pub fn cancel_grace(mut self, grace: Duration) -> Self {
        self.config.cancel_grace = grace;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff = Duration::from_millis(ms);
        self
    }

    pub fn target_format(mut self, ext: impl Into<String>) -> Self {
        self.config.target_format = ext.into();
        self
    }

    pub fn extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<BatchConfig, ConversionError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
