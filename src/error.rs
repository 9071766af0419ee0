//! Error types and the logging hook (spec.md §7).
//!
//! `QueryError` is the single error type crossing every public boundary:
//! query functions, mutation functions, lifecycle callbacks and `select`
//! all report into it. Kept and generalized from the teacher's
//! `src/retry/mod.rs`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by queries, mutations and the cache itself.
#[derive(Clone, Debug, Error)]
pub enum QueryError {
    #[error("network error: {message}")]
    Network { message: String },

    #[error("request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("http {status}: {message}")]
    Http {
        status: u16,
        message: String,
        body: Option<String>,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("request was cancelled")]
    Cancelled,

    /// `CancellationRevert` (spec.md §7): the cache rolled the query back to
    /// its pre-fetch snapshot. Not normally surfaced to `select`/observers;
    /// kept as a variant so `Retryer::cancel` has something to resolve with.
    #[error("request was cancelled and state reverted")]
    CancelledRevert,

    #[error("rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimit { retry_after_ms: u64 },

    /// `SelectFailure` (spec.md §7): raised by an observer's `select`
    /// closure. Never written into the Query itself.
    #[error("select failed: {0}")]
    Select(String),

    #[error("{message}")]
    Custom {
        message: String,
        code: Option<String>,
    },

    #[error("cache error: {message}")]
    Cache { message: String },
}

impl QueryError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: None,
        }
    }

    pub fn http_with_body(status: u16, message: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            body: Some(body.into()),
        }
    }

    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Timeout { timeout_ms }
    }

    pub fn custom(message: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
            code: None,
        }
    }

    pub fn custom_with_code(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::Custom {
            message: message.into(),
            code: Some(code.into()),
        }
    }

    /// Whether a `Retryer` should attempt this error again. Cancellation and
    /// shape errors (serialization, select) are never retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            QueryError::Network { .. } => true,
            QueryError::Timeout { .. } => true,
            QueryError::Http { status, .. } => *status >= 500,
            QueryError::RateLimit { .. } => true,
            QueryError::Cancelled | QueryError::CancelledRevert => false,
            QueryError::Serialization(_) | QueryError::Deserialization(_) => false,
            QueryError::Select(_) => false,
            QueryError::Custom { .. } => false,
            QueryError::Cache { .. } => false,
        }
    }

    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        match self {
            QueryError::RateLimit { retry_after_ms } => Some(Duration::from_millis(*retry_after_ms)),
            QueryError::Http { status, .. } if *status == 429 => Some(Duration::from_secs(60)),
            QueryError::Network { .. } => Some(Duration::from_millis(1000)),
            QueryError::Timeout { .. } => Some(Duration::from_millis(2000)),
            _ => None,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            QueryError::Network { .. } => ErrorSeverity::Warning,
            QueryError::Timeout { .. } => ErrorSeverity::Warning,
            QueryError::Http { status, .. } => match *status {
                400..=499 => ErrorSeverity::Info,
                500..=599 => ErrorSeverity::Error,
                _ => ErrorSeverity::Warning,
            },
            QueryError::RateLimit { .. } => ErrorSeverity::Warning,
            QueryError::Cancelled | QueryError::CancelledRevert => ErrorSeverity::Info,
            QueryError::Serialization(_) | QueryError::Deserialization(_) => ErrorSeverity::Error,
            QueryError::Select(_) => ErrorSeverity::Error,
            QueryError::Custom { .. } => ErrorSeverity::Warning,
            QueryError::Cache { .. } => ErrorSeverity::Warning,
        }
    }
}

/// Error severity levels, used only for the logger hook below.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// The single reporting hook named in spec.md §7: "a single `logger` hook
/// (defaulting to the standard error stream) emits one record per terminal
/// failure that is not observed; consumers may install a replacement."
pub trait Logger: Send + Sync {
    fn log(&self, record: LogRecord<'_>);
}

/// One record passed to a [`Logger`].
pub struct LogRecord<'a> {
    pub severity: ErrorSeverity,
    pub scope: &'a str,
    pub error: &'a QueryError,
}

impl fmt::Display for LogRecord<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.severity, self.scope, self.error)
    }
}

/// Default logger: writes one line to stderr, matching spec.md §7's default.
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, record: LogRecord<'_>) {
        eprintln!("{record}");
    }
}

pub fn default_logger() -> Arc<dyn Logger> {
    Arc::new(StderrLogger)
}
