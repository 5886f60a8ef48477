//! Error taxonomy shared by every pipeline component.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification used by the retry policy and by metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Throttling,
    TransientUpstream,
    Validation,
    UnsupportedInput,
    Timeout,
    Unavailable,
    DispatchFailed,
    Storage,
    Queue,
    Config,
    UnexpectedStatus,
}

impl ErrorKind {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Throttling => "throttling",
            ErrorKind::TransientUpstream => "transient_upstream",
            ErrorKind::Validation => "validation",
            ErrorKind::UnsupportedInput => "unsupported_input",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DispatchFailed => "dispatch_failed",
            ErrorKind::Storage => "storage",
            ErrorKind::Queue => "queue",
            ErrorKind::Config => "config",
            ErrorKind::UnexpectedStatus => "unexpected_status",
        }
    }
}

/// Errors surfaced by dispatch, consumption and status polling.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Upstream asked us to slow down.
    #[error("upstream throttled request: {0}")]
    Throttling(String),

    /// Upstream failed in a way that may succeed on a later attempt.
    #[error("transient upstream error: {0}")]
    TransientUpstream(String),

    /// Upstream rejected the request as invalid.
    #[error("validation error: {0}")]
    Validation(String),

    /// Document type or size is not accepted.
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    /// Operation exceeded its deadline.
    #[error("operation timed out after {0} ms")]
    Timeout(u64),

    /// Circuit breaker is open; the upstream was not called.
    #[error("dependency '{0}' is unavailable (circuit open)")]
    Unavailable(String),

    /// Retry attempts exhausted.
    #[error("dispatch failed after {attempts} attempts: {last}")]
    DispatchFailed {
        attempts: u32,
        #[source]
        last: Box<PipelineError>,
    },

    /// Object store read or write failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Queue transport failed.
    #[error("queue error: {0}")]
    Queue(String),

    /// Runtime configuration could not be read or decoded.
    #[error("config error: {0}")]
    Config(String),

    /// Upstream reported a status this pipeline does not understand.
    #[error("unexpected job status '{0}'")]
    UnexpectedStatus(String),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Throttling(_) => ErrorKind::Throttling,
            PipelineError::TransientUpstream(_) => ErrorKind::TransientUpstream,
            PipelineError::Validation(_) => ErrorKind::Validation,
            PipelineError::UnsupportedInput(_) => ErrorKind::UnsupportedInput,
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::Unavailable(_) => ErrorKind::Unavailable,
            PipelineError::DispatchFailed { .. } => ErrorKind::DispatchFailed,
            PipelineError::Storage(_) => ErrorKind::Storage,
            PipelineError::Queue(_) => ErrorKind::Queue,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::UnexpectedStatus(_) => ErrorKind::UnexpectedStatus,
        }
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
