//! Retry classification.
//!
//! # Responsibilities
//! - Decide whether an error kind may be retried under a `RetryConfig`
//! - Decide whether another attempt fits in the attempt budget
//!
//! Non-retryable kinds win when a kind appears in both sets.

use crate::config::RetryConfig;
use crate::error::{ErrorKind, PipelineError};

pub fn is_retryable_kind(cfg: &RetryConfig, kind: ErrorKind) -> bool {
    cfg.retryable_errors.contains(&kind) && !cfg.non_retryable_errors.contains(&kind)
}

pub fn is_retryable(cfg: &RetryConfig, err: &PipelineError) -> bool {
    is_retryable_kind(cfg, err.kind())
}

/// True when the zero-based `attempt` that just failed leaves room for another.
pub fn has_attempts_left(cfg: &RetryConfig, attempt: u32) -> bool {
    attempt.saturating_add(1) < cfg.max_attempts
}
