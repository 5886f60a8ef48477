//! Timeout enforcement.
//!
//! Every upstream call runs under a deadline. A timed-out future is
//! dropped, which abandons the call, and the caller sees
//! `PipelineError::Timeout` rather than an upstream error.

use std::future::Future;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};

pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> PipelineResult<T>
where
    F: Future<Output = PipelineResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout(limit.as_millis() as u64)),
    }
}
