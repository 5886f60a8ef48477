//! Job dispatcher.
//!
//! # Data Flow
//! ```text
//! DocumentRef + Priority
//!     → circuit breaker admit?  ── no ──▶ Unavailable (upstream untouched)
//!     → start_job (per-call timeout)
//!         ok   → record success → enqueue JobDescriptor on priority lane → job_id
//!         err  → record failure
//!                  non-retryable       → return error
//!                  attempts exhausted  → DispatchFailed
//!                  otherwise           → sleep(backoff + jitter), try again
//! ```
//!
//! # Design Decisions
//! - Retry policy is read once per dispatch from the live config store
//! - The breaker is re-consulted before every attempt, so a circuit that
//!   opens mid-retry stops the loop with `Unavailable`
//! - The whole dispatch runs under `total_timeout_secs`
//! - Once upstream has accepted a job, recording and enqueueing run on a
//!   spawned task, so a cancelled dispatch still enqueues the job exactly
//!   once

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::store::{load_retry_config, ConfigStore};
use crate::config::DispatchConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::observability::metrics;
use crate::queue::{JobDescriptor, Priority, SourceRef, WorkQueue};
use crate::resilience::backoff::next_delay;
use crate::resilience::retries::{has_attempts_left, is_retryable};
use crate::resilience::timeouts::with_timeout;
use crate::resilience::Breaker;
use crate::upstream::ExtractionApi;

/// A document ready for extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub source: SourceRef,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

impl DocumentRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            source: SourceRef::new(container, key),
            size_bytes: None,
        }
    }
}

/// Submits documents upstream and enqueues the resulting job handles.
#[derive(Clone)]
pub struct JobDispatcher {
    api: Arc<dyn ExtractionApi>,
    breaker: Arc<dyn Breaker>,
    config_store: Arc<dyn ConfigStore>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
    config: DispatchConfig,
}

impl JobDispatcher {
    pub fn new(
        api: Arc<dyn ExtractionApi>,
        breaker: Arc<dyn Breaker>,
        config_store: Arc<dyn ConfigStore>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            api,
            breaker,
            config_store,
            queue,
            clock,
            config,
        }
    }

    pub fn dependency(&self) -> &str {
        &self.config.dependency
    }

    /// Submit `doc` and enqueue its job on the `priority` lane.
    pub async fn dispatch(&self, doc: &DocumentRef, priority: Priority) -> PipelineResult<String> {
        let total = Duration::from_secs(self.config.total_timeout_secs);
        match tokio::time::timeout(total, self.dispatch_with_retries(doc, priority)).await {
            Ok(result) => result,
            Err(_) => {
                metrics::record_dispatch("failed");
                tracing::error!(source = %doc.source, "Dispatch exceeded total timeout");
                Err(PipelineError::Timeout(total.as_millis() as u64))
            }
        }
    }

    async fn dispatch_with_retries(&self, doc: &DocumentRef, priority: Priority) -> PipelineResult<String> {
        let dependency = self.config.dependency.as_str();
        let retry_config = load_retry_config(self.config_store.as_ref(), dependency).await;
        let call_timeout = Duration::from_secs(self.config.call_timeout_secs);
        let mut attempt: u32 = 0;

        loop {
            let admission = self.breaker.admit(dependency).await;
            if !admission.is_allowed() {
                metrics::record_dispatch("unavailable");
                tracing::info!(
                    dependency = %dependency,
                    source = %doc.source,
                    attempt,
                    "Circuit open, not calling upstream"
                );
                return Err(PipelineError::Unavailable(dependency.to_string()));
            }

            match with_timeout(call_timeout, self.api.start_job(&doc.source)).await {
                Ok(job_id) => {
                    let this = self.clone();
                    let doc = doc.clone();
                    let accepted = tokio::spawn(async move {
                        let dependency = this.config.dependency.as_str();
                        this.breaker.record_success(dependency, admission).await;
                        this.enqueue(&doc, priority, job_id, attempt).await
                    });
                    return accepted.await.map_err(|e| {
                        PipelineError::Queue(format!("enqueue task failed: {e}"))
                    })?;
                }
                Err(err) => {
                    self.breaker.record_failure(dependency, admission).await;

                    if !is_retryable(&retry_config, &err) {
                        metrics::record_dispatch("rejected");
                        tracing::warn!(
                            source = %doc.source,
                            kind = err.kind().as_str(),
                            error = %err,
                            "Upstream rejected document"
                        );
                        return Err(err);
                    }

                    if !has_attempts_left(&retry_config, attempt) {
                        metrics::record_dispatch("failed");
                        tracing::error!(
                            source = %doc.source,
                            attempts = attempt + 1,
                            error = %err,
                            "Dispatch attempts exhausted"
                        );
                        return Err(PipelineError::DispatchFailed {
                            attempts: attempt + 1,
                            last: Box::new(err),
                        });
                    }

                    let delay = next_delay(&retry_config, attempt);
                    metrics::record_dispatch_retry(err.kind());
                    tracing::info!(
                        source = %doc.source,
                        attempt,
                        delay = ?delay,
                        kind = err.kind().as_str(),
                        "Retrying upstream submission"
                    );
                    self.clock.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn enqueue(
        &self,
        doc: &DocumentRef,
        priority: Priority,
        job_id: String,
        retries: u32,
    ) -> PipelineResult<String> {
        let descriptor = JobDescriptor {
            job_id: job_id.clone(),
            source_ref: doc.source.clone(),
            priority,
            submitted_at: self.clock.now_millis(),
            retry_count: retries,
        };

        if let Err(e) = self.queue.send(descriptor, priority).await {
            metrics::record_dispatch("failed");
            tracing::error!(job_id = %job_id, error = %e, "Job started upstream but could not be enqueued");
            return Err(e);
        }

        metrics::record_dispatch("submitted");
        tracing::info!(job_id = %job_id, source = %doc.source, priority = %priority, "Job submitted");
        Ok(job_id)
    }
}
