//! Per-message result processing.

use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::schema::ObjectStoreConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::notify::{publish_best_effort, JobStateChange, Notifier};
use crate::observability::metrics;
use crate::queue::{FailedMessageId, QueueMessage, WorkQueue};
use crate::resilience::timeouts::with_timeout;
use crate::storage::ObjectStore;
use crate::upstream::{text_lines, ExtractionApi, JobStatus, JobStatusPage};

/// What happened to a message that was processed without error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultOutcome {
    /// Text persisted at `key` and the message acked.
    Stored { key: String },
    /// Upstream job terminally failed; message acked.
    Failed,
    /// Job still running; message left for redelivery.
    InProgress,
}

impl ResultOutcome {
    pub fn is_acked(&self) -> bool {
        !matches!(self, ResultOutcome::InProgress)
    }
}

/// Object key for a job's extracted text.
pub fn result_key(prefix: &str, source_key: &str, job_id: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{source_key}/{job_id}.txt")
    } else {
        format!("{prefix}/{source_key}/{job_id}.txt")
    }
}

/// Finalizes extraction jobs delivered through the work queue.
pub struct ResultConsumer {
    api: Arc<dyn ExtractionApi>,
    queue: Arc<dyn WorkQueue>,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    status_calls: Arc<Semaphore>,
    output: ObjectStoreConfig,
    process_timeout: Duration,
}

impl ResultConsumer {
    pub fn new(
        api: Arc<dyn ExtractionApi>,
        queue: Arc<dyn WorkQueue>,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        status_calls: Arc<Semaphore>,
        output: ObjectStoreConfig,
        process_timeout: Duration,
    ) -> Self {
        Self {
            api,
            queue,
            store,
            notifier,
            status_calls,
            output,
            process_timeout,
        }
    }

    /// Process every message of a batch concurrently.
    ///
    /// Returns the IDs of messages that must be redelivered. Those are
    /// nacked; everything else has been acked.
    pub async fn process_batch(&self, messages: &[QueueMessage]) -> Vec<FailedMessageId> {
        let results = join_all(messages.iter().map(|msg| self.process_result(msg))).await;

        let mut failed = Vec::new();
        for (msg, result) in messages.iter().zip(results) {
            let redeliver = match result {
                Ok(outcome) => !outcome.is_acked(),
                Err(e) => {
                    metrics::record_result("error", msg.body.priority);
                    tracing::warn!(
                        message_id = %msg.message_id,
                        job_id = %msg.body.job_id,
                        receive_count = msg.receive_count,
                        kind = e.kind().as_str(),
                        error = %e,
                        "Result processing failed, leaving message for redelivery"
                    );
                    true
                }
            };

            if redeliver {
                if let Err(e) = self.queue.nack(msg).await {
                    tracing::warn!(message_id = %msg.message_id, error = %e, "Failed to release lease");
                }
                failed.push(msg.message_id.clone());
            }
        }
        failed
    }

    /// Route one message by its job's upstream status.
    pub async fn process_result(&self, msg: &QueueMessage) -> PipelineResult<ResultOutcome> {
        with_timeout(self.process_timeout, self.route(msg)).await
    }

    async fn route(&self, msg: &QueueMessage) -> PipelineResult<ResultOutcome> {
        let job = &msg.body;
        let first = self.fetch_page(&job.job_id, None).await?;

        match first.status.clone() {
            JobStatus::Succeeded => {
                let text = self.collect_text(&job.job_id, first).await?;
                let key = result_key(&self.output.output_prefix, &job.source_ref.key, &job.job_id);
                self.store
                    .put(&self.output.output_container, &key, text.into_bytes())
                    .await?;
                self.queue.ack(msg).await?;

                metrics::record_result("succeeded", job.priority);
                tracing::info!(job_id = %job.job_id, key = %key, "Extraction result stored");
                self.notify(msg, JobStatus::Succeeded, Some(format!("{}/{key}", self.output.output_container)))
                    .await;
                Ok(ResultOutcome::Stored { key })
            }
            JobStatus::Failed => {
                self.queue.ack(msg).await?;

                metrics::record_result("failed", job.priority);
                tracing::error!(
                    job_id = %job.job_id,
                    source = %job.source_ref,
                    reason = first.status_message.as_deref().unwrap_or("unknown"),
                    "Extraction job failed upstream"
                );
                self.notify(msg, JobStatus::Failed, first.status_message).await;
                Ok(ResultOutcome::Failed)
            }
            JobStatus::InProgress => {
                metrics::record_result("in_progress", job.priority);
                tracing::info!(
                    job_id = %job.job_id,
                    receive_count = msg.receive_count,
                    "Job still in progress"
                );
                Ok(ResultOutcome::InProgress)
            }
            JobStatus::Other(status) => Err(PipelineError::UnexpectedStatus(status)),
        }
    }

    /// Follow result pages and join every `LINE` block with newlines.
    async fn collect_text(&self, job_id: &str, first: JobStatusPage) -> PipelineResult<String> {
        let mut lines: Vec<String> = text_lines(&first.blocks).map(str::to_owned).collect();
        let mut next_token = first.next_token;

        while let Some(token) = next_token {
            let page = self.fetch_page(job_id, Some(&token)).await?;
            lines.extend(text_lines(&page.blocks).map(str::to_owned));
            next_token = page.next_token;
        }
        Ok(lines.join("\n"))
    }

    async fn fetch_page(&self, job_id: &str, next_token: Option<&str>) -> PipelineResult<JobStatusPage> {
        let _permit = self
            .status_calls
            .acquire()
            .await
            .map_err(|_| PipelineError::Unavailable("status-call limiter closed".to_string()))?;
        self.api.get_status(job_id, next_token).await
    }

    async fn notify(&self, msg: &QueueMessage, status: JobStatus, message: Option<String>) {
        let event = JobStateChange {
            job_id: msg.body.job_id.clone(),
            status: status.as_str().to_string(),
            source: msg.body.source_ref.clone(),
            message,
        };
        publish_best_effort(self.notifier.as_ref(), &event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_key_layout() {
        assert_eq!(
            result_key("text", "scans/invoice.pdf", "job-1"),
            "text/scans/invoice.pdf/job-1.txt"
        );
        assert_eq!(result_key("/text/", "a.png", "j"), "text/a.png/j.txt");
        assert_eq!(result_key("", "a.png", "j"), "a.png/j.txt");
    }

    #[test]
    fn test_only_in_progress_is_unacked() {
        assert!(ResultOutcome::Stored { key: "k".into() }.is_acked());
        assert!(ResultOutcome::Failed.is_acked());
        assert!(!ResultOutcome::InProgress.is_acked());
    }
}
