//! Job state change notifications.
//!
//! Publishing is fire-and-forget: failures are logged and counted, never
//! returned to the pipeline.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::observability::metrics;
use crate::queue::SourceRef;

/// Event published when a job reaches a reportable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStateChange {
    pub job_id: String,
    pub status: String,
    pub source: SourceRef,
    /// Result location or failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, event: &JobStateChange) -> PipelineResult<()>;
}

/// Publish and swallow failures.
pub async fn publish_best_effort(notifier: &dyn Notifier, event: &JobStateChange) {
    if let Err(e) = notifier.publish(event).await {
        metrics::record_notification_failure();
        tracing::warn!(job_id = %event.job_id, status = %event.status, error = %e, "Failed to publish job state change");
    }
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn publish(&self, event: &JobStateChange) -> PipelineResult<()> {
        tracing::info!(
            job_id = %event.job_id,
            status = %event.status,
            source = %event.source,
            "Job state changed"
        );
        Ok(())
    }
}

/// Notifier that POSTs each event as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> PipelineResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn publish(&self, event: &JobStateChange) -> PipelineResult<()> {
        let response = self
            .client
            .post(&self.url)
            .json(event)
            .send()
            .await
            .map_err(|e| PipelineError::TransientUpstream(format!("webhook: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::TransientUpstream(format!(
                "webhook returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
