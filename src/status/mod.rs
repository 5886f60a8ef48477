//! Status tracker.
//!
//! Batch status lookups for dashboards and alerting. Read-only: one
//! `get_status` attempt per job ID, no retries, and a failure for one ID
//! never fails the batch.

use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ErrorKind;
use crate::observability::metrics;
use crate::upstream::ExtractionApi;

/// Status of one job, or why it could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StatusReport {
    Known {
        status: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Error {
        kind: ErrorKind,
        error: String,
    },
}

#[derive(Clone)]
pub struct StatusTracker {
    api: Arc<dyn ExtractionApi>,
}

impl StatusTracker {
    pub fn new(api: Arc<dyn ExtractionApi>) -> Self {
        Self { api }
    }

    /// Look up every job concurrently. Duplicate IDs are queried once.
    pub async fn poll_statuses(&self, job_ids: &[String]) -> HashMap<String, StatusReport> {
        let mut unique: Vec<&String> = job_ids.iter().collect();
        unique.sort();
        unique.dedup();

        let lookups = unique.iter().map(|id| async move {
            let report = match self.api.get_status(id, None).await {
                Ok(page) => {
                    metrics::record_status_poll("ok");
                    StatusReport::Known {
                        status: page.status.as_str().to_string(),
                        message: page.status_message,
                    }
                }
                Err(e) => {
                    metrics::record_status_poll("error");
                    tracing::warn!(job_id = %id, error = %e, "Status lookup failed");
                    StatusReport::Error {
                        kind: e.kind(),
                        error: e.to_string(),
                    }
                }
            };
            ((*id).clone(), report)
        });

        join_all(lookups).await.into_iter().collect()
    }
}
