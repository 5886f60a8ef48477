//! Job descriptor and queue message types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Queue tier a job is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Standard,
    High,
}

impl Priority {
    pub const ALL: [Priority; 2] = [Priority::High, Priority::Standard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Standard => "standard",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Location of a document in the object store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceRef {
    pub container: String,
    pub key: String,
}

impl SourceRef {
    pub fn new(container: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.key)
    }
}

/// A submitted extraction job awaiting its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub job_id: String,
    pub source_ref: SourceRef,
    pub priority: Priority,
    /// Epoch millis of the successful upstream submission.
    pub submitted_at: u64,
    /// Upstream submission retries before this job was accepted.
    pub retry_count: u32,
}

/// A received message. Holding one is a lease that lasts until
/// `visibility_deadline`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub message_id: String,
    /// Identifies this particular delivery; stale after redelivery.
    pub receipt: String,
    pub body: JobDescriptor,
    /// Lane the message was received from; acks go back to it.
    pub lane: Priority,
    pub receive_count: u32,
    /// Epoch millis after which the message becomes visible again.
    pub visibility_deadline: u64,
}

/// Message ID returned in a partial-batch failure report.
pub type FailedMessageId = String;
