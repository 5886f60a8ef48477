//! Notification boundary.
//!
//! # Data Flow
//! ```text
//! JSON notification
//!     → DocumentEvent (storage records | direct request), decided once here
//!     → (DocumentRef, Priority) per document
//!     → AllowList (extension, size)    ── rejected ──▶ report, never dispatched
//!     → JobDispatcher::dispatch, concurrently per document
//!     → IngestReport { submitted, rejected, failed }
//! ```

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::config::IngestConfig;
use crate::dispatch::{DocumentRef, JobDispatcher};
use crate::error::ErrorKind;
use crate::queue::{Priority, SourceRef};

/// A "document ready" notification.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DocumentEvent {
    /// Object-store event carrying one record per written object.
    Storage(StorageEvent),
    /// Explicit request naming a single document.
    Direct(DirectRequest),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageEvent {
    #[serde(rename = "Records")]
    pub records: Vec<StorageRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StorageRecord {
    pub container: String,
    pub key: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DirectRequest {
    pub container: String,
    pub key: String,
    #[serde(default)]
    pub size_bytes: Option<u64>,
    #[serde(default)]
    pub priority: Priority,
}

impl DocumentEvent {
    /// Flatten into dispatchable documents.
    pub fn resolve(self, config: &IngestConfig) -> Vec<(DocumentRef, Priority)> {
        match self {
            DocumentEvent::Storage(event) => event
                .records
                .into_iter()
                .map(|record| {
                    let priority = if config
                        .high_priority_prefixes
                        .iter()
                        .any(|prefix| record.key.starts_with(prefix.as_str()))
                    {
                        Priority::High
                    } else {
                        Priority::Standard
                    };
                    let doc = DocumentRef {
                        source: SourceRef::new(record.container, record.key),
                        size_bytes: record.size_bytes,
                    };
                    (doc, priority)
                })
                .collect(),
            DocumentEvent::Direct(request) => {
                let doc = DocumentRef {
                    source: SourceRef::new(request.container, request.key),
                    size_bytes: request.size_bytes,
                };
                vec![(doc, request.priority)]
            }
        }
    }
}

/// Why a document was not dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub source: SourceRef,
    pub reason: String,
}

/// Extension and size filter applied before dispatch.
#[derive(Debug, Clone)]
pub struct AllowList {
    extensions: HashSet<String>,
    max_size_bytes: u64,
}

impl AllowList {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            extensions: config
                .allowed_extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            max_size_bytes: config.max_size_bytes,
        }
    }

    pub fn check(&self, doc: &DocumentRef) -> Result<(), Rejection> {
        let reject = |reason: String| Rejection {
            source: doc.source.clone(),
            reason,
        };

        let file_name = doc.source.key.rsplit('/').next().unwrap_or_default();
        let extension = match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
            _ => return Err(reject("missing file extension".to_string())),
        };
        if !self.extensions.contains(&extension) {
            return Err(reject(format!("extension '{extension}' is not allowed")));
        }

        match doc.size_bytes {
            Some(0) => Err(reject("document is empty".to_string())),
            Some(size) if size > self.max_size_bytes => Err(reject(format!(
                "document is {size} bytes, limit is {}",
                self.max_size_bytes
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Submitted {
    pub source: SourceRef,
    pub job_id: String,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchFailure {
    pub source: SourceRef,
    pub kind: ErrorKind,
    pub error: String,
}

/// Outcome of one notification, per document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub submitted: Vec<Submitted>,
    pub rejected: Vec<Rejection>,
    pub failed: Vec<DispatchFailure>,
}

impl IngestReport {
    /// True when some document was turned away by an open circuit.
    pub fn has_unavailable(&self) -> bool {
        self.failed.iter().any(|f| f.kind == ErrorKind::Unavailable)
    }
}

/// Filters notifications and hands accepted documents to the dispatcher.
#[derive(Clone)]
pub struct Ingestor {
    config: IngestConfig,
    allow_list: AllowList,
    dispatcher: JobDispatcher,
}

impl Ingestor {
    pub fn new(config: IngestConfig, dispatcher: JobDispatcher) -> Self {
        let allow_list = AllowList::new(&config);
        Self {
            config,
            allow_list,
            dispatcher,
        }
    }

    /// Dependency the dispatcher submits to.
    pub fn dependency(&self) -> &str {
        self.dispatcher.dependency()
    }

    pub async fn ingest(&self, event: DocumentEvent) -> IngestReport {
        let mut report = IngestReport::default();
        let mut accepted = Vec::new();

        for (doc, priority) in event.resolve(&self.config) {
            match self.allow_list.check(&doc) {
                Ok(()) => accepted.push((doc, priority)),
                Err(rejection) => {
                    tracing::info!(
                        source = %rejection.source,
                        reason = %rejection.reason,
                        "Document rejected"
                    );
                    report.rejected.push(rejection);
                }
            }
        }

        let results = join_all(
            accepted
                .iter()
                .map(|(doc, priority)| self.dispatcher.dispatch(doc, *priority)),
        )
        .await;

        for ((doc, priority), result) in accepted.into_iter().zip(results) {
            match result {
                Ok(job_id) => report.submitted.push(Submitted {
                    source: doc.source,
                    job_id,
                    priority,
                }),
                Err(e) => report.failed.push(DispatchFailure {
                    source: doc.source,
                    kind: e.kind(),
                    error: e.to_string(),
                }),
            }
        }
        report
    }
}
