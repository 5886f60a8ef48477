//! External extraction service.

pub mod client;
pub mod types;

use async_trait::async_trait;

use crate::error::PipelineResult;
use crate::queue::SourceRef;

pub use client::HttpExtractionClient;
pub use types::{text_lines, Block, BlockType, JobStatus, JobStatusPage};

/// Asynchronous text-extraction service.
#[async_trait]
pub trait ExtractionApi: Send + Sync {
    /// Submit a document; returns the upstream job ID.
    async fn start_job(&self, source: &SourceRef) -> PipelineResult<String>;

    /// Status of a job plus one page of results when it has succeeded.
    async fn get_status(&self, job_id: &str, next_token: Option<&str>) -> PipelineResult<JobStatusPage>;
}
