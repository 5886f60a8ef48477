//! Work queue and dead letter queue.
//!
//! # Data Flow
//! ```text
//! dispatcher ── send(job, priority) ──▶ [high | standard] lane
//!                                             │ receive_batch (lease)
//!                                             ▼
//!                                       consumer worker
//!                                  ack ◀──┘   └──▶ no ack: visible again
//!                                                  after the lease, until
//!                                                  max_receive_count → DLQ
//! ```
//!
//! # Design Decisions
//! - At-least-once delivery; the visibility timeout is the consumer's lease
//! - Dead-lettering is the transport's job, consumers never count receives
//! - `high` lanes take single-message batches for latency, `standard`
//!   lanes batch for throughput

pub mod memory;
pub mod types;

use async_trait::async_trait;

use crate::error::PipelineResult;

pub use memory::InMemoryQueue;
pub use types::{FailedMessageId, JobDescriptor, Priority, QueueMessage, SourceRef};

/// Durable, at-least-once queue transport.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Enqueue a job on the lane for `priority`. Returns the message ID.
    async fn send(&self, job: JobDescriptor, priority: Priority) -> PipelineResult<String>;

    /// Lease up to `max` visible messages.
    async fn receive_batch(&self, priority: Priority, max: usize) -> PipelineResult<Vec<QueueMessage>>;

    /// Delete a leased message.
    async fn ack(&self, msg: &QueueMessage) -> PipelineResult<()>;

    /// Give up a lease. The message reappears once its deadline passes.
    async fn nack(&self, _msg: &QueueMessage) -> PipelineResult<()> {
        Ok(())
    }

    /// Messages moved to the lane's dead letter queue.
    async fn dead_letters(&self, priority: Priority) -> PipelineResult<Vec<QueueMessage>>;
}
