//! Result consumption.
//!
//! # Data Flow
//! ```text
//! ConsumerPool (W workers per priority lane)
//!     → WorkQueue::receive_batch (lease)
//!     → ResultConsumer::process_batch
//!         → get_status (bounded by a shared semaphore)
//!             SUCCEEDED   → store text → ack → notify
//!             FAILED      → ack → notify (terminal, never retried)
//!             IN_PROGRESS → leave leased, report as batch item failure
//!             other/error → leave leased, report as batch item failure
//!     → failed message IDs are nacked; the transport redelivers only those
//! ```
//!
//! # Design Decisions
//! - Workers share nothing but the status-call semaphore
//! - A batch in flight is finished before a worker honours shutdown
//! - Receive counting and dead-lettering stay with the transport

pub mod pool;
pub mod processor;

pub use pool::ConsumerPool;
pub use processor::{result_key, ResultConsumer, ResultOutcome};
