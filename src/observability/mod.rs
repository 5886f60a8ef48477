//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters, gauges)
//!
//! Consumers:
//!     → Log aggregation (stdout, plain or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured fields (job_id, dependency, attempt) rather than formatted text
//! - Metric updates go through the `metrics` facade and are no-ops until
//!   a recorder is installed, so tests need no setup

pub mod logging;
pub mod metrics;
