//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to upstream:
//!     → circuit_breaker.rs (admit? fail fast with Unavailable when open)
//!     → timeouts.rs (enforce per-call deadline)
//!     → On failure: retries.rs (classify), backoff.rs (delay with jitter)
//!     → circuit_breaker.rs (record outcome, open if threshold exceeded)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Breaker and retry tuning come from the live config store
//! - Breaker-open rejections never count as failures

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;
pub mod timeouts;

pub use backoff::next_delay;
pub use circuit_breaker::{
    Admission, Breaker, BreakerStateStore, CircuitBreaker, CircuitBreakerState, CircuitStatus,
    InMemoryBreakerStore,
};
pub use retries::is_retryable;
