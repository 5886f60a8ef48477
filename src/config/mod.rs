//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Static (startup):
//!     pipeline.toml
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → PipelineConfig (validated, immutable)
//!
//! Runtime (every call):
//!     circuit breaker / dispatcher
//!     → store.rs (ConfigStore::get_json, no caching)
//!     → CircuitBreakerConfig / RetryConfig (defaults on error)
//! ```
//!
//! # Design Decisions
//! - Static config is immutable once loaded; changes require a restart
//! - Breaker and retry tuning is live: edits apply on the next evaluation
//! - All fields have defaults to allow minimal configs

pub mod loader;
pub mod schema;
pub mod store;
pub mod validation;

pub use schema::{
    CircuitBreakerConfig, ConsumerConfig, DispatchConfig, IngestConfig, ObservabilityConfig,
    PipelineConfig, QueueSettings, RetryConfig,
};
pub use store::{ConfigStore, DirConfigStore, InMemoryConfigStore};
