//! HTTP surface.
//!
//! # Data Flow
//! ```text
//! POST /notifications        → ingest (allow-list) → dispatcher → IngestReport
//! GET  /jobs/status?ids=a,b  → status tracker (one lookup per ID)
//! GET  /breakers/{dependency}→ circuit breaker state
//! GET  /health               → liveness
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer};
