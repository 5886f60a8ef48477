//! Document extraction dispatch library.

pub mod clock;
pub mod config;
pub mod consumer;
pub mod dispatch;
pub mod error;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod notify;
pub mod observability;
pub mod queue;
pub mod resilience;
pub mod status;
pub mod storage;
pub mod upstream;

pub use config::schema::PipelineConfig;
pub use dispatch::{DocumentRef, JobDispatcher};
pub use error::{ErrorKind, PipelineError, PipelineResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
