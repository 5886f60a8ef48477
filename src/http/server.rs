//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum Router with all handlers
//! - Wire up middleware (request ID, tracing, timeout)
//! - Serve until the shutdown coordinator fires

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::HttpConfig;
use crate::http::handlers;
use crate::ingest::Ingestor;
use crate::lifecycle::Shutdown;
use crate::resilience::CircuitBreaker;
use crate::status::StatusTracker;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub ingestor: Ingestor,
    pub status: StatusTracker,
    pub breaker: Arc<CircuitBreaker>,
}

/// HTTP front end for ingestion and reporting.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(config: &HttpConfig, state: AppState) -> Self {
        Self {
            router: Self::build_router(config, state),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(config: &HttpConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/notifications", post(handlers::post_notification))
            .route("/jobs/status", get(handlers::get_job_statuses))
            .route("/breakers/{dependency}", get(handlers::get_breaker))
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(config.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Serve on `listener` until `shutdown` is triggered.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown.signalled())
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}
