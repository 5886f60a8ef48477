//! Document extraction dispatcher.
//!
//! # Architecture Overview
//!
//! ```text
//!   notification ──▶ http ──▶ ingest ──▶ dispatch ──▶ extraction service
//!                                           │  ▲
//!                              circuit breaker  retry/backoff
//!                                           │
//!                                           ▼
//!                               queue [high | standard] ──▶ DLQ
//!                                           │
//!                                           ▼
//!                               consumer pool ──▶ object store
//!                                           └───▶ notifier
//!
//!   config store (live breaker/retry tuning)   status tracker (reporting)
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use extraction_dispatch::clock::{Clock, SystemClock};
use extraction_dispatch::config::loader::load_config;
use extraction_dispatch::config::{ConfigStore, DirConfigStore, PipelineConfig};
use extraction_dispatch::consumer::{ConsumerPool, ResultConsumer};
use extraction_dispatch::dispatch::JobDispatcher;
use extraction_dispatch::http::{AppState, HttpServer};
use extraction_dispatch::ingest::Ingestor;
use extraction_dispatch::lifecycle::{shutdown_on_signal, Shutdown};
use extraction_dispatch::notify::{LogNotifier, Notifier, WebhookNotifier};
use extraction_dispatch::observability::{logging, metrics};
use extraction_dispatch::queue::InMemoryQueue;
use extraction_dispatch::resilience::{CircuitBreaker, InMemoryBreakerStore};
use extraction_dispatch::status::StatusTracker;
use extraction_dispatch::storage::LocalObjectStore;
use extraction_dispatch::upstream::{ExtractionApi, HttpExtractionClient};

/// Time allowed for consumers to finish in-flight batches after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "extraction-dispatch", version, about = "Document extraction job dispatcher")]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PipelineConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!("extraction-dispatch v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.http.bind_address,
        dependency = %config.dispatch.dependency,
        extraction_endpoint = %config.extraction.endpoint,
        high_workers = config.consumers.high_workers,
        standard_workers = config.consumers.standard_workers,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let config_store: Arc<dyn ConfigStore> = Arc::new(DirConfigStore::new(&config.config_store.root));
    let api: Arc<dyn ExtractionApi> = Arc::new(HttpExtractionClient::new(&config.extraction)?);
    let queue = Arc::new(InMemoryQueue::new(&config.queues, clock.clone()));
    let object_store = Arc::new(LocalObjectStore::new(&config.object_store.root));
    let notifier: Arc<dyn Notifier> = match &config.notifications.webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(
            url.clone(),
            Duration::from_secs(config.notifications.timeout_secs),
        )?),
        None => Arc::new(LogNotifier),
    };
    let breaker = Arc::new(CircuitBreaker::new(
        config_store.clone(),
        Arc::new(InMemoryBreakerStore::new()),
        clock.clone(),
    ));

    let dispatcher = JobDispatcher::new(
        api.clone(),
        breaker.clone(),
        config_store,
        queue.clone(),
        clock,
        config.dispatch.clone(),
    );

    let consumer = Arc::new(ResultConsumer::new(
        api.clone(),
        queue.clone(),
        object_store,
        notifier,
        Arc::new(Semaphore::new(config.consumers.max_concurrent_status_calls)),
        config.object_store.clone(),
        Duration::from_secs(config.consumers.process_timeout_secs),
    ));
    let pool = ConsumerPool::new(consumer, queue, config.consumers.clone(), config.queues.clone());

    let state = AppState {
        ingestor: Ingestor::new(config.ingest.clone(), dispatcher),
        status: StatusTracker::new(api),
        breaker,
    };

    let shutdown = Shutdown::new();
    let listener = TcpListener::bind(&config.http.bind_address).await?;

    let pool_shutdown = shutdown.clone();
    let pool_handle = tokio::spawn(async move { pool.run(&pool_shutdown).await });
    shutdown_on_signal(shutdown.clone());

    let served = HttpServer::new(&config.http, state).run(listener, &shutdown).await;
    shutdown.trigger();

    if tokio::time::timeout(DRAIN_TIMEOUT, pool_handle).await.is_err() {
        tracing::warn!(timeout = ?DRAIN_TIMEOUT, "Consumers did not drain in time, exiting");
    }

    served?;
    tracing::info!("Shutdown complete");
    Ok(())
}
