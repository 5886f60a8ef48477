//! Shared fakes and wiring for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use extraction_dispatch::clock::ManualClock;
use extraction_dispatch::config::schema::{ObjectStoreConfig, QueuesConfig};
use extraction_dispatch::config::{CircuitBreakerConfig, DispatchConfig, InMemoryConfigStore, RetryConfig};
use extraction_dispatch::consumer::ResultConsumer;
use extraction_dispatch::dispatch::{DocumentRef, JobDispatcher};
use extraction_dispatch::error::{ErrorKind, PipelineError, PipelineResult};
use extraction_dispatch::notify::{JobStateChange, Notifier};
use extraction_dispatch::queue::{InMemoryQueue, JobDescriptor, Priority, SourceRef, WorkQueue};
use extraction_dispatch::resilience::{CircuitBreaker, InMemoryBreakerStore};
use extraction_dispatch::storage::{InMemoryObjectStore, ObjectStore};
use extraction_dispatch::upstream::{Block, ExtractionApi, JobStatus, JobStatusPage};

pub const DEP: &str = "extraction-service";

pub fn error_of(kind: ErrorKind) -> PipelineError {
    match kind {
        ErrorKind::Throttling => PipelineError::Throttling("slow down".into()),
        ErrorKind::TransientUpstream => PipelineError::TransientUpstream("503".into()),
        ErrorKind::Validation => PipelineError::Validation("bad document".into()),
        ErrorKind::UnsupportedInput => PipelineError::UnsupportedInput("bad format".into()),
        ErrorKind::Timeout => PipelineError::Timeout(10),
        other => PipelineError::UnexpectedStatus(other.as_str().into()),
    }
}

/// Extraction API whose responses are scripted per test.
///
/// `start_job` waits out any scripted delay, pops scripted failures, then
/// hands out `job-<n>` IDs where `n` counts every call.
/// `get_status` answers from pages registered per `(job_id, next_token)`.
#[derive(Default)]
pub struct ScriptedApi {
    start_script: Mutex<VecDeque<ErrorKind>>,
    start_delays: Mutex<VecDeque<Duration>>,
    pub start_calls: AtomicUsize,
    pages: DashMap<(String, Option<String>), JobStatusPage>,
    status_errors: DashMap<String, ErrorKind>,
    pub status_calls: AtomicUsize,
    status_delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` submissions with `kind`.
    pub fn fail_starts(&self, kind: ErrorKind, n: usize) {
        let mut script = self.start_script.lock().unwrap();
        script.extend(std::iter::repeat(kind).take(n));
    }

    /// Make the next `n` submissions take `delay` before answering.
    pub fn slow_starts(&self, delay: Duration, n: usize) {
        let mut delays = self.start_delays.lock().unwrap();
        delays.extend(std::iter::repeat(delay).take(n));
    }

    pub fn set_status(&self, job_id: &str, status: JobStatus) {
        self.pages
            .insert((job_id.to_string(), None), JobStatusPage::status(status));
    }

    pub fn set_page(&self, job_id: &str, token: Option<&str>, page: JobStatusPage) {
        self.pages
            .insert((job_id.to_string(), token.map(String::from)), page);
    }

    pub fn fail_status(&self, job_id: &str, kind: ErrorKind) {
        self.status_errors.insert(job_id.to_string(), kind);
    }

    pub fn delay_status(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = Some(delay);
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExtractionApi for ScriptedApi {
    async fn start_job(&self, _source: &SourceRef) -> PipelineResult<String> {
        let n = self.start_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = self.start_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.start_script.lock().unwrap().pop_front();
        match scripted {
            Some(kind) => Err(error_of(kind)),
            None => Ok(format!("job-{n}")),
        }
    }

    async fn get_status(&self, job_id: &str, next_token: Option<&str>) -> PipelineResult<JobStatusPage> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some(kind) = self.status_errors.get(job_id) {
            return Err(error_of(*kind));
        }
        self.pages
            .get(&(job_id.to_string(), next_token.map(String::from)))
            .map(|p| p.value().clone())
            .ok_or_else(|| PipelineError::Validation(format!("unknown job {job_id}")))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<JobStateChange>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<JobStateChange> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn publish(&self, event: &JobStateChange) -> PipelineResult<()> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// In-memory object store that counts writes.
#[derive(Default)]
pub struct CountingStore {
    pub inner: InMemoryObjectStore,
    pub puts: AtomicUsize,
}

impl CountingStore {
    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn get(&self, container: &str, key: &str) -> PipelineResult<Vec<u8>> {
        self.inner.get(container, key).await
    }

    async fn put(&self, container: &str, key: &str, bytes: Vec<u8>) -> PipelineResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(container, key, bytes).await
    }
}

pub fn lines_page(status: JobStatus, lines: &[&str], next_token: Option<&str>) -> JobStatusPage {
    JobStatusPage {
        status,
        blocks: lines.iter().map(|l| Block::line(*l)).collect(),
        next_token: next_token.map(String::from),
        status_message: None,
    }
}

pub fn descriptor(job_id: &str, key: &str, priority: Priority) -> JobDescriptor {
    JobDescriptor {
        job_id: job_id.to_string(),
        source_ref: SourceRef::new("inbox", key),
        priority,
        submitted_at: 0,
        retry_count: 0,
    }
}

pub fn doc(key: &str) -> DocumentRef {
    DocumentRef::new("inbox", key)
}

/// Fully wired pipeline over fakes and a manual clock.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub config_store: Arc<InMemoryConfigStore>,
    pub api: Arc<ScriptedApi>,
    pub queue: Arc<InMemoryQueue>,
    pub store: Arc<CountingStore>,
    pub notifier: Arc<RecordingNotifier>,
    pub breaker: Arc<CircuitBreaker>,
    pub dispatcher: JobDispatcher,
    pub consumer: Arc<ResultConsumer>,
    pub output: ObjectStoreConfig,
}

pub struct HarnessOptions {
    pub queues: QueuesConfig,
    pub dispatch: DispatchConfig,
    pub max_concurrent_status_calls: usize,
    pub process_timeout: Duration,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            queues: QueuesConfig::default(),
            dispatch: DispatchConfig::default(),
            max_concurrent_status_calls: 5,
            process_timeout: Duration::from_secs(60),
        }
    }
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(HarnessOptions::default())
    }

    pub fn with_options(options: HarnessOptions) -> Self {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let config_store = Arc::new(InMemoryConfigStore::new());
        let api = Arc::new(ScriptedApi::new());
        let queue = Arc::new(InMemoryQueue::new(&options.queues, clock.clone()));
        let store = Arc::new(CountingStore::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let breaker = Arc::new(CircuitBreaker::new(
            config_store.clone(),
            Arc::new(InMemoryBreakerStore::new()),
            clock.clone(),
        ));
        let output = ObjectStoreConfig::default();

        let dispatcher = JobDispatcher::new(
            api.clone(),
            breaker.clone(),
            config_store.clone(),
            queue.clone(),
            clock.clone(),
            options.dispatch.clone(),
        );
        let consumer = Arc::new(ResultConsumer::new(
            api.clone(),
            queue.clone(),
            store.clone(),
            notifier.clone(),
            Arc::new(Semaphore::new(options.max_concurrent_status_calls)),
            output.clone(),
            options.process_timeout,
        ));

        Self {
            clock,
            config_store,
            api,
            queue,
            store,
            notifier,
            breaker,
            dispatcher,
            consumer,
            output,
        }
    }

    pub fn set_retry(&self, config: &RetryConfig) {
        self.config_store.put_retry_config(DEP, config);
    }

    pub fn set_breaker(&self, config: &CircuitBreakerConfig) {
        self.config_store.put_breaker_config(DEP, config);
    }

    pub async fn enqueue(&self, job: JobDescriptor) -> String {
        let priority = job.priority;
        self.queue.send(job, priority).await.unwrap()
    }
}
