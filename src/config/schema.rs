//! Configuration schema definitions.
//!
//! [`PipelineConfig`] is the static process configuration loaded from TOML
//! at startup. [`CircuitBreakerConfig`] and [`RetryConfig`] are runtime
//! configuration, re-read from the config store on every evaluation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::error::ErrorKind;
use crate::queue::Priority;

/// Root configuration for the extraction pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PipelineConfig {
    /// HTTP ingestion and reporting surface.
    pub http: HttpConfig,

    /// Job dispatcher settings.
    pub dispatch: DispatchConfig,

    /// Per-priority work queue settings.
    pub queues: QueuesConfig,

    /// Result consumer pool settings.
    pub consumers: ConsumerConfig,

    /// External extraction service endpoint.
    pub extraction: ExtractionConfig,

    /// Location of live runtime configuration.
    pub config_store: ConfigStoreConfig,

    /// Where extraction results are written.
    pub object_store: ObjectStoreConfig,

    /// Job state change notifications.
    pub notifications: NotificationConfig,

    /// Document allow-list applied at the ingestion boundary.
    pub ingest: IngestConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl PipelineConfig {
    pub fn queue(&self, priority: Priority) -> &QueueSettings {
        self.queues.queue(priority)
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Per-request timeout in seconds. Must outlast a whole dispatch.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 150,
        }
    }
}

/// Job dispatcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Dependency name used for breaker state and runtime config lookups.
    pub dependency: String,

    /// Deadline for a single upstream "start job" call.
    pub call_timeout_secs: u64,

    /// Deadline for a whole dispatch including retries and sleeps.
    pub total_timeout_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dependency: "extraction-service".to_string(),
            call_timeout_secs: 10,
            total_timeout_secs: 120,
        }
    }
}

/// Settings for one priority queue.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct QueueSettings {
    /// Maximum messages handed to a worker per receive.
    pub batch_size: usize,

    /// How long an idle worker waits before polling again, in milliseconds.
    pub batching_window_ms: u64,

    /// Lease duration of a received message.
    pub visibility_timeout_secs: u64,

    /// Receives allowed before a message is dead-lettered.
    pub max_receive_count: u32,
}

impl QueueSettings {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn batching_window(&self) -> Duration {
        Duration::from_millis(self.batching_window_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub high: QueueSettings,
    pub standard: QueueSettings,
}

impl QueuesConfig {
    pub fn queue(&self, priority: Priority) -> &QueueSettings {
        match priority {
            Priority::High => &self.high,
            Priority::Standard => &self.standard,
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            high: QueueSettings {
                batch_size: 1,
                batching_window_ms: 0,
                visibility_timeout_secs: 120,
                max_receive_count: 5,
            },
            standard: QueueSettings {
                batch_size: 25,
                batching_window_ms: 5_000,
                visibility_timeout_secs: 300,
                max_receive_count: 5,
            },
        }
    }
}

/// Result consumer pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Workers polling the high priority queue.
    pub high_workers: usize,

    /// Workers polling the standard priority queue.
    pub standard_workers: usize,

    /// Upper bound on simultaneous upstream status calls across all workers.
    pub max_concurrent_status_calls: usize,

    /// Deadline for processing a single message.
    pub process_timeout_secs: u64,

    /// Idle delay between empty polls when the queue has no batching window.
    pub idle_poll_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            high_workers: 2,
            standard_workers: 4,
            max_concurrent_status_calls: 5,
            process_timeout_secs: 60,
            idle_poll_ms: 500,
        }
    }
}

/// Extraction service client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Base URL of the extraction API.
    pub endpoint: String,

    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9000".to_string(),
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConfigStoreConfig {
    /// Directory holding `<path>.json` documents.
    pub root: String,
}

impl Default for ConfigStoreConfig {
    fn default() -> Self {
        Self {
            root: "./runtime-config".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Filesystem root for the local object store.
    pub root: String,

    /// Container results are written to.
    pub output_container: String,

    /// Key prefix for result objects.
    pub output_prefix: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            root: "./objects".to_string(),
            output_container: "extraction-results".to_string(),
            output_prefix: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Webhook receiving job state changes. Logged only when unset.
    pub webhook_url: Option<String>,

    pub timeout_secs: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Lowercase file extensions accepted for extraction.
    pub allowed_extensions: Vec<String>,

    /// Largest accepted document in bytes.
    pub max_size_bytes: u64,

    /// Storage keys under these prefixes are dispatched as high priority.
    pub high_priority_prefixes: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: ["pdf", "png", "jpg", "jpeg", "tiff"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_size_bytes: 500 * 1024 * 1024,
            high_priority_prefixes: vec!["priority/".to_string()],
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines.
    pub json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Circuit breaker tuning for one upstream dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// When false the breaker is bypassed and always reports closed.
    pub enabled: bool,

    /// Failures within the monitor window that open the circuit.
    pub failure_threshold: u32,

    /// Time spent open before probing.
    pub recovery_timeout_secs: u64,

    /// Probe calls admitted while half-open.
    pub half_open_max_calls: u32,

    /// Consecutive probe successes that close the circuit.
    pub success_threshold: u32,

    /// Length of the failure counting window.
    pub monitor_window_secs: u64,

    /// Calls that must be observed in the window before it can open.
    pub min_calls_to_evaluate: u32,
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }

    pub fn monitor_window(&self) -> Duration {
        Duration::from_secs(self.monitor_window_secs)
    }

    /// Probe slots per half-open period. At least one, so a half-open
    /// circuit can always be tested.
    pub fn effective_half_open_calls(&self) -> u32 {
        self.half_open_max_calls.max(1)
    }

    /// Success threshold clamped to the probes that can actually be admitted.
    pub fn effective_success_threshold(&self) -> u32 {
        self.success_threshold
            .min(self.effective_half_open_calls())
            .max(1)
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            half_open_max_calls: 1,
            success_threshold: 1,
            monitor_window_secs: 60,
            min_calls_to_evaluate: 5,
        }
    }
}

/// Retry configuration for one upstream dependency.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts, including the first call.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds.
    pub initial_delay_ms: u64,

    /// Upper bound of the exponential part in milliseconds.
    pub max_delay_ms: u64,

    /// Growth factor applied per attempt.
    pub backoff_multiplier: f64,

    /// Upper bound of the uniform jitter added to every delay.
    pub jitter_max_ms: u64,

    pub retryable_errors: HashSet<ErrorKind>,

    /// Takes precedence over `retryable_errors`.
    pub non_retryable_errors: HashSet<ErrorKind>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter_max_ms: 500,
            retryable_errors: [
                ErrorKind::Throttling,
                ErrorKind::TransientUpstream,
                ErrorKind::Timeout,
            ]
            .into_iter()
            .collect(),
            non_retryable_errors: [ErrorKind::Validation, ErrorKind::UnsupportedInput]
                .into_iter()
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: PipelineConfig = toml::from_str(
            r#"
            [consumers]
            high_workers = 8

            [queues.standard]
            batch_size = 10
            batching_window_ms = 1000
            visibility_timeout_secs = 60
            max_receive_count = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.consumers.high_workers, 8);
        assert_eq!(config.consumers.standard_workers, 4);
        assert_eq!(config.queue(Priority::Standard).max_receive_count, 3);
        assert_eq!(config.queue(Priority::High).batch_size, 1);
        assert_eq!(config.dispatch.dependency, "extraction-service");
    }

    #[test]
    fn test_runtime_config_json() {
        let cfg: RetryConfig = serde_json::from_str(
            r#"{"max_attempts": 3, "retryable_errors": ["throttling"], "non_retryable_errors": []}"#,
        )
        .unwrap();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.initial_delay_ms, 1_000);
        assert!(cfg.retryable_errors.contains(&ErrorKind::Throttling));
        assert!(cfg.non_retryable_errors.is_empty());
    }

    #[test]
    fn test_effective_success_threshold_is_clamped() {
        let cfg = CircuitBreakerConfig {
            half_open_max_calls: 2,
            success_threshold: 4,
            ..Default::default()
        };
        assert_eq!(cfg.effective_success_threshold(), 2);

        let cfg = CircuitBreakerConfig {
            half_open_max_calls: 3,
            success_threshold: 2,
            ..Default::default()
        };
        assert_eq!(cfg.effective_success_threshold(), 2);
    }
}
