//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and returns every
//! problem found rather than stopping at the first.

use std::fmt;

use crate::config::schema::{PipelineConfig, QueueSettings};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &PipelineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.dispatch.dependency.trim().is_empty() {
        errors.push(ValidationError::new("dispatch.dependency", "must not be empty"));
    }
    if config.dispatch.call_timeout_secs == 0 {
        errors.push(ValidationError::new("dispatch.call_timeout_secs", "must be > 0"));
    }
    if config.dispatch.total_timeout_secs < config.dispatch.call_timeout_secs {
        errors.push(ValidationError::new(
            "dispatch.total_timeout_secs",
            "must be >= call_timeout_secs",
        ));
    }

    if config.http.request_timeout_secs <= config.dispatch.total_timeout_secs {
        errors.push(ValidationError::new(
            "http.request_timeout_secs",
            "must be > dispatch.total_timeout_secs",
        ));
    }

    validate_queue("queues.high", &config.queues.high, &mut errors);
    validate_queue("queues.standard", &config.queues.standard, &mut errors);

    if config.consumers.high_workers == 0 {
        errors.push(ValidationError::new("consumers.high_workers", "must be > 0"));
    }
    if config.consumers.standard_workers == 0 {
        errors.push(ValidationError::new("consumers.standard_workers", "must be > 0"));
    }
    if config.consumers.max_concurrent_status_calls == 0 {
        errors.push(ValidationError::new(
            "consumers.max_concurrent_status_calls",
            "must be > 0",
        ));
    }
    if config.consumers.process_timeout_secs == 0 {
        errors.push(ValidationError::new("consumers.process_timeout_secs", "must be > 0"));
    }

    if url::Url::parse(&config.extraction.endpoint).is_err() {
        errors.push(ValidationError::new("extraction.endpoint", "must be a valid URL"));
    }
    if let Some(webhook) = &config.notifications.webhook_url {
        if url::Url::parse(webhook).is_err() {
            errors.push(ValidationError::new(
                "notifications.webhook_url",
                "must be a valid URL",
            ));
        }
    }

    if config.object_store.output_container.is_empty() {
        errors.push(ValidationError::new(
            "object_store.output_container",
            "must not be empty",
        ));
    }

    if config.ingest.allowed_extensions.is_empty() {
        errors.push(ValidationError::new(
            "ingest.allowed_extensions",
            "must list at least one extension",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_queue(prefix: &str, queue: &QueueSettings, errors: &mut Vec<ValidationError>) {
    if queue.batch_size == 0 {
        errors.push(ValidationError::new(format!("{prefix}.batch_size"), "must be > 0"));
    }
    if queue.visibility_timeout_secs == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.visibility_timeout_secs"),
            "must be > 0",
        ));
    }
    if queue.max_receive_count == 0 {
        errors.push(ValidationError::new(
            format!("{prefix}.max_receive_count"),
            "must be > 0",
        ));
    }
}
