//! Runtime configuration store.
//!
//! Breaker and retry settings are externally owned JSON documents. Every
//! lookup goes back to the store; nothing here caches, so an edit takes
//! effect on the next dispatch or breaker evaluation.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use crate::config::schema::{CircuitBreakerConfig, RetryConfig};
use crate::error::{PipelineError, PipelineResult};

/// Read-through key/value store holding JSON documents.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Raw JSON bytes stored under `path`.
    async fn get_json(&self, path: &str) -> PipelineResult<Vec<u8>>;
}

pub fn breaker_config_path(dependency: &str) -> String {
    format!("circuit-breakers/{dependency}")
}

pub fn retry_config_path(dependency: &str) -> String {
    format!("retry-policies/{dependency}")
}

async fn load_or_default<T>(store: &dyn ConfigStore, path: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let decoded = match store.get_json(path).await {
        Ok(bytes) => serde_json::from_slice::<T>(&bytes)
            .map_err(|e| PipelineError::Config(format!("{path}: {e}"))),
        Err(e) => Err(e),
    };

    match decoded {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Runtime config unavailable, using defaults");
            T::default()
        }
    }
}

/// Current circuit breaker settings for `dependency`, or defaults.
pub async fn load_breaker_config(store: &dyn ConfigStore, dependency: &str) -> CircuitBreakerConfig {
    load_or_default(store, &breaker_config_path(dependency)).await
}

/// Current retry settings for `dependency`, or defaults.
pub async fn load_retry_config(store: &dyn ConfigStore, dependency: &str) -> RetryConfig {
    load_or_default(store, &retry_config_path(dependency)).await
}

/// Concurrent in-process config store. Edits through [`put_json`] are
/// visible to the next reader.
///
/// [`put_json`]: InMemoryConfigStore::put_json
#[derive(Debug, Default)]
pub struct InMemoryConfigStore {
    documents: DashMap<String, Vec<u8>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_json(&self, path: &str, value: &serde_json::Value) {
        self.documents.insert(path.to_string(), value.to_string().into_bytes());
    }

    pub fn put_breaker_config(&self, dependency: &str, config: &CircuitBreakerConfig) {
        if let Ok(bytes) = serde_json::to_vec(config) {
            self.documents.insert(breaker_config_path(dependency), bytes);
        }
    }

    pub fn put_retry_config(&self, dependency: &str, config: &RetryConfig) {
        if let Ok(bytes) = serde_json::to_vec(config) {
            self.documents.insert(retry_config_path(dependency), bytes);
        }
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn get_json(&self, path: &str) -> PipelineResult<Vec<u8>> {
        self.documents
            .get(path)
            .map(|r| r.value().clone())
            .ok_or_else(|| PipelineError::Config(format!("no document at '{path}'")))
    }
}

/// Directory-backed store: `path` maps to `<root>/<path>.json`.
#[derive(Debug, Clone)]
pub struct DirConfigStore {
    root: PathBuf,
}

impl DirConfigStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &str) -> PipelineResult<PathBuf> {
        if path.split('/').any(|part| part.is_empty() || part == "..") {
            return Err(PipelineError::Config(format!("invalid config path '{path}'")));
        }
        Ok(self.root.join(format!("{path}.json")))
    }
}

#[async_trait]
impl ConfigStore for DirConfigStore {
    async fn get_json(&self, path: &str) -> PipelineResult<Vec<u8>> {
        let file = self.resolve(path)?;
        tokio::fs::read(&file).await.map_err(|e| match e.kind() {
            IoErrorKind::NotFound => PipelineError::Config(format!("no document at '{path}'")),
            _ => PipelineError::Config(format!("{}: {e}", file.display())),
        })
    }
}
