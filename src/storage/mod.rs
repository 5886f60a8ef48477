//! Object store for source documents and extraction results.

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, container: &str, key: &str) -> PipelineResult<Vec<u8>>;

    async fn put(&self, container: &str, key: &str, bytes: Vec<u8>) -> PipelineResult<()>;
}

/// Object store held in memory.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: DashMap<(String, String), Vec<u8>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn keys(&self, container: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|r| r.key().0 == container)
            .map(|r| r.key().1.clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, container: &str, key: &str) -> PipelineResult<Vec<u8>> {
        self.objects
            .get(&(container.to_string(), key.to_string()))
            .map(|r| r.value().clone())
            .ok_or_else(|| PipelineError::Storage(format!("{container}/{key} not found")))
    }

    async fn put(&self, container: &str, key: &str, bytes: Vec<u8>) -> PipelineResult<()> {
        self.objects
            .insert((container.to_string(), key.to_string()), bytes);
        Ok(())
    }
}

/// Filesystem-backed store: objects live at `<root>/<container>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, container: &str, key: &str) -> PipelineResult<PathBuf> {
        let unsafe_part = |s: &str| s.is_empty() || s.split('/').any(|p| p == ".." || p.is_empty());
        if container.contains('/') || unsafe_part(container) || unsafe_part(key) {
            return Err(PipelineError::Storage(format!(
                "invalid object location {container}/{key}"
            )));
        }
        Ok(self.root.join(container).join(key))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get(&self, container: &str, key: &str) -> PipelineResult<Vec<u8>> {
        let path = self.path_for(container, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| PipelineError::Storage(format!("{}: {e}", path.display())))
    }

    async fn put(&self, container: &str, key: &str, bytes: Vec<u8>) -> PipelineResult<()> {
        let path = self.path_for(container, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PipelineError::Storage(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("{}: {e}", path.display())))
    }
}
