//! Process-wide registry of committed containers.
//!
//! The cache is the single source of truth this core consults to prevent
//! double-creation. It is explicitly owned and injected rather than a
//! process global, so every test (and every embedder) gets an isolated
//! instance.

use std::collections::HashMap;
use std::sync::Arc;

use gantry_id::ContainerId;
use tokio::sync::RwLock;

use crate::container::Container;

/// Concurrency-safe id → container registry.
#[derive(Default)]
pub struct ContainerCache {
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,
}

impl ContainerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a container by id.
    pub async fn get(&self, id: &ContainerId) -> Option<Arc<Container>> {
        self.containers.read().await.get(id).cloned()
    }

    /// Insert or replace a container.
    pub async fn put(&self, container: Arc<Container>) {
        self.containers
            .write()
            .await
            .insert(container.id(), container);
    }

    /// Number of cached containers.
    pub async fn len(&self) -> usize {
        self.containers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.containers.read().await.is_empty()
    }
}
