//! Process-local event store.
//!
//! Keeps events in insertion order behind a `tokio` lock. Suitable for
//! single-process profiling sessions and for tests.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::EventStoreError;
use crate::event::ProfileEvent;
use crate::traits::EventStore;

/// In-memory [`EventStore`].
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<ProfileEvent>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn truncate(&self) -> Result<bool, EventStoreError> {
        let mut events = self.events.write().await;
        debug!(removed = events.len(), "event store truncated");
        events.clear();
        Ok(true)
    }

    async fn insert(&self, event: ProfileEvent) -> Result<bool, EventStoreError> {
        self.events.write().await.push(event);
        Ok(true)
    }

    async fn list(&self) -> Result<Vec<ProfileEvent>, EventStoreError> {
        Ok(self.events.read().await.clone())
    }
}
