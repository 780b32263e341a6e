// In-process document store (tests and ephemeral runs)

use super::{DocumentStore, Query, StoredDocument};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

#[derive(Default)]
struct Collections {
    next_seq: i64,
    docs: HashMap<String, Vec<StoredDocument>>,
}

pub struct MemoryStore {
    inner: RwLock<Collections>,
    changes: broadcast::Sender<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        MemoryStore {
            inner: RwLock::new(Collections::default()),
            changes,
        }
    }

    /// Number of documents in a collection
    pub async fn count(&self, collection: &str) -> usize {
        let guard = self.inner.read().await;
        guard.docs.get(collection).map(Vec::len).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        {
            let mut guard = self.inner.write().await;
            guard.next_seq += 1;
            let seq = guard.next_seq;
            guard
                .docs
                .entry(collection.to_string())
                .or_default()
                .push(StoredDocument {
                    id: id.clone(),
                    seq,
                    data,
                });
        }
        debug!(collection, %id, "memory store: document created");
        // No receivers is fine
        let _ = self.changes.send(collection.to_string());
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .docs
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| d.id == id))
            .cloned())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>, StoreError> {
        let guard = self.inner.read().await;
        let mut matched: Vec<StoredDocument> = guard
            .docs
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|d| query.matches(&d.data))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        query.sort(&mut matched);
        Ok(matched)
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}
