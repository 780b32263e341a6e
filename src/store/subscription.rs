// 📡 Live query subscriptions
// A subscription yields the current result set once, then a fresh snapshot
// every time the watched collection receives a document. Dropping the handle
// stops the background task; nothing is delivered afterwards.

use super::{DocumentStore, Query, StoredDocument};
use crate::error::StoreError;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::debug;

pub type Snapshot = Result<Vec<StoredDocument>, StoreError>;

pub struct Subscription {
    events: mpsc::Receiver<Snapshot>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next snapshot; `None` once the subscription has ended (store error
    /// already delivered, or the store went away).
    pub async fn next(&mut self) -> Option<Snapshot> {
        self.events.recv().await
    }

    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Watch `query` over `collection`. Must be called inside a tokio runtime.
pub fn subscribe(store: Arc<dyn DocumentStore>, collection: &str, query: Query) -> Subscription {
    let (tx, events) = mpsc::channel(16);
    let collection = collection.to_string();
    // Listen before the first read so no create slips between snapshot and wait
    let mut changes = store.changes();

    let task = tokio::spawn(async move {
        loop {
            let snapshot = store.query(&collection, &query).await;
            let failed = snapshot.is_err();
            if tx.send(snapshot).await.is_err() || failed {
                break;
            }

            loop {
                match changes.recv().await {
                    Ok(changed) if changed == collection => break,
                    Ok(_) => continue,
                    // Missed notifications still mean "something changed"
                    Err(broadcast::error::RecvError::Lagged(_)) => break,
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
        debug!(%collection, "subscription ended");
    });

    Subscription { events, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Filter, MemoryStore};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initial_snapshot_then_updates() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        store.create("agreements", json!({"owner": "alice"})).await.unwrap();

        let mut sub = subscribe(
            Arc::clone(&store),
            "agreements",
            Query::new().filter(Filter::equals("owner", "alice")),
        );

        let first = sub.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 1);

        store.create("agreements", json!({"owner": "bob"})).await.unwrap();
        let second = sub.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 1, "bob's agreement is filtered out");

        store.create("agreements", json!({"owner": "alice"})).await.unwrap();
        let third = sub.next().await.unwrap().unwrap();
        assert_eq!(third.len(), 2);
    }

    #[tokio::test]
    async fn test_other_collections_do_not_wake_subscription() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut sub = subscribe(Arc::clone(&store), "agreements", Query::new());

        assert!(sub.next().await.unwrap().unwrap().is_empty());

        store.create("addenda", json!({})).await.unwrap();
        let waited = tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(waited.is_err(), "no snapshot for unrelated collection");
    }

    #[tokio::test]
    async fn test_cancel_stops_task() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut sub = subscribe(Arc::clone(&store), "agreements", Query::new());
        sub.next().await.unwrap().unwrap();

        sub.cancel();
        // Creating after cancellation must not panic or block
        store.create("agreements", json!({})).await.unwrap();
    }
}
