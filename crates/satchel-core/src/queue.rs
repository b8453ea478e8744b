//! Durable FIFO of pending write operations.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::db::{LocalStore, StoreName};
use crate::error::Result;
use crate::models::{Operation, OperationId, QueuedOperation};

/// Outcome of a single [`MutationQueue::drain`] pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Items processed successfully and removed
    pub processed: usize,
    /// Whether the pass stopped at an item that failed
    pub halted: bool,
}

/// Mutation queue backed by the `queue` namespace
#[derive(Clone)]
pub struct MutationQueue {
    store: LocalStore,
}

impl MutationQueue {
    pub const fn new(store: LocalStore) -> Self {
        Self { store }
    }

    /// Stamp and persist an operation.
    pub async fn enqueue(&self, operation: Operation) -> Result<QueuedOperation> {
        let queued = QueuedOperation::new(operation);
        self.store
            .set_json(StoreName::Queue, &queued.id.as_str(), &queued)
            .await?;
        tracing::debug!("Queued {} operation {}", queued.kind(), queued.id);
        Ok(queued)
    }

    /// All queued operations, oldest first.
    ///
    /// Ties on `created_at` fall back to the id, which is also creation-ordered.
    /// An entry whose operation no longer decodes is listed as
    /// [`Operation::Unknown`] so draining can drop it; an entry without a
    /// readable id and timestamp is deleted here.
    pub async fn list(&self) -> Result<Vec<QueuedOperation>> {
        let mut items = Vec::new();
        for (key, bytes) in self.store.entries(StoreName::Queue).await? {
            match decode_entry(&key, &bytes) {
                Some(item) => items.push(item),
                None => {
                    tracing::warn!("Discarding unreadable queue entry {}", key);
                    self.store.remove(StoreName::Queue, &key).await?;
                }
            }
        }
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(items)
    }

    /// Remove an operation. Removing an absent id is not an error.
    pub async fn remove(&self, id: &OperationId) -> Result<()> {
        self.store.remove(StoreName::Queue, &id.as_str()).await
    }

    /// Number of queued operations.
    pub async fn count(&self) -> Result<usize> {
        self.store.count(StoreName::Queue).await
    }

    /// Process a snapshot of the queue strictly in order.
    ///
    /// Each item is removed once `processor` returns `Ok(true)`. The pass stops
    /// at the first `Ok(false)` or `Err`, leaving that item and everything after
    /// it queued for the next call; an `Err` is returned to the caller.
    pub async fn drain<F, Fut>(&self, mut processor: F) -> Result<DrainSummary>
    where
        F: FnMut(QueuedOperation) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let items = self.list().await?;
        let mut summary = DrainSummary::default();

        for item in items {
            let id = item.id;
            if processor(item).await? {
                self.remove(&id).await?;
                summary.processed += 1;
            } else {
                tracing::warn!("Drain halted at queued operation {}", id);
                summary.halted = true;
                break;
            }
        }

        Ok(summary)
    }
}

#[derive(Deserialize)]
struct QueuedHeader {
    id: OperationId,
    created_at: DateTime<Utc>,
}

fn decode_entry(key: &str, bytes: &[u8]) -> Option<QueuedOperation> {
    match serde_json::from_slice::<QueuedOperation>(bytes) {
        Ok(item) => return Some(item),
        Err(error) => tracing::warn!("Queued operation {} does not decode: {}", key, error),
    }

    let header = serde_json::from_slice::<QueuedHeader>(bytes).ok()?;
    (header.id.as_str() == key).then_some(QueuedOperation {
        id: header.id,
        created_at: header.created_at,
        operation: Operation::Unknown,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::cell::RefCell;

    fn setup() -> MutationQueue {
        MutationQueue::new(LocalStore::open_in_memory().unwrap())
    }

    fn insert(title: &str) -> Operation {
        Operation::Insert {
            table: "tasks".to_string(),
            payload: json!({"title": title}),
        }
    }

    fn titles(items: &[QueuedOperation]) -> Vec<String> {
        items
            .iter()
            .map(|item| match &item.operation {
                Operation::Insert { payload, .. } => payload["title"].as_str().unwrap().to_string(),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_enqueue_assigns_id_and_timestamp() {
        let queue = setup();
        let before = chrono::Utc::now();
        let queued = queue.enqueue(insert("A")).await.unwrap();

        assert!(queued.created_at >= before);
        assert_eq!(queued.kind(), "insert");
        assert_eq!(queue.count().await.unwrap(), 1);
        assert_eq!(queue.list().await.unwrap(), vec![queued]);
    }

    #[tokio::test]
    async fn test_list_is_fifo() {
        let queue = setup();
        for title in ["A", "B", "C", "D", "E"] {
            queue.enqueue(insert(title)).await.unwrap();
        }

        let items = queue.list().await.unwrap();
        assert_eq!(titles(&items), vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn test_list_orders_by_created_at_over_id() {
        let queue = setup();
        let mut later = QueuedOperation::new(insert("B"));
        let mut earlier = QueuedOperation::new(insert("A"));
        assert!(later.id < earlier.id);
        later.created_at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        earlier.created_at = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();

        for item in [&later, &earlier] {
            queue
                .store
                .set_json(StoreName::Queue, &item.id.as_str(), item)
                .await
                .unwrap();
        }

        assert_eq!(titles(&queue.list().await.unwrap()), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_list_tolerates_malformed_entries() {
        let queue = setup();
        let valid = queue.enqueue(insert("A")).await.unwrap();

        let stale = OperationId::new();
        queue
            .store
            .set_json(
                StoreName::Queue,
                &stale.as_str(),
                &json!({"id": stale, "created_at": "2024-05-01T10:00:00Z", "kind": "insert"}),
            )
            .await
            .unwrap();
        queue
            .store
            .set(StoreName::Queue, "junk", b"{not json")
            .await
            .unwrap();
        queue
            .store
            .set_json(StoreName::Queue, "orphan", &json!({"kind": "insert"}))
            .await
            .unwrap();

        let items = queue.list().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, stale);
        assert_eq!(items[0].operation, Operation::Unknown);
        assert_eq!(items[1], valid);
        assert_eq!(queue.count().await.unwrap(), 2);

        let summary = queue.drain(|_item| async { Ok(true) }).await.unwrap();
        assert_eq!(summary.processed, 2);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let queue = setup();
        let queued = queue.enqueue(insert("A")).await.unwrap();

        queue.remove(&queued.id).await.unwrap();
        queue.remove(&queued.id).await.unwrap();
        queue.remove(&OperationId::new()).await.unwrap();
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_halts_on_first_failure_then_resumes() {
        let queue = setup();
        for title in ["A", "B", "C"] {
            queue.enqueue(insert(title)).await.unwrap();
        }

        let seen = RefCell::new(Vec::new());
        let summary = queue
            .drain(|item| {
                let title = titles(std::slice::from_ref(&item)).remove(0);
                seen.borrow_mut().push(title.clone());
                async move { Ok(title != "B") }
            })
            .await
            .unwrap();

        assert_eq!(
            summary,
            DrainSummary {
                processed: 1,
                halted: true
            }
        );
        assert_eq!(*seen.borrow(), vec!["A", "B"]);
        assert_eq!(titles(&queue.list().await.unwrap()), vec!["B", "C"]);

        seen.borrow_mut().clear();
        let summary = queue
            .drain(|item| {
                seen.borrow_mut()
                    .push(titles(std::slice::from_ref(&item)).remove(0));
                async { Ok(true) }
            })
            .await
            .unwrap();

        assert_eq!(
            summary,
            DrainSummary {
                processed: 2,
                halted: false
            }
        );
        assert_eq!(*seen.borrow(), vec!["B", "C"]);
        assert_eq!(queue.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drain_error_stops_and_keeps_item() {
        let queue = setup();
        queue.enqueue(insert("A")).await.unwrap();
        queue.enqueue(insert("B")).await.unwrap();

        let result = queue
            .drain(|_item| async { Err(Error::Transport("connection reset".to_string())) })
            .await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert_eq!(titles(&queue.list().await.unwrap()), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_drain_uses_snapshot() {
        let queue = setup();
        queue.enqueue(insert("A")).await.unwrap();

        let summary = queue
            .drain(|_item| {
                let queue = queue.clone();
                async move {
                    queue.enqueue(insert("late")).await?;
                    Ok::<_, Error>(true)
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(titles(&queue.list().await.unwrap()), vec!["late"]);
    }
}
