//! Live in-memory mirror of one remote query.
//!
//! A projection owns at most one subscription. Every snapshot replaces the
//! whole item list in store order. Re-subscribing cancels the previous
//! subscription before the new one is requested, and a generation counter
//! checked under the state lock keeps a late snapshot from a cancelled
//! subscription out of the projection and out of the event channel.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{ProjectionScope, SyncError, SyncEvent};
use crate::store::{Document, DocumentStore, Query};

struct Shared {
    generation: u64,
    active: bool,
}

pub struct Projection<T> {
    scope: ProjectionScope,
    shared: Arc<Mutex<Shared>>,
    items: Arc<watch::Sender<Vec<T>>>,
    current: Option<CancellationToken>,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|p| p.into_inner())
}

/// Decode every document, skipping (and logging) the ones that do not fit.
fn decode_all<T: DeserializeOwned>(scope: ProjectionScope, docs: &[Document]) -> Vec<T> {
    docs.iter()
        .filter_map(|doc| match doc.decode::<T>() {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(scope = %scope, id = %doc.id, error = %e, "Skipping malformed document");
                None
            }
        })
        .collect()
}

impl<T> Projection<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(scope: ProjectionScope) -> Self {
        let (items, _) = watch::channel(Vec::new());
        Self {
            scope,
            shared: Arc::new(Mutex::new(Shared {
                generation: 0,
                active: false,
            })),
            items: Arc::new(items),
            current: None,
        }
    }

    /// Current items, in store order.
    pub fn items(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    /// Receiver that sees every replacement of the item list.
    pub fn watch(&self) -> watch::Receiver<Vec<T>> {
        self.items.subscribe()
    }

    /// Whether a subscription is attached and has not failed.
    pub fn is_active(&self) -> bool {
        lock(&self.shared).active
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared).generation
    }

    /// Detach from the current subscription and clear the items.
    /// Idempotent.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
        let mut shared = lock(&self.shared);
        shared.generation += 1;
        shared.active = false;
        self.items.send_replace(Vec::new());
    }

    /// Replace the current subscription with a live query.
    ///
    /// `to_event` builds the event sent after each applied snapshot.
    pub async fn subscribe<F>(
        &mut self,
        store: &dyn DocumentStore,
        query: Query,
        events: mpsc::UnboundedSender<SyncEvent>,
        to_event: F,
    ) -> Result<(), SyncError>
    where
        F: Fn(Vec<T>) -> SyncEvent + Send + 'static,
    {
        self.cancel();
        let generation = self.generation();

        let mut subscription = store.subscribe(query).await.map_err(|e| {
            error!(scope = %self.scope, error = %e, "Failed to subscribe");
            SyncError::remote("load data", e)
        })?;

        lock(&self.shared).active = true;
        self.current = Some(subscription.cancel_handle());

        let scope = self.scope;
        let shared = Arc::clone(&self.shared);
        let items = Arc::clone(&self.items);
        tokio::spawn(async move {
            while let Some(snapshot) = subscription.next().await {
                match snapshot {
                    Ok(docs) => {
                        let decoded: Vec<T> = decode_all(scope, &docs);
                        let guard = lock(&shared);
                        if guard.generation != generation {
                            break;
                        }
                        debug!(scope = %scope, count = decoded.len(), "Applying snapshot");
                        items.send_replace(decoded.clone());
                        if events.send(to_event(decoded)).is_err() {
                            debug!(scope = %scope, "Event receiver dropped");
                        }
                    }
                    Err(e) => {
                        error!(scope = %scope, error = %e, "Live query failed");
                        let mut guard = lock(&shared);
                        if guard.generation == generation {
                            guard.active = false;
                            let _ = events.send(SyncEvent::SubscriptionFailed {
                                scope,
                                message: e.to_string(),
                            });
                        }
                        break;
                    }
                }
            }
            debug!(scope = %scope, generation = generation, "Projection task finished");
        });

        Ok(())
    }
}

impl<T> Drop for Projection<T> {
    fn drop(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Answer, BOOK_ID_FIELD};
    use crate::store::{Collection, CollectionPath, Filter, MemoryStore, StoreError};
    use std::time::Duration;

    fn answers() -> CollectionPath {
        CollectionPath::new("app", "u1", Collection::Answers)
    }

    fn by_book(book_id: &str) -> Query {
        Query::filtered(answers(), Filter::equals(BOOK_ID_FIELD, book_id))
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> SyncEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel closed")
    }

    fn answer_event(book_id: &'static str) -> impl Fn(Vec<Answer>) -> SyncEvent + Send + 'static {
        move |answers| SyncEvent::AnswersChanged {
            book_id: book_id.to_string(),
            answers,
        }
    }

    #[tokio::test]
    async fn test_snapshots_replace_items() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut projection: Projection<Answer> = Projection::new(ProjectionScope::Answers);

        projection
            .subscribe(&store, by_book("b1"), tx, answer_event("b1"))
            .await
            .unwrap();
        assert!(matches!(next_event(&mut rx).await, SyncEvent::AnswersChanged { answers, .. } if answers.is_empty()));

        store
            .create(&answers(), Answer::new_fields("b1", "Yes."))
            .await
            .unwrap();
        match next_event(&mut rx).await {
            SyncEvent::AnswersChanged { answers, .. } => assert_eq!(answers[0].text, "Yes."),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(projection.items().len(), 1);
        assert!(projection.is_active());
    }

    #[tokio::test]
    async fn test_resubscribe_cancels_previous() {
        let store = MemoryStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut projection: Projection<Answer> = Projection::new(ProjectionScope::Answers);

        projection
            .subscribe(&store, by_book("a"), tx.clone(), answer_event("a"))
            .await
            .unwrap();
        next_event(&mut rx).await;
        projection
            .subscribe(&store, by_book("b"), tx, answer_event("b"))
            .await
            .unwrap();
        assert!(matches!(next_event(&mut rx).await, SyncEvent::AnswersChanged { book_id, .. } if book_id == "b"));

        store.create(&answers(), Answer::new_fields("a", "old")).await.unwrap();
        store.create(&answers(), Answer::new_fields("b", "new")).await.unwrap();
        match next_event(&mut rx).await {
            SyncEvent::AnswersChanged { book_id, answers } => {
                assert_eq!(book_id, "b");
                assert_eq!(answers[0].text, "new");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(store.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_cancel_clears_and_is_idempotent() {
        let store = MemoryStore::new();
        store.create(&answers(), Answer::new_fields("b1", "x")).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut projection: Projection<Answer> = Projection::new(ProjectionScope::Answers);
        projection
            .subscribe(&store, by_book("b1"), tx, answer_event("b1"))
            .await
            .unwrap();
        next_event(&mut rx).await;
        assert_eq!(projection.items().len(), 1);

        projection.cancel();
        projection.cancel();
        assert!(projection.items().is_empty());
        assert!(!projection.is_active());
        assert_eq!(store.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_failure_is_summarized() {
        let store = MemoryStore::new();
        store.set_offline(true);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut projection: Projection<Answer> = Projection::new(ProjectionScope::Answers);
        let err = projection
            .subscribe(&store, by_book("b1"), tx, answer_event("b1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Remote { source: StoreError::Unavailable(_), .. }));
        assert!(!projection.is_active());
    }
}
