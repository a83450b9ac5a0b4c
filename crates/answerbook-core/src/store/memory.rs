//! In-process document store with live listeners.
//!
//! Collections are ordered by document id, the same default order the remote
//! store uses, so projections look identical against either backend. Every
//! commit validates all preconditions before applying anything, then
//! re-evaluates each live query touching the written collections and pushes
//! a fresh snapshot to listeners whose result set changed.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;

use super::{
    CollectionPath, Document, DocumentStore, Fields, Query, StoreError, Subscription,
    SubscriptionSink, Write, WriteBatch, CREATED_AT_FIELD,
};

struct Listener {
    query: Query,
    sink: SubscriptionSink,
    last: Vec<Document>,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<CollectionPath, BTreeMap<String, Fields>>,
    listeners: Vec<Listener>,
    offline: bool,
    fail_commits: usize,
    commits: usize,
    queries: usize,
}

impl Inner {
    fn run_query(&self, query: &Query) -> Vec<Document> {
        self.collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| query.matches(fields))
                    .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn check_preconditions(&self, writes: &[Write]) -> Result<(), StoreError> {
        // Track creates/deletes earlier in the same batch
        let mut created: HashSet<(&CollectionPath, &str)> = HashSet::new();
        let mut deleted: HashSet<(&CollectionPath, &str)> = HashSet::new();

        for write in writes {
            let key = (write.collection(), write.id());
            let stored = self
                .collections
                .get(write.collection())
                .map(|docs| docs.contains_key(write.id()))
                .unwrap_or(false);
            let exists = (stored && !deleted.contains(&key)) || created.contains(&key);

            match write {
                Write::Create { .. } => {
                    if exists {
                        return Err(StoreError::AlreadyExists(
                            write.collection().document_path(write.id()),
                        ));
                    }
                    created.insert(key);
                    deleted.remove(&key);
                }
                Write::Update { .. } => {
                    if !exists {
                        return Err(StoreError::NotFound(
                            write.collection().document_path(write.id()),
                        ));
                    }
                }
                Write::Delete { .. } => {
                    created.remove(&key);
                    deleted.insert(key);
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, writes: Vec<Write>) -> HashSet<CollectionPath> {
        let stamp = Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        let mut touched = HashSet::new();

        for write in writes {
            touched.insert(write.collection().clone());
            match write {
                Write::Create {
                    collection,
                    id,
                    mut fields,
                } => {
                    fields.insert(CREATED_AT_FIELD.to_string(), stamp.clone());
                    self.collections.entry(collection).or_default().insert(id, fields);
                }
                Write::Update {
                    collection,
                    id,
                    fields,
                } => {
                    if let Some(doc) = self
                        .collections
                        .get_mut(&collection)
                        .and_then(|docs| docs.get_mut(&id))
                    {
                        doc.extend(fields);
                    }
                }
                Write::Delete { collection, id } => {
                    if let Some(docs) = self.collections.get_mut(&collection) {
                        docs.remove(&id);
                    }
                }
            }
        }
        touched
    }

    fn notify(&mut self, touched: &HashSet<CollectionPath>) {
        let mut listeners = std::mem::take(&mut self.listeners);
        listeners.retain(|l| !l.sink.is_closed());

        for listener in listeners.iter_mut() {
            if !touched.contains(&listener.query.collection) {
                continue;
            }
            let result = self.run_query(&listener.query);
            if result != listener.last {
                listener.last = result.clone();
                listener.sink.send(Ok(result));
            }
        }
        self.listeners = listeners;
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline {
            Err(StoreError::Unavailable("store is offline".to_string()))
        } else {
            Ok(())
        }
    }
}

/// Cheap to clone; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves the data consistent: every
        // commit validates before mutating.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make every operation fail with `Unavailable` until switched back.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Fail the next `count` commits with `Unavailable`.
    pub fn fail_next_commits(&self, count: usize) {
        self.lock().fail_commits = count;
    }

    /// Number of documents in one collection.
    pub fn len(&self, collection: &CollectionPath) -> usize {
        self.lock().collections.get(collection).map(|d| d.len()).unwrap_or(0)
    }

    /// Number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.lock().collections.values().map(|d| d.len()).sum()
    }

    /// Number of live (not cancelled) listeners.
    pub fn listener_count(&self) -> usize {
        let mut inner = self.lock();
        inner.listeners.retain(|l| !l.sink.is_closed());
        inner.listeners.len()
    }

    /// Number of successful commits so far.
    pub fn commit_count(&self) -> usize {
        self.lock().commits
    }

    /// Number of one-shot queries served so far.
    pub fn query_count(&self) -> usize {
        self.lock().queries
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.validate()?;
        let mut inner = self.lock();
        inner.ensure_online()?;
        if inner.fail_commits > 0 {
            inner.fail_commits -= 1;
            return Err(StoreError::Unavailable("injected commit failure".to_string()));
        }

        inner.check_preconditions(batch.writes())?;
        let write_count = batch.len();
        let touched = inner.apply(batch.into_writes());
        inner.commits += 1;
        debug!(writes = write_count, collections = touched.len(), "Committed batch");
        inner.notify(&touched);
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let mut inner = self.lock();
        inner.ensure_online()?;
        inner.queries += 1;
        Ok(inner.run_query(query))
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        query.validate()?;
        let mut inner = self.lock();
        inner.ensure_online()?;

        let (sink, subscription) = Subscription::channel();
        let initial = inner.run_query(&query);
        sink.send(Ok(initial.clone()));
        inner.listeners.push(Listener {
            query,
            sink,
            last: initial,
        });
        Ok(subscription)
    }
}
