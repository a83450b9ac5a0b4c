//! Cache host primitives and the in-memory host.
//!
//! The host owns named buckets of (request key → response) entries. Each
//! primitive is atomic on its own; nothing above this layer takes locks.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AssetRequest, AssetResponse, CacheError, CachedAssetInfo};

#[async_trait]
pub trait CacheHost: Send + Sync {
    /// Open a bucket, creating it when missing.
    async fn open(&self, bucket: &str) -> Result<(), CacheError>;

    /// Store a response in a bucket, replacing any previous entry.
    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), CacheError>;

    /// Look a request up across all buckets, oldest bucket first.
    async fn match_request(&self, request: &AssetRequest) -> Result<Option<AssetResponse>, CacheError>;

    /// Bucket names in creation order.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    /// Delete a bucket. Returns false when it did not exist.
    async fn delete(&self, bucket: &str) -> Result<bool, CacheError>;

    /// Make `bucket`'s version the controller of every open client.
    async fn claim_clients(&self, bucket: &str) -> Result<(), CacheError>;

    /// Entries of one bucket, for status display.
    async fn entries(&self, bucket: &str) -> Result<Vec<CachedAssetInfo>, CacheError>;
}

#[derive(Clone)]
struct StoredAsset {
    response: AssetResponse,
    cached_at: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryInner {
    order: Vec<String>,
    buckets: HashMap<String, BTreeMap<String, StoredAsset>>,
    controller: Option<String>,
    fail_open: bool,
    fail_match: bool,
    fail_put: bool,
}

/// Call counters, used to verify which primitives a code path touched.
#[derive(Debug, Default)]
pub struct HostCalls {
    pub open: AtomicUsize,
    pub put: AtomicUsize,
    pub matches: AtomicUsize,
    pub delete: AtomicUsize,
}

/// In-memory cache host. Cheap to clone; clones share the same buckets.
#[derive(Clone, Default)]
pub struct MemoryCacheHost {
    inner: Arc<Mutex<MemoryInner>>,
    calls: Arc<HostCalls>,
}

impl MemoryCacheHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn calls(&self) -> &HostCalls {
        &self.calls
    }

    pub fn match_calls(&self) -> usize {
        self.calls.matches.load(Ordering::SeqCst)
    }

    pub fn controller(&self) -> Option<String> {
        self.lock().controller.clone()
    }

    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    pub fn set_fail_match(&self, fail: bool) {
        self.lock().fail_match = fail;
    }

    pub fn set_fail_put(&self, fail: bool) {
        self.lock().fail_put = fail;
    }
}

#[async_trait]
impl CacheHost for MemoryCacheHost {
    async fn open(&self, bucket: &str) -> Result<(), CacheError> {
        self.calls.open.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if inner.fail_open {
            return Err(CacheError::Open {
                bucket: bucket.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        if !inner.buckets.contains_key(bucket) {
            inner.order.push(bucket.to_string());
            inner.buckets.insert(bucket.to_string(), BTreeMap::new());
        }
        Ok(())
    }

    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), CacheError> {
        self.calls.put.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        if inner.fail_put {
            return Err(CacheError::Put {
                url: request.cache_key(),
                reason: "injected failure".to_string(),
            });
        }
        let entries = inner.buckets.get_mut(bucket).ok_or_else(|| CacheError::Put {
            url: request.cache_key(),
            reason: format!("bucket {} is not open", bucket),
        })?;
        entries.insert(
            request.cache_key(),
            StoredAsset {
                response: response.clone(),
                cached_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn match_request(&self, request: &AssetRequest) -> Result<Option<AssetResponse>, CacheError> {
        self.calls.matches.fetch_add(1, Ordering::SeqCst);
        let inner = self.lock();
        if inner.fail_match {
            return Err(CacheError::Lookup("injected failure".to_string()));
        }
        let key = request.cache_key();
        Ok(inner
            .order
            .iter()
            .filter_map(|name| inner.buckets.get(name))
            .find_map(|entries| entries.get(&key))
            .map(|stored| stored.response.clone()))
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.lock().order.clone())
    }

    async fn delete(&self, bucket: &str) -> Result<bool, CacheError> {
        self.calls.delete.fetch_add(1, Ordering::SeqCst);
        let mut inner = self.lock();
        inner.order.retain(|name| name != bucket);
        Ok(inner.buckets.remove(bucket).is_some())
    }

    async fn claim_clients(&self, bucket: &str) -> Result<(), CacheError> {
        self.lock().controller = Some(bucket.to_string());
        Ok(())
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<CachedAssetInfo>, CacheError> {
        let inner = self.lock();
        Ok(inner
            .buckets
            .get(bucket)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(url, stored)| CachedAssetInfo {
                        url: url.clone(),
                        status: stored.response.status,
                        size: stored.response.body.len(),
                        cached_at: stored.cached_at,
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_match_searches_buckets_in_creation_order() {
        let host = MemoryCacheHost::new();
        let request = AssetRequest::parse("http://localhost/app.js").unwrap();

        host.open("v1").await.unwrap();
        host.open("v2").await.unwrap();
        host.put("v2", &request, &AssetResponse::ok("new")).await.unwrap();
        host.put("v1", &request, &AssetResponse::ok("old")).await.unwrap();

        let hit = host.match_request(&request).await.unwrap().unwrap();
        assert_eq!(hit.body, b"old");
        assert_eq!(host.keys().await.unwrap(), vec!["v1", "v2"]);

        assert!(host.delete("v1").await.unwrap());
        assert!(!host.delete("v1").await.unwrap());
        let hit = host.match_request(&request).await.unwrap().unwrap();
        assert_eq!(hit.body, b"new");
    }

    #[tokio::test]
    async fn test_put_requires_open_bucket() {
        let host = MemoryCacheHost::new();
        let request = AssetRequest::parse("http://localhost/").unwrap();
        assert!(host.put("missing", &request, &AssetResponse::ok("x")).await.is_err());
    }
}
