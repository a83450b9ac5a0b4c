//! Filesystem cache host.
//!
//! Layout under the root directory:
//!
//! ```text
//! controller.json                  version currently controlling clients
//! installed.json                   version whose install last completed
//! buckets/<bucket-hash>/bucket.json  bucket name + creation time
//! buckets/<bucket-hash>/<key-hash>.json  response metadata
//! buckets/<bucket-hash>/<key-hash>.body  response body
//! ```
//!
//! Metadata is written last and atomically (temp file + rename), so an entry
//! is visible only once its body is complete.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{AssetRequest, AssetResponse, CacheError, CacheHost, CachedAssetInfo, WorkerState};

const BUCKETS_DIR: &str = "buckets";
const BUCKET_META_FILE: &str = "bucket.json";
const CONTROLLER_FILE: &str = "controller.json";
const INSTALLED_FILE: &str = "installed.json";

#[derive(Debug, Serialize, Deserialize)]
struct BucketMeta {
    name: String,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EntryMeta {
    url: String,
    cached_at: DateTime<Utc>,
    size: usize,
    response: AssetResponse,
}

#[derive(Debug, Serialize, Deserialize)]
struct ControllerMeta {
    bucket: String,
    claimed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct InstalledMeta {
    version: String,
    installed_at: DateTime<Utc>,
}

fn hash_name(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)
}

pub struct FsCacheHost {
    root: PathBuf,
}

impl FsCacheHost {
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        std::fs::create_dir_all(root.join(BUCKETS_DIR))?;
        Ok(Self { root })
    }

    fn bucket_dir(&self, bucket: &str) -> PathBuf {
        self.root.join(BUCKETS_DIR).join(&hash_name(bucket)[..16])
    }

    fn entry_paths(&self, bucket: &str, key: &str) -> (PathBuf, PathBuf) {
        let dir = self.bucket_dir(bucket);
        let hash = hash_name(key);
        (dir.join(format!("{}.json", hash)), dir.join(format!("{}.body", hash)))
    }

    fn read_buckets(&self) -> Result<Vec<BucketMeta>, CacheError> {
        let mut buckets = Vec::new();
        for entry in std::fs::read_dir(self.root.join(BUCKETS_DIR))? {
            let path = entry?.path().join(BUCKET_META_FILE);
            match std::fs::read_to_string(&path) {
                Ok(contents) => match serde_json::from_str::<BucketMeta>(&contents) {
                    Ok(meta) => buckets.push(meta),
                    Err(e) => warn!(path = %path.display(), error = %e, "Skipping bucket with corrupt metadata"),
                },
                Err(e) => debug!(path = %path.display(), error = %e, "Skipping directory without bucket metadata"),
            }
        }
        buckets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.name.cmp(&b.name)));
        Ok(buckets)
    }

    fn read_entry(&self, bucket: &str, key: &str) -> Result<Option<AssetResponse>, CacheError> {
        let (meta_path, body_path) = self.entry_paths(bucket, key);
        if !meta_path.exists() {
            return Ok(None);
        }
        let meta: EntryMeta = serde_json::from_str(&std::fs::read_to_string(&meta_path)?)?;
        let mut response = meta.response;
        response.body = std::fs::read(&body_path)?;
        Ok(Some(response))
    }

    /// Version recorded by the last `claim_clients`.
    pub fn controller(&self) -> Result<Option<String>, CacheError> {
        let path = self.root.join(CONTROLLER_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let meta: ControllerMeta = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(Some(meta.bucket))
    }

    /// Remember that `version` finished installing, even if nothing was cached.
    pub fn record_installed(&self, version: &str) -> Result<(), CacheError> {
        let meta = InstalledMeta {
            version: version.to_string(),
            installed_at: Utc::now(),
        };
        write_atomic(
            &self.root.join(INSTALLED_FILE),
            serde_json::to_string_pretty(&meta)?.as_bytes(),
        )?;
        Ok(())
    }

    pub fn installed_version(&self) -> Result<Option<String>, CacheError> {
        let path = self.root.join(INSTALLED_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let meta: InstalledMeta = serde_json::from_str(&std::fs::read_to_string(path)?)?;
        Ok(Some(meta.version))
    }

    /// Lifecycle position of `version` as recorded on disk by earlier runs.
    pub fn recorded_state(&self, version: &str) -> Result<WorkerState, CacheError> {
        if self.controller()?.as_deref() == Some(version) {
            return Ok(WorkerState::Active);
        }
        let installed = self.installed_version()?.as_deref() == Some(version)
            || self.read_buckets()?.iter().any(|b| b.name == version);
        Ok(if installed { WorkerState::Installed } else { WorkerState::Idle })
    }
}

#[async_trait]
impl CacheHost for FsCacheHost {
    async fn open(&self, bucket: &str) -> Result<(), CacheError> {
        let dir = self.bucket_dir(bucket);
        let meta_path = dir.join(BUCKET_META_FILE);
        if meta_path.exists() {
            return Ok(());
        }
        let open_err = |e: std::io::Error| CacheError::Open {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        };
        std::fs::create_dir_all(&dir).map_err(open_err)?;
        let meta = BucketMeta {
            name: bucket.to_string(),
            created_at: Utc::now(),
        };
        write_atomic(&meta_path, serde_json::to_string_pretty(&meta)?.as_bytes()).map_err(open_err)?;
        debug!(bucket = bucket, "Created cache bucket");
        Ok(())
    }

    async fn put(&self, bucket: &str, request: &AssetRequest, response: &AssetResponse) -> Result<(), CacheError> {
        let key = request.cache_key();
        if !self.bucket_dir(bucket).join(BUCKET_META_FILE).exists() {
            return Err(CacheError::Put {
                url: key,
                reason: format!("bucket {} is not open", bucket),
            });
        }
        let (meta_path, body_path) = self.entry_paths(bucket, &key);
        let meta = EntryMeta {
            url: key.clone(),
            cached_at: Utc::now(),
            size: response.body.len(),
            response: response.clone(),
        };
        let put_err = |e: std::io::Error| CacheError::Put {
            url: key.clone(),
            reason: e.to_string(),
        };
        write_atomic(&body_path, &response.body).map_err(put_err)?;
        write_atomic(&meta_path, serde_json::to_string_pretty(&meta)?.as_bytes()).map_err(put_err)?;
        Ok(())
    }

    async fn match_request(&self, request: &AssetRequest) -> Result<Option<AssetResponse>, CacheError> {
        let key = request.cache_key();
        for bucket in self.read_buckets()? {
            if let Some(response) = self.read_entry(&bucket.name, &key)? {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }

    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.read_buckets()?.into_iter().map(|b| b.name).collect())
    }

    async fn delete(&self, bucket: &str) -> Result<bool, CacheError> {
        let dir = self.bucket_dir(bucket);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir).map_err(|e| CacheError::Delete {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        })?;
        Ok(true)
    }

    async fn claim_clients(&self, bucket: &str) -> Result<(), CacheError> {
        let meta = ControllerMeta {
            bucket: bucket.to_string(),
            claimed_at: Utc::now(),
        };
        let contents = serde_json::to_string_pretty(&meta)?;
        write_atomic(&self.root.join(CONTROLLER_FILE), contents.as_bytes())
            .map_err(|e| CacheError::Claim(e.to_string()))
    }

    async fn entries(&self, bucket: &str) -> Result<Vec<CachedAssetInfo>, CacheError> {
        let dir = self.bucket_dir(bucket);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut entries = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_entry_meta = path.extension().map(|e| e == "json").unwrap_or(false)
                && path.file_name().map(|n| n != BUCKET_META_FILE).unwrap_or(false);
            if !is_entry_meta {
                continue;
            }
            let meta: EntryMeta = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
            entries.push(CachedAssetInfo {
                url: meta.url,
                status: meta.response.status,
                size: meta.size,
                cached_at: meta.cached_at,
            });
        }
        entries.sort_by(|a, b| a.url.cmp(&b.url));
        Ok(entries)
    }
}
