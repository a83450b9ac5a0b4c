//! Offline asset cache: versioned buckets, precache on install, retire old
//! versions on activate, cache-first interception with network fallback.

mod error;
mod fs;
mod host;
mod manager;
mod network;
mod request;

pub use error::{CacheError, FetchError, LifecycleError};
pub use fs::FsCacheHost;
pub use host::{CacheHost, HostCalls, MemoryCacheHost};
pub use manager::{
    ActivationReport, AssetCacheManager, AssetFailure, CacheSettings, InstallReport, ResponseSource, Served,
    WorkerState,
};
pub use network::{HttpNetwork, Network};
pub use request::{AssetRequest, AssetResponse, CachedAssetInfo};
