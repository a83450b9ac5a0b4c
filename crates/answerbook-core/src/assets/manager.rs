//! Versioned asset cache lifecycle and request interception.
//!
//! One `AssetCacheManager` is one worker generation, identified by its cache
//! version tag. Lifecycle:
//!
//! ```text
//! Idle --install--> Installing --> Installed --activate--> Activating --> Active
//! ```
//!
//! Only an `Active` manager answers requests from the cache; before that
//! every request goes to the network. Buckets of other versions are retired
//! during activation.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use url::Url;

use super::{AssetRequest, AssetResponse, CacheError, CacheHost, FetchError, FsCacheHost, LifecycleError, Network};
use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Installing,
    Installed,
    Activating,
    Active,
}

impl WorkerState {
    fn label(&self) -> &'static str {
        match self {
            WorkerState::Idle => "idle",
            WorkerState::Installing => "installing",
            WorkerState::Installed => "installed",
            WorkerState::Activating => "activating",
            WorkerState::Active => "active",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The externally configurable surface of the asset cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub version: String,
    pub origin: Url,
    pub manifest: Vec<String>,
    pub bypass_hosts: Vec<String>,
}

impl CacheSettings {
    pub fn from_config(config: &Config) -> Result<Self, url::ParseError> {
        Ok(Self {
            version: config.cache_version.clone(),
            origin: Url::parse(&config.origin)?,
            manifest: config.manifest.clone(),
            bypass_hosts: config.bypass_hosts.clone(),
        })
    }

    /// Whether requests to this host must always go to the network.
    pub fn is_bypassed(&self, host: &str) -> bool {
        !host.is_empty() && self.bypass_hosts.iter().any(|entry| host.contains(entry.as_str()))
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Bypass host, sent straight to the network
    Bypass,
    /// Served from a cache bucket
    Cache,
    /// Cache miss, not cacheable, or cache failure; fetched live
    Network,
}

#[derive(Debug, Clone)]
pub struct Served {
    pub response: AssetResponse,
    pub source: ResponseSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetFailure {
    pub url: String,
    pub reason: String,
}

/// Per-asset outcome of an install.
#[derive(Debug, Clone, Default)]
pub struct InstallReport {
    pub version: String,
    pub bucket_opened: bool,
    pub cached: Vec<String>,
    pub failed: Vec<AssetFailure>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.bucket_opened && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ActivationReport {
    pub version: String,
    pub retired: Vec<String>,
    pub failed: Vec<AssetFailure>,
    pub claimed: bool,
}

pub struct AssetCacheManager {
    settings: CacheSettings,
    host: Arc<dyn CacheHost>,
    network: Arc<dyn Network>,
    state: WorkerState,
}

impl AssetCacheManager {
    pub fn new(settings: CacheSettings, host: Arc<dyn CacheHost>, network: Arc<dyn Network>) -> Self {
        Self {
            settings,
            host,
            network,
            state: WorkerState::Idle,
        }
    }

    /// Manager for a worker generation whose earlier lifecycle steps ran in
    /// another process.
    pub fn resume(
        settings: CacheSettings,
        host: Arc<dyn CacheHost>,
        network: Arc<dyn Network>,
        state: WorkerState,
    ) -> Self {
        Self {
            state,
            ..Self::new(settings, host, network)
        }
    }

    /// Manager for `settings.version` in the state recorded on disk.
    pub fn restore(
        settings: CacheSettings,
        host: Arc<FsCacheHost>,
        network: Arc<dyn Network>,
    ) -> Result<Self, CacheError> {
        let state = host.recorded_state(&settings.version)?;
        Ok(Self::resume(settings, host, network, state))
    }

    /// Manager for the version that currently controls clients, if any.
    ///
    /// A newer version that is installed but not yet activated waits behind
    /// this one, so fetches must still go through the controller.
    pub fn restore_controlling(
        settings: &CacheSettings,
        host: Arc<FsCacheHost>,
        network: Arc<dyn Network>,
    ) -> Result<Option<Self>, CacheError> {
        let Some(version) = host.controller()? else {
            return Ok(None);
        };
        let settings = CacheSettings {
            version,
            ..settings.clone()
        };
        Ok(Some(Self::resume(settings, host, network, WorkerState::Active)))
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn version(&self) -> &str {
        &self.settings.version
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn host(&self) -> &Arc<dyn CacheHost> {
        &self.host
    }

    fn check_state(&self, expected: WorkerState, action: &'static str) -> Result<(), LifecycleError> {
        if self.state == expected {
            Ok(())
        } else {
            warn!(action = action, state = %self.state, "Invalid cache lifecycle transition");
            Err(LifecycleError::InvalidTransition {
                action,
                state: self.state.label(),
            })
        }
    }

    /// Precache the manifest into this version's bucket.
    ///
    /// Every asset is an independent attempt; failures are logged and
    /// reported but never abort the install. A bucket that cannot be opened
    /// leaves the cache empty and the install still completes.
    pub async fn install(&mut self) -> Result<InstallReport, LifecycleError> {
        self.check_state(WorkerState::Idle, "install")?;
        self.state = WorkerState::Installing;
        info!(version = %self.settings.version, "Installing asset cache");

        let mut report = InstallReport {
            version: self.settings.version.clone(),
            ..Default::default()
        };

        match self.host.open(&self.settings.version).await {
            Ok(()) => {
                report.bucket_opened = true;
                for entry in &self.settings.manifest {
                    match self.precache(entry).await {
                        Ok(url) => report.cached.push(url),
                        Err(failure) => {
                            error!(url = %failure.url, reason = %failure.reason, "Failed to cache asset during install");
                            report.failed.push(failure);
                        }
                    }
                }
            }
            Err(e) => {
                error!(version = %self.settings.version, error = %e, "Cache open failed during install");
            }
        }

        self.state = WorkerState::Installed;
        info!(
            version = %self.settings.version,
            cached = report.cached.len(),
            failed = report.failed.len(),
            "Asset cache installed"
        );
        Ok(report)
    }

    async fn precache(&self, entry: &str) -> Result<String, AssetFailure> {
        let failure = |url: &str, reason: String| AssetFailure {
            url: url.to_string(),
            reason,
        };

        let url = self
            .settings
            .origin
            .join(entry)
            .map_err(|e| failure(entry, format!("invalid manifest entry: {}", e)))?;
        let request = AssetRequest::get(url);
        let key = request.cache_key();

        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| failure(&key, e.to_string()))?;
        if !response.is_success() {
            return Err(failure(&key, format!("HTTP {}", response.status)));
        }
        self.host
            .put(&self.settings.version, &request, &response)
            .await
            .map_err(|e| failure(&key, e.to_string()))?;

        debug!(url = %key, size = response.body.len(), "Cached asset");
        Ok(key)
    }

    /// Retire every bucket but this version's and take control of clients.
    pub async fn activate(&mut self) -> Result<ActivationReport, LifecycleError> {
        self.check_state(WorkerState::Installed, "activate")?;
        self.state = WorkerState::Activating;
        info!(version = %self.settings.version, "Activating asset cache");

        let mut report = ActivationReport {
            version: self.settings.version.clone(),
            ..Default::default()
        };

        match self.host.keys().await {
            Ok(names) => {
                for name in names.into_iter().filter(|n| n != &self.settings.version) {
                    info!(bucket = %name, "Deleting old cache");
                    match self.host.delete(&name).await {
                        Ok(_) => report.retired.push(name),
                        Err(e) => {
                            error!(bucket = %name, error = %e, "Failed to delete old cache");
                            report.failed.push(AssetFailure {
                                url: name,
                                reason: e.to_string(),
                            });
                        }
                    }
                }
            }
            Err(e) => error!(error = %e, "Failed to list cache buckets during activation"),
        }

        match self.host.claim_clients(&self.settings.version).await {
            Ok(()) => report.claimed = true,
            Err(e) => error!(error = %e, "Failed to claim clients"),
        }

        self.state = WorkerState::Active;
        info!(version = %self.settings.version, retired = report.retired.len(), "Activation complete");
        Ok(report)
    }

    /// Answer one request: bypass hosts go live, then cache, then network.
    ///
    /// Network failure after a cache miss is returned as an error. A failing
    /// cache lookup falls back to the network.
    pub async fn intercept(&self, request: &AssetRequest) -> Result<Served, FetchError> {
        if self.settings.is_bypassed(request.host()) {
            let response = self.network.fetch(request).await?;
            return Ok(Served {
                response,
                source: ResponseSource::Bypass,
            });
        }

        if self.state != WorkerState::Active || !request.is_cacheable() {
            return self.fetch_live(request).await;
        }

        match self.host.match_request(request).await {
            Ok(Some(response)) => {
                debug!(url = %request.url, "Serving from cache");
                Ok(Served {
                    response,
                    source: ResponseSource::Cache,
                })
            }
            Ok(None) => self.fetch_live(request).await,
            Err(e) => {
                error!(url = %request.url, error = %e, "Cache match failed, fetching from network");
                self.fetch_live(request).await
            }
        }
    }

    async fn fetch_live(&self, request: &AssetRequest) -> Result<Served, FetchError> {
        match self.network.fetch(request).await {
            Ok(response) => Ok(Served {
                response,
                source: ResponseSource::Network,
            }),
            Err(e) => {
                error!(url = %request.url, error = %e, "Network fetch failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryCacheHost;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Network stub serving fixed bodies; unknown URLs fail as offline.
    #[derive(Default)]
    struct StubNetwork {
        pages: HashMap<String, AssetResponse>,
        calls: AtomicUsize,
    }

    impl StubNetwork {
        fn with(urls: &[(&str, u16)]) -> Self {
            let pages = urls
                .iter()
                .map(|(url, status)| {
                    let mut response = AssetResponse::ok(format!("live {}", url));
                    response.status = *status;
                    (url.to_string(), response)
                })
                .collect();
            Self {
                pages,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Network for StubNetwork {
        async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.pages
                .get(&request.cache_key())
                .cloned()
                .ok_or_else(|| FetchError::Unavailable(request.cache_key()))
        }
    }

    fn settings(version: &str, manifest: &[&str]) -> CacheSettings {
        CacheSettings {
            version: version.to_string(),
            origin: Url::parse("http://localhost:5173/").unwrap(),
            manifest: manifest.iter().map(|s| s.to_string()).collect(),
            bypass_hosts: vec!["googleapis.com".to_string(), "unpkg.com".to_string()],
        }
    }

    #[tokio::test]
    async fn test_install_is_best_effort_per_asset() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[
            ("http://localhost:5173/index.html", 200),
            ("http://localhost:5173/style.css", 404),
        ]));
        let mut manager = AssetCacheManager::new(
            settings("v1", &["./index.html", "./style.css", "./script.js"]),
            host.clone(),
            network,
        );

        let report = manager.install().await.unwrap();
        assert!(report.bucket_opened);
        assert_eq!(report.cached, vec!["http://localhost:5173/index.html"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].reason, "HTTP 404");
        assert!(!report.is_complete());
        assert_eq!(manager.state(), WorkerState::Installed);
        // One bucket, one stored response per successful fetch
        assert_eq!(host.calls().open.load(Ordering::SeqCst), 1);
        assert_eq!(host.calls().put.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_install_survives_bucket_open_failure() {
        let host = Arc::new(MemoryCacheHost::new());
        host.set_fail_open(true);
        let network = Arc::new(StubNetwork::default());
        let mut manager = AssetCacheManager::new(settings("v1", &["./"]), host.clone(), network.clone());

        let report = manager.install().await.unwrap();
        assert!(!report.bucket_opened);
        assert_eq!(network.calls.load(Ordering::SeqCst), 0);
        assert_eq!(host.calls().put.load(Ordering::SeqCst), 0);
        assert_eq!(manager.state(), WorkerState::Installed);
        assert!(manager.activate().await.is_ok());
    }

    #[tokio::test]
    async fn test_lifecycle_rejects_out_of_order_steps() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::default());
        let mut manager = AssetCacheManager::new(settings("v1", &[]), host, network);

        assert_eq!(
            manager.activate().await.unwrap_err(),
            LifecycleError::InvalidTransition {
                action: "activate",
                state: "idle"
            }
        );
        manager.install().await.unwrap();
        assert!(manager.install().await.is_err());
        manager.activate().await.unwrap();
        assert_eq!(manager.state(), WorkerState::Active);
    }

    #[tokio::test]
    async fn test_activation_retires_other_versions_only() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[("http://localhost:5173/index.html", 200)]));

        let mut v1 = AssetCacheManager::new(settings("v1", &["./index.html"]), host.clone(), network.clone());
        v1.install().await.unwrap();
        v1.activate().await.unwrap();
        host.open("stray").await.unwrap();

        let mut v2 = AssetCacheManager::new(settings("v2", &["./index.html"]), host.clone(), network);
        v2.install().await.unwrap();
        // Installing v2 leaves v1 in place while v1 still controls
        assert_eq!(host.keys().await.unwrap(), vec!["v1", "stray", "v2"]);

        let deletes_before = host.calls().delete.load(Ordering::SeqCst);
        let report = v2.activate().await.unwrap();
        assert_eq!(report.retired, vec!["v1", "stray"]);
        assert!(report.claimed);
        assert_eq!(host.calls().delete.load(Ordering::SeqCst) - deletes_before, 2);
        assert_eq!(host.keys().await.unwrap(), vec!["v2"]);
        assert_eq!(host.controller(), Some("v2".to_string()));
    }

    #[tokio::test]
    async fn test_intercept_bypass_never_consults_cache() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[(
            "https://firestore.googleapis.com/v1/projects/demo",
            200,
        )]));
        let mut manager = AssetCacheManager::new(settings("v1", &[]), host.clone(), network);
        manager.install().await.unwrap();
        manager.activate().await.unwrap();

        let request = AssetRequest::parse("https://firestore.googleapis.com/v1/projects/demo").unwrap();
        for _ in 0..3 {
            let served = manager.intercept(&request).await.unwrap();
            assert_eq!(served.source, ResponseSource::Bypass);
        }
        let cdn = AssetRequest::parse("https://unpkg.com/lib.js").unwrap();
        assert!(manager.intercept(&cdn).await.is_err());
        assert_eq!(host.match_calls(), 0);
    }

    #[tokio::test]
    async fn test_intercept_cache_first_then_network() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[
            ("http://localhost:5173/index.html", 200),
            ("http://localhost:5173/extra.json", 200),
        ]));
        let mut manager = AssetCacheManager::new(settings("v1", &["./index.html"]), host.clone(), network.clone());
        manager.install().await.unwrap();
        manager.activate().await.unwrap();
        let after_install = network.calls.load(Ordering::SeqCst);

        let cached = AssetRequest::parse("http://localhost:5173/index.html").unwrap();
        let served = manager.intercept(&cached).await.unwrap();
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(network.calls.load(Ordering::SeqCst), after_install);

        let miss = AssetRequest::parse("http://localhost:5173/extra.json").unwrap();
        let served = manager.intercept(&miss).await.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        // Runtime responses are not written back
        assert!(host.match_request(&miss).await.unwrap().is_none());

        // Miss plus network failure propagates
        let offline = AssetRequest::parse("http://localhost:5173/nowhere").unwrap();
        assert!(manager.intercept(&offline).await.is_err());
    }

    #[tokio::test]
    async fn test_intercept_falls_back_when_lookup_fails() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[("http://localhost:5173/index.html", 200)]));
        let mut manager = AssetCacheManager::new(settings("v1", &["./index.html"]), host.clone(), network);
        manager.install().await.unwrap();
        manager.activate().await.unwrap();

        host.set_fail_match(true);
        let request = AssetRequest::parse("http://localhost:5173/index.html").unwrap();
        let served = manager.intercept(&request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(served.response.body, b"live http://localhost:5173/index.html");
    }

    #[tokio::test]
    async fn test_intercept_before_activation_goes_live() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[("http://localhost:5173/index.html", 200)]));
        let mut manager = AssetCacheManager::new(settings("v1", &["./index.html"]), host.clone(), network);
        manager.install().await.unwrap();

        let request = AssetRequest::parse("http://localhost:5173/index.html").unwrap();
        let served = manager.intercept(&request).await.unwrap();
        assert_eq!(served.source, ResponseSource::Network);
        assert_eq!(host.match_calls(), 0);
    }

    #[tokio::test]
    async fn test_resume_continues_lifecycle() {
        let host = Arc::new(MemoryCacheHost::new());
        let network = Arc::new(StubNetwork::with(&[("http://localhost:5173/index.html", 200)]));
        let mut first = AssetCacheManager::new(settings("v2", &["./index.html"]), host.clone(), network.clone());
        first.install().await.unwrap();

        let mut resumed =
            AssetCacheManager::resume(settings("v2", &["./index.html"]), host.clone(), network, WorkerState::Installed);
        resumed.activate().await.unwrap();
        let request = AssetRequest::parse("http://localhost:5173/index.html").unwrap();
        assert_eq!(resumed.intercept(&request).await.unwrap().source, ResponseSource::Cache);
    }

    #[test]
    fn test_bypass_matches_host_substrings() {
        let settings = settings("v1", &[]);
        assert!(settings.is_bypassed("identitytoolkit.googleapis.com"));
        assert!(settings.is_bypassed("unpkg.com"));
        assert!(!settings.is_bypassed("localhost"));
        assert!(!settings.is_bypassed(""));
    }
}
