use thiserror::Error;

/// Failure of a cache host primitive. Never surfaced past the interceptor.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to open cache bucket {bucket}: {reason}")]
    Open { bucket: String, reason: String },

    #[error("Cache lookup failed: {0}")]
    Lookup(String),

    #[error("Failed to store {url} in cache: {reason}")]
    Put { url: String, reason: String },

    #[error("Failed to delete cache bucket {bucket}: {reason}")]
    Delete { bucket: String, reason: String },

    #[error("Failed to claim clients: {0}")]
    Claim(String),

    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt cache metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

/// Failure to reach the network at all. HTTP error statuses are responses,
/// not fetch errors.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unavailable: {0}")]
    Unavailable(String),
}

/// Lifecycle misuse of the asset cache manager.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },
}
