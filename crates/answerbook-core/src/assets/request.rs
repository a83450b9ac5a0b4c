use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// An outgoing request seen by the interceptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub method: String,
    pub url: Url,
}

impl AssetRequest {
    pub fn get(url: Url) -> Self {
        Self {
            method: "GET".to_string(),
            url,
        }
    }

    pub fn parse(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::get(Url::parse(url)?))
    }

    /// Cache key: the absolute URL without its fragment.
    pub fn cache_key(&self) -> String {
        let mut url = self.url.clone();
        url.set_fragment(None);
        url.to_string()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    /// Only GET responses are stored or served from the cache.
    pub fn is_cacheable(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
    }
}

/// A response body plus the metadata needed to replay it offline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    #[serde(skip)]
    pub body: Vec<u8>,
}

impl AssetResponse {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Listing entry for one cached asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedAssetInfo {
    pub url: String,
    pub status: u16,
    pub size: usize,
    pub cached_at: DateTime<Utc>,
}

impl CachedAssetInfo {
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}
