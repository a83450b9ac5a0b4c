//! Network tier behind the asset cache.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};

use super::{AssetRequest, AssetResponse, FetchError};

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[async_trait]
pub trait Network: Send + Sync {
    /// Perform the request. Any HTTP status is a response; only transport
    /// failures are errors.
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError>;
}

/// reqwest-backed network.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &AssetRequest) -> Result<AssetResponse, FetchError> {
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchError::Unavailable(format!("Bad method {}: {}", request.method, e)))?;
        let response = self
            .client
            .request(method, request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response.bytes().await?.to_vec();

        Ok(AssetResponse {
            status,
            headers,
            body,
        })
    }
}
