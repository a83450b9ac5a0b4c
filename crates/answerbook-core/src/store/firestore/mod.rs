//! Firestore REST adapter for `DocumentStore`.
//!
//! All writes go through `documents:commit`, so single creates get the same
//! create-if-absent precondition and server `createdAt` stamp as batches.
//! Live queries are emulated by re-running the query on an interval and
//! emitting a snapshot only when the result set changed.

pub mod value;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use serde_json::{json, Value};
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{
    CollectionPath, Document, DocumentStore, Filter, Query, StoreError, Subscription, Write,
    WriteBatch, CREATED_AT_FIELD,
};
use crate::auth::TokenCell;
use crate::config::RemoteConfig;
use value::{decode_document, encode_fields, encode_value};

// ============================================================================
// Constants
// ============================================================================

/// Base URL for the Firestore REST API
const FIRESTORE_BASE_URL: &str = "https://firestore.googleapis.com/v1";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Firestore document store client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct FirestoreStore {
    client: Client,
    api_key: String,
    documents_root: String,
    token: TokenCell,
    poll_interval: Duration,
}

impl FirestoreStore {
    pub fn new(remote: &RemoteConfig, poll_interval: Duration) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            api_key: remote.api_key.clone(),
            documents_root: format!("projects/{}/databases/(default)/documents", remote.project_id),
            token: TokenCell::new(),
            poll_interval,
        })
    }

    /// Read the identity token from a cell owned by the identity provider,
    /// so refreshed tokens are picked up without touching the store.
    pub fn with_token_cell(mut self, token: TokenCell) -> Self {
        self.token = token;
        self
    }

    /// Set (or clear) the identity token sent with every request.
    /// Shared by all clones of this store.
    pub fn set_token(&self, token: Option<String>) {
        self.token.set(token);
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, StoreError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.token.get() {
            let value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| StoreError::InvalidQuery(format!("Bad token header: {}", e)))?;
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    fn document_name(&self, collection: &CollectionPath, id: &str) -> String {
        format!("{}/{}", self.documents_root, collection.document_path(id))
    }

    fn encode_write(&self, write: &Write) -> Value {
        match write {
            Write::Create {
                collection,
                id,
                fields,
            } => json!({
                "update": {
                    "name": self.document_name(collection, id),
                    "fields": encode_fields(fields),
                },
                "currentDocument": { "exists": false },
                "updateTransforms": [
                    { "fieldPath": CREATED_AT_FIELD, "setToServerValue": "REQUEST_TIME" }
                ],
            }),
            Write::Update {
                collection,
                id,
                fields,
            } => json!({
                "update": {
                    "name": self.document_name(collection, id),
                    "fields": encode_fields(fields),
                },
                "updateMask": { "fieldPaths": fields.keys().collect::<Vec<_>>() },
                "currentDocument": { "exists": true },
            }),
            Write::Delete { collection, id } => json!({
                "delete": self.document_name(collection, id),
            }),
        }
    }

    fn encode_query(query: &Query) -> Value {
        let mut structured = json!({
            "from": [{ "collectionId": query.collection.collection().collection_id() }],
        });
        if let Some(filter) = &query.filter {
            let (field, op, value) = match filter {
                Filter::Equals { field, value } => (field, "EQUAL", encode_value(value)),
                Filter::In { field, values } => (
                    field,
                    "IN",
                    json!({ "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() } }),
                ),
            };
            structured["where"] = json!({
                "fieldFilter": { "field": { "fieldPath": field }, "op": op, "value": value }
            });
        }
        json!({ "structuredQuery": structured })
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>, StoreError> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status().as_u16() == 429 {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(StoreError::from_status(status, &body))
        }
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value, StoreError> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .post(url)
                .query(&[("key", self.api_key.as_str())])
                .headers(self.auth_headers()?)
                .json(body)
                .send()
                .await?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => return Ok(response.json().await?),
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(StoreError::RateLimited);
                    }
                    warn!(url = url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2; // Exponential backoff
                }
            }
        }
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        query.validate()?;
        let url = format!(
            "{}/{}/{}:runQuery",
            FIRESTORE_BASE_URL,
            self.documents_root,
            query.collection.parent()
        );
        let response = self.post(&url, &Self::encode_query(query)).await?;
        parse_run_query_response(&response)
    }
}

/// runQuery streams an array of results; entries without a `document` only
/// carry read times.
fn parse_run_query_response(response: &Value) -> Result<Vec<Document>, StoreError> {
    let items = response
        .as_array()
        .ok_or_else(|| StoreError::InvalidResponse("runQuery did not return an array".to_string()))?;
    items
        .iter()
        .filter_map(|item| item.get("document"))
        .map(decode_document)
        .collect()
}

#[async_trait]
impl DocumentStore for FirestoreStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        batch.validate()?;
        if batch.is_empty() {
            return Ok(());
        }
        let writes: Vec<Value> = batch.writes().iter().map(|w| self.encode_write(w)).collect();
        let url = format!("{}/{}:commit", FIRESTORE_BASE_URL, self.documents_root);
        self.post(&url, &json!({ "writes": writes })).await?;
        debug!(writes = batch.len(), "Committed batch");
        Ok(())
    }

    async fn query(&self, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.run_query(query).await
    }

    async fn subscribe(&self, query: Query) -> Result<Subscription, StoreError> {
        let initial = self.run_query(&query).await?;
        let (sink, subscription) = Subscription::channel();
        sink.send(Ok(initial.clone()));

        let store = self.clone();
        tokio::spawn(async move {
            let mut last = initial;
            let mut ticker = tokio::time::interval(store.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial snapshot is already out
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = sink.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                match store.run_query(&query).await {
                    Ok(docs) => {
                        if docs != last {
                            last = docs.clone();
                            if !sink.send(Ok(docs)) {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(collection = %query.collection, error = %e, "Live query failed, stopping");
                        sink.send(Err(e));
                        break;
                    }
                }
            }
            debug!(collection = %query.collection, "Live query poller stopped");
        });

        Ok(subscription)
    }
}
