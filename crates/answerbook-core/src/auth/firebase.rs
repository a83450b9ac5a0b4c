//! Firebase Auth REST adapter for `IdentityProvider`.
//!
//! Sign-in flows go through the Identity Toolkit endpoints; token refresh
//! goes through the Secure Token endpoint. The session (minus the refresh
//! token) is persisted in the cache directory and restored on startup.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{AuthError, Identity, IdentityProvider, RefreshTokenStore, Session, SessionData, TokenCell};
use crate::config::RemoteConfig;

// ============================================================================
// Constants
// ============================================================================

/// Base URL for Identity Toolkit account endpoints
const IDENTITY_BASE_URL: &str = "https://identitytoolkit.googleapis.com/v1";

/// Secure Token endpoint for refresh-token exchange
const TOKEN_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Redirect URI sent with identity-token sign-in. Only checked against the
/// project's authorized domains.
const IDP_REQUEST_URI: &str = "http://localhost";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    user_id: String,
}

fn expires_at(expires_in: &str) -> Result<chrono::DateTime<Utc>, AuthError> {
    let seconds: i64 = expires_in
        .parse()
        .map_err(|_| AuthError::InvalidResponse(format!("Bad expiresIn value: {}", expires_in)))?;
    Ok(Utc::now() + chrono::Duration::seconds(seconds))
}

impl SignInResponse {
    fn into_session(self, anonymous: bool) -> Result<(SessionData, String), AuthError> {
        let data = SessionData {
            user_id: self.local_id,
            email: self.email.filter(|e| !e.is_empty()),
            is_anonymous: anonymous,
            id_token: self.id_token,
            expires_at: expires_at(&self.expires_in)?,
        };
        Ok((data, self.refresh_token))
    }
}

pub struct FirebaseAuth {
    client: Client,
    api_key: String,
    session: Mutex<Session>,
    refresh_token: Mutex<Option<String>>,
    token: TokenCell,
    identity_tx: watch::Sender<Option<Identity>>,
}

impl FirebaseAuth {
    pub fn new(remote: &RemoteConfig, cache_dir: PathBuf) -> Result<Self, AuthError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        let (identity_tx, _) = watch::channel(None);

        Ok(Self {
            client,
            api_key: remote.api_key.clone(),
            session: Mutex::new(Session::new(cache_dir)),
            refresh_token: Mutex::new(None),
            token: TokenCell::new(),
            identity_tx,
        })
    }

    /// The cell that always holds the current id token.
    pub fn token_cell(&self) -> TokenCell {
        self.token.clone()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn stored_refresh_token(&self) -> MutexGuard<'_, Option<String>> {
        self.refresh_token.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Restore the persisted session, refreshing it when it is close to
    /// expiry. Returns `None` when there is nothing usable to restore.
    pub async fn restore(&self) -> Result<Option<Identity>, AuthError> {
        let data = {
            let mut session = self.session();
            let loaded = session.load().map_err(|e| AuthError::Storage(e.to_string()))?;
            if !loaded {
                return Ok(None);
            }
            session.data.clone()
        };
        let Some(data) = data else {
            return Ok(None);
        };

        if !data.needs_refresh() {
            debug!(user_id = %data.user_id, minutes_left = data.minutes_until_expiry(), "Restored session");
            self.token.set(Some(data.id_token.clone()));
            let identity = data.identity();
            self.identity_tx.send_replace(Some(identity.clone()));
            return Ok(Some(identity));
        }

        match RefreshTokenStore::get(&data.user_id) {
            Ok(refresh_token) => {
                *self.stored_refresh_token() = Some(refresh_token);
                match self.refresh().await {
                    Ok(identity) => Ok(Some(identity)),
                    Err(AuthError::SessionExpired) => {
                        warn!(user_id = %data.user_id, "Stored session was revoked");
                        self.forget();
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
            Err(e) => {
                warn!(user_id = %data.user_id, error = %e, "No refresh token for expired session");
                self.forget();
                Ok(None)
            }
        }
    }

    /// Refresh the id token if it is about to expire.
    pub async fn ensure_fresh(&self) -> Result<(), AuthError> {
        let needs_refresh = self.session().data.as_ref().map(SessionData::needs_refresh);
        match needs_refresh {
            Some(true) => self.refresh().await.map(|_| ()),
            Some(false) => Ok(()),
            None => Err(AuthError::NotSignedIn),
        }
    }

    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.session().data.as_ref().map(SessionData::minutes_until_expiry)
    }

    /// Install a new session: keychain, disk, token cell, then watchers.
    /// Persistence failures are logged; the in-memory session still works.
    fn establish(&self, data: SessionData, refresh_token: String) -> Identity {
        if let Err(e) = RefreshTokenStore::store(&data.user_id, &refresh_token) {
            warn!(error = %e, "Could not store refresh token; session will not survive expiry");
        }
        *self.stored_refresh_token() = Some(refresh_token);

        self.token.set(Some(data.id_token.clone()));
        let identity = data.identity();
        {
            let mut session = self.session();
            session.update(data);
            if let Err(e) = session.save() {
                warn!(error = %e, "Failed to persist session");
            }
        }

        self.identity_tx.send_replace(Some(identity.clone()));
        identity
    }

    /// Drop all local session state without notifying watchers.
    fn forget(&self) {
        let user_id = self.session().data.as_ref().map(|d| d.user_id.clone());
        if let Some(user_id) = user_id {
            if let Err(e) = RefreshTokenStore::delete(&user_id) {
                debug!(error = %e, "No refresh token to delete");
            }
        }
        if let Err(e) = self.session().clear() {
            warn!(error = %e, "Failed to remove session file");
        }
        *self.stored_refresh_token() = None;
        self.token.set(None);
    }

    async fn post_accounts(&self, endpoint: &str, body: &Value) -> Result<SignInResponse, AuthError> {
        let url = format!("{}/accounts:{}", IDENTITY_BASE_URL, endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_status(status, &body));
        }
        response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse {} response: {}", endpoint, e)))
    }
}

#[async_trait]
impl IdentityProvider for FirebaseAuth {
    fn current(&self) -> Option<Identity> {
        self.identity_tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError> {
        let response = self
            .post_accounts("signUp", &json!({ "returnSecureToken": true }))
            .await?;
        let (data, refresh_token) = response.into_session(true)?;
        info!(user_id = %data.user_id, "Signed in anonymously");
        Ok(self.establish(data, refresh_token))
    }

    async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let (data, refresh_token) = self.post_accounts("signUp", &body).await?.into_session(false)?;
        info!(user_id = %data.user_id, "Registered account");
        Ok(self.establish(data, refresh_token))
    }

    async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let body = json!({ "email": email, "password": password, "returnSecureToken": true });
        let (data, refresh_token) = self
            .post_accounts("signInWithPassword", &body)
            .await?
            .into_session(false)?;
        info!(user_id = %data.user_id, "Signed in with password");
        Ok(self.establish(data, refresh_token))
    }

    async fn sign_in_with_idp(&self, provider_id: &str, id_token: &str) -> Result<Identity, AuthError> {
        let body = json!({
            "postBody": format!("id_token={}&providerId={}", id_token, provider_id),
            "requestUri": IDP_REQUEST_URI,
            "returnIdpCredential": true,
            "returnSecureToken": true,
        });
        let (data, refresh_token) = self
            .post_accounts("signInWithIdp", &body)
            .await?
            .into_session(false)?;
        info!(user_id = %data.user_id, provider = provider_id, "Signed in with identity provider");
        Ok(self.establish(data, refresh_token))
    }

    async fn refresh(&self) -> Result<Identity, AuthError> {
        let refresh_token = self.stored_refresh_token().clone().ok_or(AuthError::NotSignedIn)?;
        let previous = self.session().data.clone();

        let response = self
            .client
            .post(TOKEN_URL)
            .query(&[("key", self.api_key.as_str())])
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::from_status(status, &body));
        }
        let refreshed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(format!("Failed to parse token response: {}", e)))?;

        let (email, is_anonymous) = previous
            .filter(|p| p.user_id == refreshed.user_id)
            .map(|p| (p.email, p.is_anonymous))
            .unwrap_or((None, false));
        let data = SessionData {
            user_id: refreshed.user_id,
            email,
            is_anonymous,
            id_token: refreshed.id_token,
            expires_at: expires_at(&refreshed.expires_in)?,
        };
        debug!(user_id = %data.user_id, "Refreshed id token");
        Ok(self.establish(data, refreshed.refresh_token))
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.forget();
        self.identity_tx.send_replace(None);
        info!("Signed out");
        Ok(())
    }
}
