use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use super::AuthError;

/// A signed-in user as the rest of the app sees it. The user id is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub email: Option<String>,
    pub is_anonymous: bool,
}

impl Identity {
    /// Short label for status lines.
    pub fn label(&self) -> String {
        match (&self.email, self.is_anonymous) {
            (Some(email), false) => email.clone(),
            _ => format!("anonymous ({})", self.user_id),
        }
    }
}

/// Identity service consumed by the app.
///
/// Every successful sign-in, refresh or sign-out is also published on the
/// `watch` channel; the app reacts to that channel rather than to return
/// values.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn current(&self) -> Option<Identity>;

    fn watch(&self) -> watch::Receiver<Option<Identity>>;

    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError>;

    async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError>;

    /// Sign in with a third-party identity token, e.g. a Google id token.
    async fn sign_in_with_idp(&self, provider_id: &str, id_token: &str) -> Result<Identity, AuthError>;

    async fn refresh(&self) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

/// Bearer token shared between the identity provider that writes it and the
/// HTTP clients that send it. Clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct TokenCell {
    inner: Arc<RwLock<Option<String>>>,
}

impl TokenCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<String> {
        self.inner.read().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn set(&self, token: Option<String>) {
        *self.inner.write().unwrap_or_else(|p| p.into_inner()) = token;
    }
}
