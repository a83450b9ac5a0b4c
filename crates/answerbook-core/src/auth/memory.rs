use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use super::{AuthError, Identity, IdentityProvider};
use crate::utils::new_document_id;

#[derive(Default)]
struct Accounts {
    // email -> (user id, password)
    by_email: HashMap<String, (String, String)>,
    sign_ins: usize,
}

/// In-process identity provider. Accounts live only as long as the value.
#[derive(Clone)]
pub struct MemoryIdentityProvider {
    accounts: Arc<Mutex<Accounts>>,
    identity_tx: Arc<watch::Sender<Option<Identity>>>,
}

impl Default for MemoryIdentityProvider {
    fn default() -> Self {
        let (identity_tx, _) = watch::channel(None);
        Self {
            accounts: Arc::new(Mutex::new(Accounts::default())),
            identity_tx: Arc::new(identity_tx),
        }
    }
}

impl MemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn accounts(&self) -> MutexGuard<'_, Accounts> {
        self.accounts.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Number of successful sign-ins of any kind.
    pub fn sign_in_count(&self) -> usize {
        self.accounts().sign_ins
    }

    fn publish(&self, identity: Identity) -> Identity {
        self.accounts().sign_ins += 1;
        self.identity_tx.send_replace(Some(identity.clone()));
        identity
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentityProvider {
    fn current(&self) -> Option<Identity> {
        self.identity_tx.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<Identity>> {
        self.identity_tx.subscribe()
    }

    async fn sign_in_anonymously(&self) -> Result<Identity, AuthError> {
        Ok(self.publish(Identity {
            user_id: new_document_id(),
            email: None,
            is_anonymous: true,
        }))
    }

    async fn register(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        if !email.contains('@') {
            return Err(AuthError::InvalidEmail);
        }
        if password.chars().count() < 6 {
            return Err(AuthError::WeakPassword("Password should be at least 6 characters".to_string()));
        }
        let user_id = {
            let mut accounts = self.accounts();
            if accounts.by_email.contains_key(email) {
                return Err(AuthError::EmailExists);
            }
            let user_id = new_document_id();
            accounts
                .by_email
                .insert(email.to_string(), (user_id.clone(), password.to_string()));
            user_id
        };
        Ok(self.publish(Identity {
            user_id,
            email: Some(email.to_string()),
            is_anonymous: false,
        }))
    }

    async fn login(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let user_id = match self.accounts().by_email.get(email) {
            Some((user_id, stored)) if stored == password => user_id.clone(),
            _ => return Err(AuthError::InvalidCredentials),
        };
        Ok(self.publish(Identity {
            user_id,
            email: Some(email.to_string()),
            is_anonymous: false,
        }))
    }

    async fn sign_in_with_idp(&self, provider_id: &str, id_token: &str) -> Result<Identity, AuthError> {
        if id_token.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }
        Ok(self.publish(Identity {
            user_id: format!("{}:{}", provider_id, id_token),
            email: None,
            is_anonymous: false,
        }))
    }

    async fn refresh(&self) -> Result<Identity, AuthError> {
        self.current().ok_or(AuthError::NotSignedIn)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.identity_tx.send_replace(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_then_login() {
        let provider = MemoryIdentityProvider::new();
        let registered = provider.register("reader@example.com", "secret1").await.unwrap();
        assert!(matches!(
            provider.register("reader@example.com", "secret1").await,
            Err(AuthError::EmailExists)
        ));
        assert!(matches!(
            provider.login("reader@example.com", "wrong").await,
            Err(AuthError::InvalidCredentials)
        ));
        let logged_in = provider.login("reader@example.com", "secret1").await.unwrap();
        assert_eq!(registered.user_id, logged_in.user_id);
    }

    #[tokio::test]
    async fn test_watch_sees_sign_in_and_out() {
        let provider = MemoryIdentityProvider::new();
        let mut rx = provider.watch();
        let identity = provider.sign_in_anonymously().await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().as_ref(), Some(&identity));

        provider.sign_out().await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_none());
        assert!(matches!(provider.refresh().await, Err(AuthError::NotSignedIn)));
    }
}
