use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "answerbook";

/// Refresh tokens in the OS keychain, one entry per user id.
pub struct RefreshTokenStore;

impl RefreshTokenStore {
    pub fn store(user_id: &str, refresh_token: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, user_id).context("Failed to create keyring entry")?;
        entry
            .set_password(refresh_token)
            .context("Failed to store refresh token in keychain")?;
        Ok(())
    }

    pub fn get(user_id: &str) -> Result<String> {
        let entry = Entry::new(SERVICE_NAME, user_id).context("Failed to create keyring entry")?;
        entry
            .get_password()
            .context("Failed to retrieve refresh token from keychain")
    }

    pub fn delete(user_id: &str) -> Result<()> {
        let entry = Entry::new(SERVICE_NAME, user_id).context("Failed to create keyring entry")?;
        entry
            .delete_credential()
            .context("Failed to delete refresh token from keychain")?;
        Ok(())
    }
}
