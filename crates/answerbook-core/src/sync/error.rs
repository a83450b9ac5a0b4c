use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

/// Input rejected before any remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Book name cannot be empty")]
    EmptyBookName,

    #[error("Answer text cannot be empty")]
    EmptyAnswerText,

    #[error("Enter at least one answer")]
    EmptyBatch,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Not signed in")]
    NoSession,

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// A remote call failed. The message is the summary shown to the user;
    /// the store error is only kept as the source.
    #[error("Failed to {action}")]
    Remote {
        action: &'static str,
        #[source]
        source: StoreError,
    },
}

impl SyncError {
    pub fn remote(action: &'static str, source: StoreError) -> Self {
        SyncError::Remote { action, source }
    }
}

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("Failed to check for the default book")]
    Check(#[source] StoreError),

    #[error("Failed to create the default book")]
    Create(#[source] StoreError),
}
