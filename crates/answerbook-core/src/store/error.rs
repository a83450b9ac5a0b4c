use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Unauthenticated - sign in again")]
    Unauthenticated,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Batch of {len} writes exceeds the limit of {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to decode document: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl StoreError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        // Precondition failures on create come back with an ALREADY_EXISTS status body
        if body.contains("ALREADY_EXISTS") {
            return StoreError::AlreadyExists(truncated);
        }
        match status.as_u16() {
            401 => StoreError::Unauthenticated,
            403 => StoreError::PermissionDenied(truncated),
            404 => StoreError::NotFound(truncated),
            409 => StoreError::AlreadyExists(truncated),
            429 => StoreError::RateLimited,
            500..=599 => StoreError::Unavailable(truncated),
            _ => StoreError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Whether a retry of the same request could succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::RateLimited | StoreError::Unavailable(_) | StoreError::Network(_)
        )
    }
}
