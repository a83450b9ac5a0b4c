use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("An account already exists for this email")]
    EmailExists,

    #[error("Invalid email address")]
    InvalidEmail,

    #[error("Password too weak: {0}")]
    WeakPassword(String),

    #[error("Session expired - sign in again")]
    SessionExpired,

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Sign-in method disabled: {0}")]
    OperationNotAllowed(String),

    #[error("Too many attempts - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl AuthError {
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

    /// Map an identity service error response.
    ///
    /// The service reports the reason as an upper-case code in
    /// `error.message`, optionally followed by ` : detail`.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error.message)
            .unwrap_or_default();
        let (code, detail) = match message.split_once(" : ") {
            Some((code, detail)) => (code.trim(), detail.trim()),
            None => (message.trim(), ""),
        };

        match code {
            "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
                AuthError::InvalidCredentials
            }
            "EMAIL_EXISTS" => AuthError::EmailExists,
            "INVALID_EMAIL" | "MISSING_EMAIL" => AuthError::InvalidEmail,
            "WEAK_PASSWORD" => AuthError::WeakPassword(detail.to_string()),
            "TOKEN_EXPIRED" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND" | "INVALID_ID_TOKEN" => {
                AuthError::SessionExpired
            }
            "OPERATION_NOT_ALLOWED" | "ADMIN_ONLY_OPERATION" => AuthError::OperationNotAllowed(code.to_string()),
            c if c.starts_with("TOO_MANY_ATTEMPTS") => AuthError::RateLimited,
            _ => {
                let truncated = Self::truncate_body(body);
                match status.as_u16() {
                    401 | 403 => AuthError::SessionExpired,
                    429 => AuthError::RateLimited,
                    500..=599 => AuthError::ServerError(truncated),
                    _ => AuthError::InvalidResponse(format!("Status {}: {}", status, truncated)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    fn body(message: &str) -> String {
        format!(r#"{{"error":{{"code":400,"message":"{}","errors":[]}}}}"#, message)
    }

    #[test]
    fn test_from_status_reads_error_codes() {
        assert!(matches!(
            AuthError::from_status(StatusCode::BAD_REQUEST, &body("EMAIL_EXISTS")),
            AuthError::EmailExists
        ));
        assert!(matches!(
            AuthError::from_status(StatusCode::BAD_REQUEST, &body("INVALID_LOGIN_CREDENTIALS")),
            AuthError::InvalidCredentials
        ));
        assert!(matches!(
            AuthError::from_status(StatusCode::BAD_REQUEST, &body("TOO_MANY_ATTEMPTS_TRY_LATER : Access blocked")),
            AuthError::RateLimited
        ));
        match AuthError::from_status(
            StatusCode::BAD_REQUEST,
            &body("WEAK_PASSWORD : Password should be at least 6 characters"),
        ) {
            AuthError::WeakPassword(detail) => assert_eq!(detail, "Password should be at least 6 characters"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_status_falls_back_to_status_code() {
        assert!(matches!(
            AuthError::from_status(StatusCode::SERVICE_UNAVAILABLE, "<html>down</html>"),
            AuthError::ServerError(_)
        ));
        assert!(matches!(
            AuthError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            AuthError::RateLimited
        ));
        assert!(matches!(
            AuthError::from_status(StatusCode::IM_A_TEAPOT, &body("SOMETHING_NEW")),
            AuthError::InvalidResponse(_)
        ));
    }
}
