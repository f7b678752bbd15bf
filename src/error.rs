//! Error types for Tuya Cloud automation operations
//!
//! Provides a typed error taxonomy so callers can distinguish local
//! validation failures from remote API failures, and "ask the user to
//! confirm" from "the IoT platform is down".

use thiserror::Error;

/// Result type alias for Tuya operations
pub type Result<T> = std::result::Result<T, TuyaError>;

/// Error types for Tuya Cloud automation operations
#[derive(Error, Debug)]
pub enum TuyaError {
    /// Token acquisition or refresh failure
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// 401/403 persisted after a forced token refresh
    #[error("Unauthorized after token refresh: {0}")]
    Unauthorized(String),

    /// Non-2xx response (or failure envelope) after retries exhausted
    #[error("Tuya API error {status}: {body}")]
    Api {
        /// HTTP status code of the final response
        status: u16,
        /// Response body as returned by the platform
        body: String,
    },

    /// Rate limit still in effect after the backoff retries
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Missing or unresolvable device id, property code, or rule id,
    /// detected locally before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Mutating call attempted without caller confirmation
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP transport errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl TuyaError {
    /// Create an authentication error
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        TuyaError::Auth(msg.into())
    }

    /// Create an unauthorized error
    pub fn unauthorized<S: Into<String>>(msg: S) -> Self {
        TuyaError::Unauthorized(msg.into())
    }

    /// Create an API error from a status code and response body
    pub fn api<S: Into<String>>(status: u16, body: S) -> Self {
        TuyaError::Api {
            status,
            body: body.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limited<S: Into<String>>(msg: S) -> Self {
        TuyaError::RateLimited(msg.into())
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        TuyaError::Validation(msg.into())
    }

    /// Create a permission denied error
    pub fn permission_denied<S: Into<String>>(msg: S) -> Self {
        TuyaError::PermissionDenied(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        TuyaError::Config(msg.into())
    }

    /// Check if the error is transient and a retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            TuyaError::RateLimited(_) => true,
            TuyaError::Http(e) => e.is_timeout() || e.is_connect(),
            TuyaError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Check if the error is authentication-related
    pub fn is_auth_error(&self) -> bool {
        matches!(self, TuyaError::Auth(_) | TuyaError::Unauthorized(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_carries_status_and_body() {
        let err = TuyaError::api(502, "bad gateway");
        assert_eq!(err.to_string(), "Tuya API error 502: bad gateway");
        assert!(err.is_retryable());
        assert!(!err.is_auth_error());
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = TuyaError::validation("rule_id is required");
        assert!(!err.is_retryable());
    }

    #[test]
    fn auth_errors_are_flagged() {
        assert!(TuyaError::auth("token request failed").is_auth_error());
        assert!(TuyaError::unauthorized("still 401").is_auth_error());
        assert!(!TuyaError::permission_denied("confirm required").is_auth_error());
    }
}
