//! Error types.
//!
//! Two families live here:
//!
//! * [`Error`]: failures of the text pipeline plumbing (config files,
//!   stopword / lexicon persistence).  Ordinary noisy input never produces
//!   one: the pipeline answers empty or malformed text with safe defaults.
//! * [`ApiError`]: the structured failure of an API call.  Every variant
//!   renders to the wire-compatible shape `{"status": "error", "msg": ...}`
//!   via [`ApiError::to_value`].

use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised by configuration loading and on-disk persistence.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    /// The content-filter lexicon could not be persisted.
    #[error("Lexicon error: {0}")]
    Lexicon(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Structured failure of an API request.
///
/// Client-side 4xx responses are terminal; 5xx, rate limiting and
/// connection problems are retried by the client before one of these is
/// returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("Bad request parameters")]
    BadRequest,

    #[error("Invalid API key")]
    Unauthorized,

    #[error("Access forbidden")]
    Forbidden,

    #[error("Resource not found")]
    NotFound,

    /// Any other 4xx other than 429.
    #[error("Client error (HTTP {status})")]
    Client { status: u16 },

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Server error (HTTP {status})")]
    Server { status: u16 },

    #[error("Connection error: {0}")]
    Connection(String),

    /// The response body was not valid JSON.  Never retried.
    #[error("Invalid JSON response: {0}")]
    Decode(String),

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,

    /// The upstream answered 2xx but the payload carries `"status": "error"`.
    /// The payload is kept verbatim.
    #[error("{msg}")]
    Upstream { msg: String, payload: Value },
}

impl ApiError {
    /// Map a non-success HTTP status to its terminal error.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => ApiError::BadRequest,
            401 => ApiError::Unauthorized,
            403 => ApiError::Forbidden,
            404 => ApiError::NotFound,
            429 => ApiError::RateLimited,
            500..=599 => ApiError::Server { status },
            _ => ApiError::Client { status },
        }
    }

    /// Human-readable message placed in the `msg` field.
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Whether the request that produced this error is worth repeating.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited | ApiError::Server { .. } | ApiError::Connection(_)
        )
    }

    /// Render the structured error object.
    ///
    /// An [`ApiError::Upstream`] error is returned as the payload the server
    /// sent, untouched.
    pub fn to_value(&self) -> Value {
        match self {
            ApiError::Upstream { payload, .. } => payload.clone(),
            other => json!({ "status": "error", "msg": other.message() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::from_status(400), ApiError::BadRequest);
        assert_eq!(ApiError::from_status(401), ApiError::Unauthorized);
        assert_eq!(ApiError::from_status(403), ApiError::Forbidden);
        assert_eq!(ApiError::from_status(404), ApiError::NotFound);
        assert_eq!(ApiError::from_status(429), ApiError::RateLimited);
        assert_eq!(ApiError::from_status(503), ApiError::Server { status: 503 });
        assert_eq!(ApiError::from_status(418), ApiError::Client { status: 418 });
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ApiError::Server { status: 500 }.is_retryable());
        assert!(ApiError::RateLimited.is_retryable());
        assert!(ApiError::Connection("reset".into()).is_retryable());
        assert!(!ApiError::NotFound.is_retryable());
        assert!(!ApiError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_structured_shape() {
        let v = ApiError::NotFound.to_value();
        assert_eq!(v["status"], "error");
        assert_eq!(v["msg"], "Resource not found");

        let payload = json!({"status": "error", "msg": "user suspended", "code": 63});
        let upstream = ApiError::Upstream { msg: "user suspended".into(), payload: payload.clone() };
        assert_eq!(upstream.to_value(), payload);
    }
}
