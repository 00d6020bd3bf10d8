//! Error types for the remote service client.

use thiserror::Error;

/// Failures a remote call can report.
///
/// Callers treat both kinds as transient: the retry policy sleeps a
/// kind-specific cooldown and tries again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// The server is throttling requests.
    #[error("rate limited")]
    RateLimited,

    /// Any other remote failure: rejected credentials, unknown resource,
    /// malformed response, transport failure.
    #[error("service error: {message}")]
    Service { message: String },
}

impl ServiceError {
    /// Build a [`ServiceError::Service`] from any message.
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.status() == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
            return Self::RateLimited;
        }
        Self::service(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::service(format!("malformed response: {}", err))
    }
}
