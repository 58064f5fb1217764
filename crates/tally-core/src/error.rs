//! Error types for the tally categorization engine.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using tally's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for tally operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Expense not found
    #[error("Expense not found: {0}")]
    ExpenseNotFound(uuid::Uuid),

    /// Job not found
    #[error("Job not found: {0}")]
    JobNotFound(uuid::Uuid),

    /// The classification provider rejected the request with HTTP 429.
    ///
    /// Deliberately distinct from [`Error::Inference`]: rate limiting is the
    /// only provider failure that callers retry or propagate unresolved.
    #[error("Rate limited by provider{}", retry_after.map(|t| format!(", retry after {}", t)).unwrap_or_default())]
    RateLimited {
        /// Provider-supplied hint for when the quota resets, if any.
        retry_after: Option<DateTime<Utc>>,
    },

    /// Inference/classification failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a provider rate limit.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimited { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    #[test]
    fn test_error_display_not_found() {
        let err = Error::NotFound("test resource".to_string());
        assert_eq!(err.to_string(), "Not found: test resource");
    }

    #[test]
    fn test_error_display_expense_not_found() {
        let id = Uuid::nil();
        let err = Error::ExpenseNotFound(id);
        assert_eq!(err.to_string(), format!("Expense not found: {}", id));
    }

    #[test]
    fn test_error_display_rate_limited_without_hint() {
        let err = Error::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limited by provider");
    }

    #[test]
    fn test_error_display_rate_limited_with_hint() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 1, 0).unwrap();
        let err = Error::RateLimited {
            retry_after: Some(at),
        };
        assert!(err.to_string().contains("retry after"));
        assert!(err.to_string().contains("2026"));
    }

    #[test]
    fn test_is_rate_limited() {
        assert!(Error::RateLimited { retry_after: None }.is_rate_limited());
        assert!(!Error::Inference("timeout".into()).is_rate_limited());
        assert!(!Error::NotFound("x".into()).is_rate_limited());
    }

    #[test]
    fn test_error_display_inference() {
        let err = Error::Inference("model timeout".to_string());
        assert_eq!(err.to_string(), "Inference error: model timeout");
    }

    #[test]
    fn test_error_display_job() {
        let err = Error::Job("queue full".to_string());
        assert_eq!(err.to_string(), "Job error: queue full");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number");
        assert!(json_err.is_err());

        let err: Error = json_err.unwrap_err().into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
