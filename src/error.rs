//! Error types for the SafeTNet sync core
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized to the UI layer as display strings.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// A local precondition failed; the gateway was never contacted.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// Transport-level failure: timeout, connection refused, TLS.
    #[error("Gateway unavailable: {0}")]
    GatewayUnavailable(String),

    /// The gateway answered with a non-2xx status (other than the
    /// idempotent delete-404 case, which is not an error).
    #[error("Gateway rejected request ({status}): {message}")]
    GatewayRejected { status: u16, message: String },

    #[error("Alert not found: {0}")]
    AlertNotFound(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The store worker has shut down and its mailbox is gone.
    #[error("Alert store is closed")]
    StoreClosed,

    #[error("Scheduler error: {0}")]
    Scheduler(String),
}

impl serde::Serialize for SyncError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl SyncError {
    /// True when the failure is worth a later retry (the gateway could
    /// not be reached at all, as opposed to having rejected the request).
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::GatewayUnavailable(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
