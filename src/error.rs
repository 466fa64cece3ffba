//! Error taxonomy of the sync engine.
//!
//! None of these are user-fatal. Fetch errors mark a source as partial, push
//! errors trigger a reconnect, malformed payloads are dropped at the boundary.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status { endpoint: String, status: u16 },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("push transport error: {0}")]
    Transport(String),

    #[error("no session credential available")]
    NoCredential,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    pub fn malformed(detail: impl Into<String>) -> Self {
        SyncError::Malformed(detail.into())
    }

    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        SyncError::Timeout { operation: operation.into(), after }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Malformed(err.to_string())
    }
}

pub type SyncResult<T> = std::result::Result<T, SyncError>;
