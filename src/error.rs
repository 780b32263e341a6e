// 🚨 Error Taxonomy
// Validation failures happen at construction time, store failures at I/O time.
// "Not found" is an absence (Option), never an error.

use thiserror::Error;

// ============================================================================
// VALIDATION ERROR
// ============================================================================

/// Malformed construction input (e.g. corporate agreement without organization)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}

// ============================================================================
// STORE ERROR
// ============================================================================

/// Backend read/write/query failure. Never retried internally.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A persisted document that does not match its record schema
    #[error("malformed document {collection}/{id}: {reason}")]
    MalformedDocument {
        collection: String,
        id: String,
        reason: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

// ============================================================================
// UMBRELLA ERROR
// ============================================================================

#[derive(Debug, Error)]
pub enum ClaError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
