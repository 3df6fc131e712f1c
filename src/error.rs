//! Error taxonomy for the bridge

use crate::model::AppId;
use thiserror::Error;

/// Errors that can occur in bridge operations
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Record not found: app {0}")]
    RecordNotFound(AppId),

    #[error("Attribute unresolved: no attribute {label} on {etype}")]
    AttributeUnresolved { etype: String, label: String },

    #[error("Could not coerce {key}: {reason}")]
    ValueCoercion { key: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl BridgeError {
    pub fn coercion(key: impl Into<String>, reason: impl ToString) -> Self {
        BridgeError::ValueCoercion {
            key: key.into(),
            reason: reason.to_string(),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for BridgeError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        BridgeError::LockPoisoned(err.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
