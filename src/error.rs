//! Error types for turbostore
//!
//! Provides a unified error type for all operations.
//!
//! `StoreError` is `Clone` so one bootstrap outcome can be handed to every
//! caller awaiting the shared initialization handle.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for turbostore operations
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Engine failed to open: {0}")]
    EngineOpen(String),

    #[error("Failed to create collection '{name}': {reason}")]
    CollectionCreate { name: String, reason: String },

    #[error("Store has not finished initializing")]
    NotReady,

    #[error("Engine is already open")]
    AlreadyOpen,

    // -------------------------------------------------------------------------
    // Persistence Errors
    // -------------------------------------------------------------------------
    #[error("Save failed: {0}")]
    Save(String),

    #[error("Engine callback for {operation} did not fire within {after:?}")]
    CallbackTimeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("Snapshot corruption detected: {0}")]
    Corruption(String),

    // -------------------------------------------------------------------------
    // Scheduling Errors
    // -------------------------------------------------------------------------
    #[error("Chain aborted by an earlier failed unit")]
    ChainAborted,

    #[error("Scheduler is closed")]
    SchedulerClosed,

    #[error("Unit of work panicked: {0}")]
    UnitPanicked(String),

    #[error("Unit of work was dropped before completing")]
    CompletionDropped,

    // -------------------------------------------------------------------------
    // Document Errors
    // -------------------------------------------------------------------------
    #[error("Unique constraint violated on {collection}.{field} for value {value}")]
    UniqueViolation {
        collection: String,
        field: String,
        value: String,
    },

    #[error("Document {id} not found in {collection}")]
    DocumentNotFound { collection: String, id: u64 },

    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for StoreError {
    fn from(err: bincode::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
