//! Error types for graph sync

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Failures raised by a `GraphStore` backend.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid graph image: {0}")]
    InvalidFormat(String),

    #[error("Graph store lock poisoned")]
    Poisoned,
}

/// Failures raised by the lock manager or its backing store.
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Lock '{key}' is held by another transaction")]
    Conflict { key: String },

    #[error("Lock '{key}' is not held")]
    NotHeld { key: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Lock store unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid lock key: {0}")]
    InvalidKey(String),

    #[error("Lock store lock poisoned")]
    Poisoned,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid lock key: {0}")]
    InvalidLockKey(String),

    #[error("Dependency tag key must not be empty")]
    EmptyDependencyTag,
}

/// Top-level error for one sync invocation.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Reconciliation failed: {0}")]
    Reconciliation(#[source] GraphError),

    #[error("Event carries {count} snapshots; exactly one is processed per transaction")]
    MultiSnapshotRejected { count: usize },

    #[error("Event carries no snapshot")]
    EmptyBatch,

    #[error("Invalid snapshot payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl LockError {
    pub fn code(&self) -> &'static str {
        match self {
            LockError::Conflict { .. } => "LOCK_CONFLICT",
            LockError::NotHeld { .. } => "LOCK_NOT_HELD",
            _ => "LOCK_STORE_ERROR",
        }
    }
}

impl SyncError {
    /// Stable error code for logs and exit summaries
    pub fn code(&self) -> &'static str {
        match self {
            SyncError::Lock(e) => e.code(),
            SyncError::Reconciliation(_) => "RECONCILIATION_FAILED",
            SyncError::MultiSnapshotRejected { .. } => "MULTI_SNAPSHOT_REJECTED",
            SyncError::EmptyBatch => "EMPTY_BATCH",
            SyncError::InvalidPayload(_) => "INVALID_PAYLOAD",
            SyncError::Config(_) => "INVALID_CONFIG",
        }
    }
}
