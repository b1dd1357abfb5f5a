//! Error types for the store module.

use thiserror::Error;

use notevault_core::{RecordId, ValidationError};

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A bulk operation (import, wipe, bulk upsert) was rolled back.
    #[error("storage transaction failed: {0}")]
    StorageTransactionFailed(String),

    /// A compare-and-swap write kept losing races against other writers.
    #[error("write to {id} lost {attempts} consecutive races")]
    WriteContention { id: RecordId, attempts: usize },

    /// Record not found.
    #[error("record not found: {0}")]
    NotFound(RecordId),

    /// The record failed invariant checks.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Field serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding store state was poisoned by a panicking writer.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),

    /// A blocking storage task could not be joined.
    #[error("background task failed: {0}")]
    Background(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
