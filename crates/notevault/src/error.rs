//! Error types for the notebook facade.

use notevault_core::{CoreError, RecordId, ValidationError};
use notevault_crypto::CryptoError;
use notevault_store::StoreError;
use notevault_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during notebook operations.
#[derive(Debug, Error)]
pub enum NotebookError {
    /// Key derivation, encryption, decryption or PIN failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Malformed export document.
    #[error("document error: {0}")]
    Core(#[from] CoreError),

    /// A record or export document broke the record invariants.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// No note with this id belongs to the unlocked identity.
    #[error("note not found: {0}")]
    NoteNotFound(RecordId),

    /// The note has no pending conflict to resolve.
    #[error("note {0} has no conflict")]
    NoConflict(RecordId),

    /// No PIN session has been set up on this device.
    #[error("no PIN session configured")]
    NoSession,

    /// A blocking task panicked or was cancelled.
    #[error("background task failed: {0}")]
    Background(String),
}

impl NotebookError {
    /// True when the PIN was wrong; the caller may simply prompt again.
    pub fn is_wrong_pin(&self) -> bool {
        matches!(self, NotebookError::Crypto(CryptoError::WrongPin))
    }
}

/// Result type for notebook operations.
pub type Result<T> = std::result::Result<T, NotebookError>;
