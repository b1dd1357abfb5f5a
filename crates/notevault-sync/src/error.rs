//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No reachable relay: offline, sync disabled, or the check failed.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The relay answered but refused the request.
    #[error("relay rejected request: {0}")]
    RemoteRejected(String),

    /// A relay call did not complete in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] notevault_store::StoreError),

    /// A reconciliation cycle is already running.
    #[error("a reconciliation cycle is already in flight")]
    CycleInProgress,

    /// The configured endpoint cannot be used.
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
}

impl SyncError {
    /// True for failures that should feed connection backoff.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            SyncError::NetworkUnavailable(_) | SyncError::Timeout(_) | SyncError::RemoteRejected(_)
        )
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
