//! Error types for notevault core.

use thiserror::Error;

use crate::types::{IdentityId, RecordId};

/// Core errors for identifier parsing and document encoding.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Violations of the record invariants.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("record {record} belongs to identity {actual}, expected {expected}")]
    IdentityMismatch {
        record: RecordId,
        expected: IdentityId,
        actual: IdentityId,
    },

    #[error("record {0} carries a conflict snapshot but is marked synced")]
    ConflictWhileSynced(RecordId),

    #[error("record {0} is deleted but has no deletedAt")]
    TombstoneMissingDeletedAt(RecordId),

    #[error("record {0} has deletedAt but is not deleted")]
    DeletedAtWithoutTombstone(RecordId),

    #[error("record {id}: updatedAt {updated_at} precedes createdAt {created_at}")]
    UpdatedBeforeCreated {
        id: RecordId,
        created_at: i64,
        updated_at: i64,
    },

    #[error("record {id}: malformed {field}")]
    MalformedField { id: RecordId, field: &'static str },

    #[error("unsupported export version: {0}")]
    UnsupportedExportVersion(u32),
}
