//! # Notevault Core
//!
//! Pure primitives for notevault: the encrypted record model, identifiers,
//! wall-clock handling, record validation and the export document format.
//!
//! This crate contains no I/O, no storage, no networking and no key material.
//! Every ciphertext field it touches is an opaque bundle produced elsewhere.
//!
//! ## Key Types
//!
//! - [`Record`] - The unit of sync: one encrypted note plus its sync metadata
//! - [`RemoteRecord`] - The shape of a record as the relay stores it
//! - [`EncryptedField`] - An independent `{ciphertext, iv, authTag}` bundle
//! - [`RecordId`] / [`IdentityId`] - 128-bit identifiers, hex on the wire
//! - [`Clock`] - Injectable millisecond wall clock
//!
//! ## Timestamps
//!
//! `updatedAt` is strictly monotonic per record across local edits. All
//! writers go through [`next_updated_at`] so that a stalled or rewound clock
//! can never produce a timestamp that is not greater than the previous one.

pub mod error;
pub mod export;
pub mod record;
pub mod time;
pub mod types;
pub mod validation;

pub use error::{CoreError, ValidationError};
pub use export::{ExportDocument, EXPORT_VERSION};
pub use record::{
    next_updated_at, ConflictSnapshot, EncryptedField, Record, RecordMetadata, RecordPatch,
    RemoteRecord,
};
pub use time::{
    is_expired_tombstone, now_millis, Clock, ManualClock, SharedClock, SystemClock, DAY_MS,
    TOMBSTONE_RETENTION_MS,
};
pub use types::{IdentityId, RecordId};
pub use validation::{validate_record, validate_remote_record};
