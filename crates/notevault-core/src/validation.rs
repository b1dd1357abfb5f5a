//! Record invariant checks.
//!
//! Run on every write path before a record reaches storage or the relay.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ValidationError;
use crate::record::{EncryptedField, Record, RemoteRecord};
use crate::types::{IdentityId, RecordId};

/// Validate a local record against the invariants of the data model.
///
/// Checks, in order:
/// 1. Ownership matches `identity` (when given)
/// 2. A conflict snapshot implies `synced == false`
/// 3. `deleted` and `deletedAt` agree
/// 4. `updatedAt >= createdAt`
/// 5. Every ciphertext field is well-formed base64 with a 96-bit iv and 128-bit tag
pub fn validate_record(record: &Record, identity: Option<&IdentityId>) -> Result<(), ValidationError> {
    check_owner(record.id, &record.identity_id, identity)?;

    if record.conflict.is_some() && record.synced {
        return Err(ValidationError::ConflictWhileSynced(record.id));
    }

    check_common(
        record.id,
        record.deleted,
        record.deleted_at,
        record.created_at,
        record.updated_at,
    )?;

    check_field(record.id, "encryptedContent", &record.encrypted_content)?;
    check_field(record.id, "encryptedTitle", &record.encrypted_title)?;
    if let Some(folder) = &record.encrypted_folder {
        check_field(record.id, "encryptedFolder", folder)?;
    }
    if let Some(conflict) = &record.conflict {
        check_field(record.id, "conflictBlob", &conflict.content)?;
    }
    check_hash(record.id, &record.metadata.content_hash)?;

    Ok(())
}

/// Validate a record received from the relay.
pub fn validate_remote_record(
    record: &RemoteRecord,
    identity: &IdentityId,
) -> Result<(), ValidationError> {
    check_owner(record.id, &record.identity_id, Some(identity))?;
    check_common(
        record.id,
        record.deleted,
        record.deleted_at,
        record.created_at,
        record.updated_at,
    )?;
    check_field(record.id, "encryptedContent", &record.encrypted_content)?;
    check_field(record.id, "encryptedTitle", &record.encrypted_title)?;
    if let Some(folder) = &record.encrypted_folder {
        check_field(record.id, "encryptedFolder", folder)?;
    }
    check_hash(record.id, &record.metadata.content_hash)
}

fn check_owner(
    id: RecordId,
    actual: &IdentityId,
    expected: Option<&IdentityId>,
) -> Result<(), ValidationError> {
    match expected {
        Some(expected) if expected != actual => Err(ValidationError::IdentityMismatch {
            record: id,
            expected: *expected,
            actual: *actual,
        }),
        _ => Ok(()),
    }
}

fn check_common(
    id: RecordId,
    deleted: bool,
    deleted_at: Option<i64>,
    created_at: i64,
    updated_at: i64,
) -> Result<(), ValidationError> {
    match (deleted, deleted_at) {
        (true, None) => return Err(ValidationError::TombstoneMissingDeletedAt(id)),
        (false, Some(_)) => return Err(ValidationError::DeletedAtWithoutTombstone(id)),
        _ => {}
    }

    if updated_at < created_at {
        return Err(ValidationError::UpdatedBeforeCreated {
            id,
            created_at,
            updated_at,
        });
    }

    Ok(())
}

fn check_field(
    id: RecordId,
    field: &'static str,
    value: &EncryptedField,
) -> Result<(), ValidationError> {
    let malformed = || ValidationError::MalformedField { id, field };

    STANDARD.decode(&value.ciphertext).map_err(|_| malformed())?;
    let iv = STANDARD.decode(&value.iv).map_err(|_| malformed())?;
    let tag = STANDARD.decode(&value.auth_tag).map_err(|_| malformed())?;

    if iv.len() != 12 || tag.len() != 16 {
        return Err(malformed());
    }
    Ok(())
}

fn check_hash(id: RecordId, hash: &str) -> Result<(), ValidationError> {
    if hash.len() == 64 && hash.bytes().all(|b| b.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(ValidationError::MalformedField {
            id,
            field: "metadata.contentHash",
        })
    }
}
