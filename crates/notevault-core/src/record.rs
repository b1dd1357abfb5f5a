//! The record model: the unit of sync.
//!
//! A [`Record`] is the local, fully-annotated form of one encrypted note. A
//! [`RemoteRecord`] is the subset the relay stores and returns: it never
//! carries local bookkeeping (`synced`, base hash, conflict snapshot).

use serde::{Deserialize, Serialize};

use crate::types::{IdentityId, RecordId};

/// One independently encrypted field: `{ciphertext, iv, authTag}`, each base64.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedField {
    /// Base64 ciphertext without the authentication tag.
    pub ciphertext: String,
    /// Base64 96-bit nonce.
    pub iv: String,
    /// Base64 128-bit authentication tag.
    pub auth_tag: String,
}

/// Plaintext-derived metadata computed at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordMetadata {
    /// Plaintext content length in bytes.
    pub size: u64,
    /// Hex SHA-256 of the plaintext content.
    pub content_hash: String,
}

/// Encrypted snapshot of a remote version that could not be merged safely.
///
/// `content` is exactly the remote record's `encryptedContent`. The remote
/// timestamp and hash are kept so a later local save can adopt the remote
/// version as its base.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictSnapshot {
    pub content: EncryptedField,
    pub remote_updated_at: i64,
    pub remote_content_hash: String,
}

/// A locally stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub id: RecordId,
    pub identity_id: IdentityId,
    pub encrypted_content: EncryptedField,
    pub encrypted_title: EncryptedField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_folder: Option<EncryptedField>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    #[serde(default)]
    pub synced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_content_hash: Option<String>,
    #[serde(
        default,
        rename = "conflictBlob",
        skip_serializing_if = "Option::is_none"
    )]
    pub conflict: Option<ConflictSnapshot>,
    pub metadata: RecordMetadata,
}

impl Record {
    /// Build a brand-new, never-synced record.
    pub fn new(
        identity_id: IdentityId,
        encrypted_title: EncryptedField,
        encrypted_content: EncryptedField,
        encrypted_folder: Option<EncryptedField>,
        metadata: RecordMetadata,
        now: i64,
    ) -> Self {
        Self {
            id: RecordId::random(),
            identity_id,
            encrypted_content,
            encrypted_title,
            encrypted_folder,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
            synced: false,
            base_content_hash: None,
            conflict: None,
            metadata,
        }
    }

    /// Accept a relay record as an agreed local copy.
    pub fn from_remote(remote: RemoteRecord) -> Self {
        let base = remote.metadata.content_hash.clone();
        Self {
            id: remote.id,
            identity_id: remote.identity_id,
            encrypted_content: remote.encrypted_content,
            encrypted_title: remote.encrypted_title,
            encrypted_folder: remote.encrypted_folder,
            created_at: remote.created_at,
            updated_at: remote.updated_at,
            deleted: remote.deleted,
            deleted_at: remote.deleted_at,
            synced: true,
            base_content_hash: Some(base),
            conflict: None,
            metadata: remote.metadata,
        }
    }

    /// The relay-visible projection of this record.
    pub fn to_remote(&self) -> RemoteRecord {
        RemoteRecord {
            id: self.id,
            identity_id: self.identity_id,
            encrypted_content: self.encrypted_content.clone(),
            encrypted_title: self.encrypted_title.clone(),
            encrypted_folder: self.encrypted_folder.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted: self.deleted,
            deleted_at: self.deleted_at,
            metadata: self.metadata.clone(),
        }
    }

    /// Hex SHA-256 of the plaintext content.
    pub fn content_hash(&self) -> &str {
        &self.metadata.content_hash
    }

    /// True when a remote conflict is waiting for manual merge.
    pub fn has_conflict(&self) -> bool {
        self.conflict.is_some()
    }
}

/// A record as stored by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    pub id: RecordId,
    pub identity_id: IdentityId,
    pub encrypted_content: EncryptedField,
    pub encrypted_title: EncryptedField,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encrypted_folder: Option<EncryptedField>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
    pub metadata: RecordMetadata,
}

impl RemoteRecord {
    /// Hex SHA-256 of the plaintext content.
    pub fn content_hash(&self) -> &str {
        &self.metadata.content_hash
    }
}

/// A partial update to a record's user-visible fields.
///
/// Unset fields are left untouched. `encrypted_folder` is doubly optional so
/// a patch can clear the folder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    pub encrypted_content: Option<EncryptedField>,
    pub encrypted_title: Option<EncryptedField>,
    pub encrypted_folder: Option<Option<EncryptedField>>,
    pub metadata: Option<RecordMetadata>,
}

impl RecordPatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the content and its metadata together.
    pub fn content(mut self, content: EncryptedField, metadata: RecordMetadata) -> Self {
        self.encrypted_content = Some(content);
        self.metadata = Some(metadata);
        self
    }

    /// Replace the title.
    pub fn title(mut self, title: EncryptedField) -> Self {
        self.encrypted_title = Some(title);
        self
    }

    /// Set or clear the folder.
    pub fn folder(mut self, folder: Option<EncryptedField>) -> Self {
        self.encrypted_folder = Some(folder);
        self
    }

    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.encrypted_content.is_none()
            && self.encrypted_title.is_none()
            && self.encrypted_folder.is_none()
            && self.metadata.is_none()
    }

    /// Apply the patch to `record` in place. Timestamps are not touched.
    pub fn apply(&self, record: &mut Record) {
        if let Some(content) = &self.encrypted_content {
            record.encrypted_content = content.clone();
        }
        if let Some(title) = &self.encrypted_title {
            record.encrypted_title = title.clone();
        }
        if let Some(folder) = &self.encrypted_folder {
            record.encrypted_folder = folder.clone();
        }
        if let Some(metadata) = &self.metadata {
            record.metadata = metadata.clone();
        }
    }
}

/// Next `updatedAt` for a record: `max(now, previous + 1)`.
///
/// Keeps `updatedAt` strictly increasing even when the wall clock stalls or
/// moves backwards between two edits.
pub fn next_updated_at(now: i64, previous: Option<i64>) -> i64 {
    match previous {
        Some(prev) => now.max(prev.saturating_add(1)),
        None => now,
    }
}
