//! LocalStore trait: the abstract interface for record persistence.
//!
//! Backends implement a small set of primitives, chiefly a compare-and-swap
//! on `updatedAt`. The user-facing write operations live on
//! [`LocalStoreExt`] and are expressed once in terms of those primitives.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use notevault_core::{
    next_updated_at, validate_record, IdentityId, Record, RecordId, RecordPatch, SharedClock,
    ValidationError,
};

use crate::error::{Result, StoreError};

/// How many times a user-path write is retried after losing a race.
pub const MAX_WRITE_ATTEMPTS: usize = 8;

/// Capacity of the change-notification channel.
pub const EVENT_CAPACITY: usize = 256;

/// The kind of outbound change a user write queued for the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IntentKind {
    Upsert,
    SoftDelete,
    Restore,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Upsert => "upsert",
            IntentKind::SoftDelete => "soft_delete",
            IntentKind::Restore => "restore",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upsert" => Ok(IntentKind::Upsert),
            "soft_delete" => Ok(IntentKind::SoftDelete),
            "restore" => Ok(IntentKind::Restore),
            other => Err(StoreError::InvalidData(format!("unknown intent kind: {other}"))),
        }
    }
}

/// A queued outbound change. At most one per record; the latest write wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncIntent {
    pub record_id: RecordId,
    pub identity_id: IdentityId,
    pub kind: IntentKind,
    pub queued_at: i64,
}

/// Change notification emitted after a write commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A record was inserted or replaced.
    ///
    /// `local_edit` is true for user-path writes and false for writes applied
    /// by reconciliation.
    Changed {
        id: RecordId,
        identity_id: IdentityId,
        local_edit: bool,
    },
    /// A record was physically removed.
    Removed { id: RecordId, identity_id: IdentityId },
    /// Every record of an identity was removed or replaced at once.
    Reset { identity_id: IdentityId },
    /// Expired tombstones were purged.
    Purged { ids: Vec<RecordId> },
}

/// The LocalStore trait: async interface for record persistence.
///
/// All queries are identity-scoped. Listing order:
/// - `list_all` / `list_active`: most recently updated first
/// - `list_trash`: most recently deleted first
/// - `list_updated_after`: oldest update first
#[async_trait]
pub trait LocalStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Primitives
    // ─────────────────────────────────────────────────────────────────────────

    /// The clock used to stamp writes and expire tombstones.
    fn clock(&self) -> &SharedClock;

    /// Get a record by id.
    async fn get(&self, id: &RecordId) -> Result<Option<Record>>;

    /// Write `record` only if the stored row still equals `expected` exactly
    /// (`None` meaning the row must not exist).
    ///
    /// The whole row is compared, not just `updatedAt`: reconciliation parks
    /// conflicts and marks records synced without moving `updatedAt`.
    /// Returns `false` without writing when the expectation no longer holds.
    /// A synced record clears the id's intent; otherwise `intent`, when
    /// given, replaces it.
    async fn compare_and_swap(
        &self,
        record: &Record,
        expected: Option<&Record>,
        intent: Option<IntentKind>,
    ) -> Result<bool>;

    /// Physically remove a record and its intent. Irreversible.
    ///
    /// Returns whether a row existed.
    async fn hard_delete(&self, id: &RecordId) -> Result<bool>;

    /// Apply pulled records unconditionally in one transaction, without
    /// queuing intents.
    async fn bulk_upsert(&self, records: &[Record]) -> Result<()>;

    /// Atomically remove every record and intent of one identity.
    ///
    /// Returns the number of records removed.
    async fn wipe_identity(&self, identity: &IdentityId) -> Result<usize>;

    /// Atomically replace every record of one identity with `records`.
    ///
    /// Unsynced records get an `Upsert` intent. Either all of it happens or
    /// none of it does.
    async fn replace_identity(&self, identity: &IdentityId, records: &[Record]) -> Result<()>;

    /// Purge tombstones older than `retention_ms`. Returns the purged ids.
    async fn sweep_expired(&self, retention_ms: i64) -> Result<Vec<RecordId>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Every record of an identity, tombstones included.
    async fn list_all(&self, identity: &IdentityId) -> Result<Vec<Record>>;

    /// Live records only.
    async fn list_active(&self, identity: &IdentityId) -> Result<Vec<Record>>;

    /// Tombstoned records only.
    async fn list_trash(&self, identity: &IdentityId) -> Result<Vec<Record>>;

    /// Records with `updatedAt > ts`.
    async fn list_updated_after(&self, identity: &IdentityId, ts: i64) -> Result<Vec<Record>>;

    /// Queued outbound intents of an identity, oldest first.
    async fn pending_intents(&self, identity: &IdentityId) -> Result<Vec<SyncIntent>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Session row
    // ─────────────────────────────────────────────────────────────────────────

    /// The PIN-wrapped session string, if a PIN session is configured.
    async fn load_session(&self) -> Result<Option<String>>;

    /// Replace the PIN-wrapped session string.
    async fn store_session(&self, wrapped: &str) -> Result<()>;

    /// Remove the PIN-wrapped session string.
    async fn clear_session(&self) -> Result<()>;

    // ─────────────────────────────────────────────────────────────────────────
    // Observers
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe to change notifications.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

/// User-path writes, built on [`LocalStore::compare_and_swap`].
///
/// Every operation reads the row, computes the new value, and writes it only
/// if the row is unchanged; a lost race is retried up to
/// [`MAX_WRITE_ATTEMPTS`] times against the fresh row. Each write clears
/// `synced`, queues an intent and bumps `updatedAt` monotonically.
pub trait LocalStoreExt: LocalStore {
    /// Create or replace a record with user-supplied fields.
    ///
    /// Store-owned bookkeeping (`createdAt` of an existing row, base hash,
    /// `synced`) is kept from the stored row, not the argument. Saving
    /// resolves any pending conflict: the remote version becomes the new base
    /// and `updatedAt` moves past the remote timestamp.
    fn save(&self, record: Record) -> impl std::future::Future<Output = Result<Record>> + Send;

    /// Apply a partial update. Only a content change resolves a conflict.
    fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> impl std::future::Future<Output = Result<Record>> + Send;

    /// Tombstone a record: `deleted = true`, `deletedAt = updatedAt = now`.
    ///
    /// Deleting a tombstone is a no-op.
    fn soft_delete(&self, id: RecordId) -> impl std::future::Future<Output = Result<Record>> + Send;

    /// Clear a tombstone and bump `updatedAt`. Restoring a live record is a
    /// no-op.
    fn restore(&self, id: RecordId) -> impl std::future::Future<Output = Result<Record>> + Send;

    /// Mark a pushed record as agreed with the relay.
    ///
    /// Succeeds only if the row still carries `pushed_updated_at` and has no
    /// conflict; a record edited while the push was in flight stays unsynced.
    fn mark_synced(
        &self,
        id: RecordId,
        pushed_updated_at: i64,
    ) -> impl std::future::Future<Output = Result<bool>> + Send;
}

impl<S: LocalStore + ?Sized> LocalStoreExt for S {
    async fn save(&self, record: Record) -> Result<Record> {
        let id = record.id;
        write_with_retry(self, id, IntentKind::Upsert, move |current, now| {
            let mut next = record.clone();
            next.synced = false;
            next.conflict = None;

            match current {
                Some(current) => {
                    if current.identity_id != next.identity_id {
                        return Err(ValidationError::IdentityMismatch {
                            record: id,
                            expected: current.identity_id,
                            actual: next.identity_id,
                        }
                        .into());
                    }
                    next.created_at = current.created_at;
                    next.base_content_hash = current.base_content_hash.clone();
                    next.updated_at = next_updated_at(now, Some(current.updated_at));
                    if let Some(conflict) = &current.conflict {
                        next.base_content_hash = Some(conflict.remote_content_hash.clone());
                        next.updated_at = next.updated_at.max(conflict.remote_updated_at + 1);
                    }
                }
                None => {
                    next.base_content_hash = None;
                    next.updated_at = next_updated_at(now, None).max(next.created_at);
                }
            }

            if next.deleted {
                next.deleted_at = Some(next.updated_at);
            }
            Ok(Some(next))
        })
        .await
    }

    async fn update(&self, id: RecordId, patch: RecordPatch) -> Result<Record> {
        write_with_retry(self, id, IntentKind::Upsert, move |current, now| {
            let current = current.ok_or(StoreError::NotFound(id))?;
            if patch.is_empty() {
                return Ok(None);
            }

            let mut next = current.clone();
            patch.apply(&mut next);
            next.synced = false;
            next.updated_at = next_updated_at(now, Some(current.updated_at));

            if patch.encrypted_content.is_some() {
                if let Some(conflict) = next.conflict.take() {
                    next.base_content_hash = Some(conflict.remote_content_hash);
                    next.updated_at = next.updated_at.max(conflict.remote_updated_at + 1);
                }
            }
            Ok(Some(next))
        })
        .await
    }

    async fn soft_delete(&self, id: RecordId) -> Result<Record> {
        write_with_retry(self, id, IntentKind::SoftDelete, move |current, now| {
            let current = current.ok_or(StoreError::NotFound(id))?;
            if current.deleted {
                return Ok(None);
            }

            let mut next = current.clone();
            next.updated_at = next_updated_at(now, Some(current.updated_at));
            next.deleted = true;
            next.deleted_at = Some(next.updated_at);
            next.synced = false;
            Ok(Some(next))
        })
        .await
    }

    async fn restore(&self, id: RecordId) -> Result<Record> {
        write_with_retry(self, id, IntentKind::Restore, move |current, now| {
            let current = current.ok_or(StoreError::NotFound(id))?;
            if !current.deleted {
                return Ok(None);
            }

            let mut next = current.clone();
            next.updated_at = next_updated_at(now, Some(current.updated_at));
            next.deleted = false;
            next.deleted_at = None;
            next.synced = false;
            Ok(Some(next))
        })
        .await
    }

    async fn mark_synced(&self, id: RecordId, pushed_updated_at: i64) -> Result<bool> {
        let Some(current) = self.get(&id).await? else {
            return Ok(false);
        };
        if current.updated_at != pushed_updated_at || current.has_conflict() {
            return Ok(false);
        }

        let mut next = current.clone();
        next.synced = true;
        next.base_content_hash = Some(next.metadata.content_hash.clone());
        self.compare_and_swap(&next, Some(&current), None).await
    }
}

/// Read, compute, compare-and-swap; retry on a lost race.
///
/// `compute` receives the current row and the clock reading and returns the
/// row to write, or `None` when the write is a no-op.
async fn write_with_retry<S, F>(
    store: &S,
    id: RecordId,
    intent: IntentKind,
    mut compute: F,
) -> Result<Record>
where
    S: LocalStore + ?Sized,
    F: FnMut(Option<Record>, i64) -> Result<Option<Record>> + Send,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let current = store.get(&id).await?;
        let now = store.clock().now_millis();

        let next = match compute(current.clone(), now)? {
            Some(next) => next,
            None => return current.ok_or(StoreError::NotFound(id)),
        };
        validate_record(&next, None)?;

        if store
            .compare_and_swap(&next, current.as_ref(), Some(intent))
            .await?
        {
            return Ok(next);
        }
        debug!(%id, attempt, "write lost a race, retrying against the fresh row");
    }

    Err(StoreError::WriteContention {
        id,
        attempts: MAX_WRITE_ATTEMPTS,
    })
}
