//! SQLite implementation of the LocalStore trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via `tokio::task::spawn_blocking`.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::broadcast;
use tracing::{debug, info};

use notevault_core::{
    is_expired_tombstone, IdentityId, Record, RecordId, RecordMetadata, SharedClock,
    TOMBSTONE_RETENTION_MS,
};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{IntentKind, LocalStore, StoreEvent, SyncIntent, EVENT_CAPACITY};

const RECORD_COLUMNS: &str = "id, identity_id, encrypted_content, encrypted_title, \
     encrypted_folder, created_at, updated_at, deleted, deleted_at, synced, \
     base_content_hash, conflict, size, content_hash";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: SharedClock,
    events: broadcast::Sender<StoreEvent>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file if needed, runs migrations, then purges expired
    /// tombstones.
    pub fn open(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self> {
        Self::from_connection(Connection::open(path)?, clock)
    }

    /// Open an in-memory SQLite database.
    pub fn open_memory(clock: SharedClock) -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, clock)
    }

    fn from_connection(mut conn: Connection, clock: SharedClock) -> Result<Self> {
        migration::migrate(&mut conn)?;

        let purged = sweep(&mut conn, clock.now_millis(), TOMBSTONE_RETENTION_MS)?;
        if !purged.is_empty() {
            info!(count = purged.len(), "purged expired tombstones on open");
        }

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
            events,
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&conn)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Background(e.to_string()))?
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn query(&self, sql: &'static str, identity: IdentityId, ts: Option<i64>) -> Result<Vec<Record>> {
        self.run(move |conn| {
            let sql = format!("SELECT {RECORD_COLUMNS} FROM records {sql}");
            let mut stmt = conn.prepare(&sql)?;
            let records = match ts {
                Some(ts) => stmt
                    .query_map(params![identity.to_hex(), ts], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map(params![identity.to_hex()], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(records)
        })
        .await
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    conn.lock().map_err(|e| StoreError::Poisoned(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_json_column<T: serde::de::DeserializeOwned>(
    row: &Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<T>> {
    let text: Option<String> = row.get(idx)?;
    text.map(|t| {
        serde_json::from_str(&t)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn hex_column<T>(
    row: &Row<'_>,
    idx: usize,
    parse: fn(&str) -> std::result::Result<T, notevault_core::CoreError>,
) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    parse(&text).map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        id: hex_column(row, 0, RecordId::from_hex)?,
        identity_id: hex_column(row, 1, IdentityId::from_hex)?,
        encrypted_content: json_column(row, 2)?,
        encrypted_title: json_column(row, 3)?,
        encrypted_folder: opt_json_column(row, 4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
        deleted: row.get(7)?,
        deleted_at: row.get(8)?,
        synced: row.get(9)?,
        base_content_hash: row.get(10)?,
        conflict: opt_json_column(row, 11)?,
        metadata: RecordMetadata {
            size: row.get::<_, i64>(12)? as u64,
            content_hash: row.get(13)?,
        },
    })
}

fn write_record(conn: &Connection, record: &Record) -> Result<()> {
    let folder = record.encrypted_folder.as_ref().map(to_json).transpose()?;
    let conflict = record.conflict.as_ref().map(to_json).transpose()?;

    conn.execute(
        &format!(
            "INSERT INTO records ({RECORD_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
             ON CONFLICT(id) DO UPDATE SET
                identity_id = excluded.identity_id,
                encrypted_content = excluded.encrypted_content,
                encrypted_title = excluded.encrypted_title,
                encrypted_folder = excluded.encrypted_folder,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                deleted = excluded.deleted,
                deleted_at = excluded.deleted_at,
                synced = excluded.synced,
                base_content_hash = excluded.base_content_hash,
                conflict = excluded.conflict,
                size = excluded.size,
                content_hash = excluded.content_hash"
        ),
        params![
            record.id.to_hex(),
            record.identity_id.to_hex(),
            to_json(&record.encrypted_content)?,
            to_json(&record.encrypted_title)?,
            folder,
            record.created_at,
            record.updated_at,
            record.deleted,
            record.deleted_at,
            record.synced,
            record.base_content_hash,
            conflict,
            record.metadata.size as i64,
            record.metadata.content_hash,
        ],
    )?;
    Ok(())
}

/// Synced records drop their intent; otherwise `intent` replaces it, keeping
/// the original queue position.
fn write_intent(conn: &Connection, record: &Record, intent: Option<IntentKind>, now: i64) -> Result<()> {
    if record.synced {
        conn.execute(
            "DELETE FROM sync_intents WHERE record_id = ?1",
            params![record.id.to_hex()],
        )?;
    } else if let Some(kind) = intent {
        conn.execute(
            "INSERT INTO sync_intents (record_id, identity_id, kind, queued_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(record_id) DO UPDATE SET kind = excluded.kind",
            params![record.id.to_hex(), record.identity_id.to_hex(), kind.as_str(), now],
        )?;
    }
    Ok(())
}

fn sweep(conn: &mut Connection, now: i64, retention_ms: i64) -> Result<Vec<RecordId>> {
    let tx = conn.transaction()?;

    let tombstones: Vec<(String, i64)> = {
        let mut stmt = tx.prepare(
            "SELECT id, deleted_at FROM records WHERE deleted = 1 AND deleted_at IS NOT NULL",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };

    let mut purged = Vec::new();
    for (id, deleted_at) in tombstones {
        if !is_expired_tombstone(deleted_at, now, retention_ms) {
            continue;
        }
        tx.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        tx.execute("DELETE FROM sync_intents WHERE record_id = ?1", params![id])?;
        purged.push(RecordId::from_hex(&id).map_err(|e| StoreError::InvalidData(e.to_string()))?);
    }

    tx.commit()?;
    Ok(purged)
}

fn in_transaction<T>(
    conn: &mut Connection,
    f: impl FnOnce(&Connection) -> Result<T>,
) -> Result<T> {
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::StorageTransactionFailed(e.to_string()))?;
    let value = f(&tx).map_err(|e| StoreError::StorageTransactionFailed(e.to_string()))?;
    tx.commit()
        .map_err(|e| StoreError::StorageTransactionFailed(e.to_string()))?;
    Ok(value)
}

#[async_trait]
impl LocalStore for SqliteStore {
    fn clock(&self) -> &SharedClock {
        &self.clock
    }

    async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        let id = *id;
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                params![id.to_hex()],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn compare_and_swap(
        &self,
        record: &Record,
        expected: Option<&Record>,
        intent: Option<IntentKind>,
    ) -> Result<bool> {
        let record = record.clone();
        let expected = expected.cloned();
        let now = self.clock.now_millis();
        let (id, identity_id) = (record.id, record.identity_id);

        let swapped = self
            .run(move |conn| {
                let tx = conn.transaction()?;

                let current = tx
                    .query_row(
                        &format!("SELECT {RECORD_COLUMNS} FROM records WHERE id = ?1"),
                        params![record.id.to_hex()],
                        row_to_record,
                    )
                    .optional()?;
                if current != expected {
                    return Ok(false);
                }

                write_record(&tx, &record)?;
                write_intent(&tx, &record, intent, now)?;
                tx.commit()?;
                Ok(true)
            })
            .await?;

        if swapped {
            self.emit(StoreEvent::Changed {
                id,
                identity_id,
                local_edit: intent.is_some(),
            });
        }
        Ok(swapped)
    }

    async fn hard_delete(&self, id: &RecordId) -> Result<bool> {
        let id = *id;
        let owner = self
            .run(move |conn| {
                let tx = conn.transaction()?;
                let owner: Option<String> = tx
                    .query_row(
                        "SELECT identity_id FROM records WHERE id = ?1",
                        params![id.to_hex()],
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.execute("DELETE FROM records WHERE id = ?1", params![id.to_hex()])?;
                tx.execute(
                    "DELETE FROM sync_intents WHERE record_id = ?1",
                    params![id.to_hex()],
                )?;
                tx.commit()?;
                owner
                    .map(|hex| IdentityId::from_hex(&hex))
                    .transpose()
                    .map_err(|e| StoreError::InvalidData(e.to_string()))
            })
            .await?;

        match owner {
            Some(identity_id) => {
                debug!(%id, "hard deleted record");
                self.emit(StoreEvent::Removed { id, identity_id });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bulk_upsert(&self, records: &[Record]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let batch = records.to_vec();
        let now = self.clock.now_millis();

        self.run(move |conn| {
            in_transaction(conn, |tx| {
                for record in &batch {
                    write_record(tx, record)?;
                    write_intent(tx, record, None, now)?;
                }
                Ok(())
            })
        })
        .await?;

        for record in records {
            self.emit(StoreEvent::Changed {
                id: record.id,
                identity_id: record.identity_id,
                local_edit: false,
            });
        }
        Ok(())
    }

    async fn wipe_identity(&self, identity: &IdentityId) -> Result<usize> {
        let identity = *identity;
        let removed = self
            .run(move |conn| {
                in_transaction(conn, |tx| {
                    let removed = tx.execute(
                        "DELETE FROM records WHERE identity_id = ?1",
                        params![identity.to_hex()],
                    )?;
                    tx.execute(
                        "DELETE FROM sync_intents WHERE identity_id = ?1",
                        params![identity.to_hex()],
                    )?;
                    Ok(removed)
                })
            })
            .await?;

        info!(identity = %identity, removed, "wiped identity");
        self.emit(StoreEvent::Reset {
            identity_id: identity,
        });
        Ok(removed)
    }

    async fn replace_identity(&self, identity: &IdentityId, records: &[Record]) -> Result<()> {
        if let Some(stray) = records.iter().find(|r| r.identity_id != *identity) {
            return Err(StoreError::InvalidData(format!(
                "record {} belongs to identity {}",
                stray.id, stray.identity_id
            )));
        }

        let identity = *identity;
        let batch = records.to_vec();
        let now = self.clock.now_millis();

        self.run(move |conn| {
            in_transaction(conn, |tx| {
                tx.execute(
                    "DELETE FROM records WHERE identity_id = ?1",
                    params![identity.to_hex()],
                )?;
                tx.execute(
                    "DELETE FROM sync_intents WHERE identity_id = ?1",
                    params![identity.to_hex()],
                )?;
                for record in &batch {
                    write_record(tx, record)?;
                    write_intent(tx, record, Some(IntentKind::Upsert), now)?;
                }
                Ok(())
            })
        })
        .await?;

        info!(identity = %identity, count = records.len(), "replaced identity snapshot");
        self.emit(StoreEvent::Reset {
            identity_id: identity,
        });
        Ok(())
    }

    async fn sweep_expired(&self, retention_ms: i64) -> Result<Vec<RecordId>> {
        let now = self.clock.now_millis();
        let purged = self
            .run(move |conn| sweep(conn, now, retention_ms))
            .await?;

        if !purged.is_empty() {
            info!(count = purged.len(), "purged expired tombstones");
            self.emit(StoreEvent::Purged { ids: purged.clone() });
        }
        Ok(purged)
    }

    async fn list_all(&self, identity: &IdentityId) -> Result<Vec<Record>> {
        self.query(
            "WHERE identity_id = ?1 ORDER BY updated_at DESC",
            *identity,
            None,
        )
        .await
    }

    async fn list_active(&self, identity: &IdentityId) -> Result<Vec<Record>> {
        self.query(
            "WHERE identity_id = ?1 AND deleted = 0 ORDER BY updated_at DESC",
            *identity,
            None,
        )
        .await
    }

    async fn list_trash(&self, identity: &IdentityId) -> Result<Vec<Record>> {
        self.query(
            "WHERE identity_id = ?1 AND deleted = 1 ORDER BY deleted_at DESC",
            *identity,
            None,
        )
        .await
    }

    async fn list_updated_after(&self, identity: &IdentityId, ts: i64) -> Result<Vec<Record>> {
        self.query(
            "WHERE identity_id = ?1 AND updated_at > ?2 ORDER BY updated_at ASC",
            *identity,
            Some(ts),
        )
        .await
    }

    async fn pending_intents(&self, identity: &IdentityId) -> Result<Vec<SyncIntent>> {
        let identity = *identity;
        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT record_id, kind, queued_at FROM sync_intents
                 WHERE identity_id = ?1 ORDER BY queued_at ASC, record_id ASC",
            )?;
            let rows = stmt
                .query_map(params![identity.to_hex()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(record_id, kind, queued_at)| {
                    Ok(SyncIntent {
                        record_id: RecordId::from_hex(&record_id)
                            .map_err(|e| StoreError::InvalidData(e.to_string()))?,
                        identity_id: identity,
                        kind: kind.parse()?,
                        queued_at,
                    })
                })
                .collect()
        })
        .await
    }

    async fn load_session(&self) -> Result<Option<String>> {
        self.run(|conn| {
            conn.query_row("SELECT wrapped FROM session WHERE slot = 0", [], |row| {
                row.get(0)
            })
            .optional()
            .map_err(StoreError::from)
        })
        .await
    }

    async fn store_session(&self, wrapped: &str) -> Result<()> {
        let wrapped = wrapped.to_string();
        let now = self.clock.now_millis();
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO session (slot, wrapped, stored_at) VALUES (0, ?1, ?2)
                 ON CONFLICT(slot) DO UPDATE SET
                    wrapped = excluded.wrapped,
                    stored_at = excluded.stored_at",
                params![wrapped, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn clear_session(&self) -> Result<()> {
        self.run(|conn| {
            conn.execute("DELETE FROM session", [])?;
            Ok(())
        })
        .await
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LocalStoreExt;
    use notevault_core::{ManualClock, RecordPatch, DAY_MS};
    use notevault_crypto::{content_metadata, encrypt_field, EncryptionKey};

    const T0: i64 = 1_700_000_000_000;

    fn identity() -> IdentityId {
        IdentityId::from_bytes([1; 16])
    }

    fn note(identity: IdentityId, text: &str, now: i64) -> Record {
        let key = EncryptionKey::from_bytes([7; 32]);
        Record::new(
            identity,
            encrypt_field(b"title", &key).unwrap(),
            encrypt_field(text.as_bytes(), &key).unwrap(),
            None,
            content_metadata(text.as_bytes()),
            now,
        )
    }

    fn tombstone(identity: IdentityId, deleted_at: i64) -> Record {
        let mut record = note(identity, "gone", deleted_at - 10);
        record.deleted = true;
        record.deleted_at = Some(deleted_at);
        record.updated_at = deleted_at;
        record.synced = true;
        record
    }

    #[tokio::test]
    async fn test_save_and_get() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock.clone()).unwrap();

        let saved = store.save(note(identity(), "hello", T0)).await.unwrap();
        let loaded = store.get(&saved.id).await.unwrap().unwrap();

        assert_eq!(loaded, saved);
        assert!(!loaded.synced);
        assert_eq!(loaded.updated_at, T0);

        let intents = store.pending_intents(&identity()).await.unwrap();
        assert_eq!(intents.len(), 1);
        assert_eq!(intents[0].kind, IntentKind::Upsert);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");
        let clock = ManualClock::new(T0);

        let saved = {
            let store = SqliteStore::open(&path, clock.clone()).unwrap();
            let saved = store.save(note(identity(), "durable", T0)).await.unwrap();
            store.store_session("aa:bb:cc").await.unwrap();
            saved
        };

        let store = SqliteStore::open(&path, clock).unwrap();
        assert_eq!(store.get(&saved.id).await.unwrap(), Some(saved));
        assert_eq!(
            store.load_session().await.unwrap().as_deref(),
            Some("aa:bb:cc")
        );
    }

    #[tokio::test]
    async fn test_expired_tombstones_purged_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");
        let clock = ManualClock::new(T0);

        let old = tombstone(identity(), T0 - 31 * DAY_MS);
        let recent = tombstone(identity(), T0 - 29 * DAY_MS);
        {
            let store = SqliteStore::open(&path, clock.clone()).unwrap();
            store.bulk_upsert(&[old.clone(), recent.clone()]).await.unwrap();
        }

        let store = SqliteStore::open(&path, clock).unwrap();
        assert!(store.get(&old.id).await.unwrap().is_none());
        assert!(store.get(&recent.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_expired_emits_purge() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock.clone()).unwrap();
        let record = tombstone(identity(), T0);
        store.bulk_upsert(&[record.clone()]).await.unwrap();

        let mut events = store.subscribe();
        clock.advance(30 * DAY_MS);
        assert!(store.sweep_expired(TOMBSTONE_RETENTION_MS).await.unwrap().is_empty());

        clock.advance(1);
        let purged = store.sweep_expired(TOMBSTONE_RETENTION_MS).await.unwrap();
        assert_eq!(purged, vec![record.id]);
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::Purged {
                ids: vec![record.id]
            }
        );
    }

    #[tokio::test]
    async fn test_compare_and_swap_rejects_stale_expectation() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock).unwrap();
        let saved = store.save(note(identity(), "v1", T0)).await.unwrap();

        let mut next = saved.clone();
        next.updated_at += 5;

        let mut older = saved.clone();
        older.updated_at -= 1;
        assert!(!store.compare_and_swap(&next, Some(&older), None).await.unwrap());
        assert!(!store.compare_and_swap(&next, None, None).await.unwrap());

        // Same timestamp, different bookkeeping: still stale.
        let mut marked = saved.clone();
        marked.synced = true;
        assert!(!store.compare_and_swap(&next, Some(&marked), None).await.unwrap());

        assert!(store.compare_and_swap(&next, Some(&saved), None).await.unwrap());
        assert_eq!(store.get(&saved.id).await.unwrap().unwrap(), next);
    }

    #[tokio::test]
    async fn test_updates_are_monotonic_under_stalled_clock() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock.clone()).unwrap();
        let saved = store.save(note(identity(), "v1", T0)).await.unwrap();

        let key = EncryptionKey::from_bytes([7; 32]);
        let edited = store
            .update(
                saved.id,
                RecordPatch::new().title(encrypt_field(b"renamed", &key).unwrap()),
            )
            .await
            .unwrap();
        assert_eq!(edited.updated_at, T0 + 1);

        clock.set(T0 - 5_000);
        let deleted = store.soft_delete(saved.id).await.unwrap();
        assert_eq!(deleted.updated_at, T0 + 2);
        assert_eq!(deleted.deleted_at, Some(T0 + 2));

        let restored = store.restore(saved.id).await.unwrap();
        assert_eq!(restored.updated_at, T0 + 3);
        assert!(!restored.deleted);
        assert!(restored.deleted_at.is_none());
    }

    #[tokio::test]
    async fn test_hard_delete_removes_intents() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock).unwrap();
        let saved = store.save(note(identity(), "bye", T0)).await.unwrap();
        assert_eq!(store.pending_intents(&identity()).await.unwrap().len(), 1);

        assert!(store.hard_delete(&saved.id).await.unwrap());
        assert!(store.get(&saved.id).await.unwrap().is_none());
        assert!(store.pending_intents(&identity()).await.unwrap().is_empty());
        assert!(!store.hard_delete(&saved.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_synced_sets_base_and_clears_intent() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock).unwrap();
        let saved = store.save(note(identity(), "push me", T0)).await.unwrap();

        assert!(!store.mark_synced(saved.id, saved.updated_at - 1).await.unwrap());
        assert!(store.mark_synced(saved.id, saved.updated_at).await.unwrap());

        let synced = store.get(&saved.id).await.unwrap().unwrap();
        assert!(synced.synced);
        assert_eq!(synced.base_content_hash.as_deref(), Some(saved.content_hash()));
        assert!(store.pending_intents(&identity()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wipe_is_identity_scoped() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock).unwrap();
        let other = IdentityId::from_bytes([2; 16]);

        store.save(note(identity(), "mine", T0)).await.unwrap();
        store.save(note(identity(), "mine too", T0)).await.unwrap();
        let theirs = store.save(note(other, "theirs", T0)).await.unwrap();

        assert_eq!(store.wipe_identity(&identity()).await.unwrap(), 2);
        assert!(store.list_all(&identity()).await.unwrap().is_empty());
        assert!(store.pending_intents(&identity()).await.unwrap().is_empty());
        assert_eq!(store.list_all(&other).await.unwrap(), vec![theirs]);
        assert_eq!(store.pending_intents(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_replace_identity_rejects_foreign_records_without_wiping() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock).unwrap();
        let kept = store.save(note(identity(), "keep", T0)).await.unwrap();

        let foreign = note(IdentityId::from_bytes([9; 16]), "foreign", T0);
        let result = store.replace_identity(&identity(), &[foreign]).await;

        assert!(matches!(result, Err(StoreError::InvalidData(_))));
        assert_eq!(store.list_all(&identity()).await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn test_list_queries() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock.clone()).unwrap();

        let a = store.save(note(identity(), "a", T0)).await.unwrap();
        clock.advance(10);
        let b = store.save(note(identity(), "b", T0 + 10)).await.unwrap();
        clock.advance(10);
        let trashed = store.soft_delete(a.id).await.unwrap();

        let active = store.list_active(&identity()).await.unwrap();
        assert_eq!(active, vec![b.clone()]);

        let trash = store.list_trash(&identity()).await.unwrap();
        assert_eq!(trash, vec![trashed.clone()]);

        let all: Vec<_> = store
            .list_all(&identity())
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(all, vec![a.id, b.id]);

        let after = store.list_updated_after(&identity(), T0 + 10).await.unwrap();
        assert_eq!(after, vec![trashed]);
    }

    #[tokio::test]
    async fn test_events_distinguish_local_edits() {
        let clock = ManualClock::new(T0);
        let store = SqliteStore::open_memory(clock).unwrap();
        let mut events = store.subscribe();

        let saved = store.save(note(identity(), "hi", T0)).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::Changed {
                id: saved.id,
                identity_id: identity(),
                local_edit: true
            }
        );

        let mut pulled = note(identity(), "remote", T0);
        pulled.synced = true;
        store.bulk_upsert(&[pulled.clone()]).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            StoreEvent::Changed {
                id: pulled.id,
                identity_id: identity(),
                local_edit: false
            }
        );
    }

    #[tokio::test]
    async fn test_session_row_lifecycle() {
        let store = SqliteStore::open_memory(ManualClock::new(T0)).unwrap();
        assert!(store.load_session().await.unwrap().is_none());

        store.store_session("01:02:03").await.unwrap();
        store.store_session("04:05:06").await.unwrap();
        assert_eq!(store.load_session().await.unwrap().as_deref(), Some("04:05:06"));

        store.clear_session().await.unwrap();
        assert!(store.load_session().await.unwrap().is_none());
    }
}
