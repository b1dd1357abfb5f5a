//! In-memory implementation of the LocalStore trait.
//!
//! Same semantics as SQLite, nothing persisted. Used by tests and by
//! sessions that must not touch disk.

use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::broadcast;

use notevault_core::{is_expired_tombstone, IdentityId, Record, RecordId, SharedClock};

use crate::error::{Result, StoreError};
use crate::traits::{IntentKind, LocalStore, StoreEvent, SyncIntent, EVENT_CAPACITY};

/// In-memory store implementation. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
    clock: SharedClock,
    events: broadcast::Sender<StoreEvent>,
}

#[derive(Default)]
struct MemoryStoreInner {
    records: HashMap<RecordId, Record>,
    intents: HashMap<RecordId, SyncIntent>,
    session: Option<String>,
}

impl MemoryStoreInner {
    fn set_intent(&mut self, record: &Record, intent: Option<IntentKind>, now: i64) {
        if record.synced {
            self.intents.remove(&record.id);
        } else if let Some(kind) = intent {
            self.intents
                .entry(record.id)
                .and_modify(|existing| existing.kind = kind)
                .or_insert(SyncIntent {
                    record_id: record.id,
                    identity_id: record.identity_id,
                    kind,
                    queued_at: now,
                });
        }
    }

    fn remove_identity(&mut self, identity: &IdentityId) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.identity_id != *identity);
        self.intents.retain(|_, i| i.identity_id != *identity);
        before - self.records.len()
    }

    fn select(&self, identity: &IdentityId, keep: impl Fn(&Record) -> bool) -> Vec<Record> {
        self.records
            .values()
            .filter(|r| r.identity_id == *identity && keep(r))
            .cloned()
            .collect()
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new(clock: SharedClock) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
            clock,
            events,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    fn clock(&self) -> &SharedClock {
        &self.clock
    }

    async fn get(&self, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.read()?.records.get(id).cloned())
    }

    async fn compare_and_swap(
        &self,
        record: &Record,
        expected: Option<&Record>,
        intent: Option<IntentKind>,
    ) -> Result<bool> {
        let now = self.clock.now_millis();
        {
            let mut inner = self.write()?;
            if inner.records.get(&record.id) != expected {
                return Ok(false);
            }
            inner.records.insert(record.id, record.clone());
            inner.set_intent(record, intent, now);
        }

        self.emit(StoreEvent::Changed {
            id: record.id,
            identity_id: record.identity_id,
            local_edit: intent.is_some(),
        });
        Ok(true)
    }

    async fn hard_delete(&self, id: &RecordId) -> Result<bool> {
        let removed = {
            let mut inner = self.write()?;
            inner.intents.remove(id);
            inner.records.remove(id)
        };

        match removed {
            Some(record) => {
                self.emit(StoreEvent::Removed {
                    id: *id,
                    identity_id: record.identity_id,
                });
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn bulk_upsert(&self, records: &[Record]) -> Result<()> {
        let now = self.clock.now_millis();
        {
            let mut inner = self.write()?;
            for record in records {
                inner.records.insert(record.id, record.clone());
                inner.set_intent(record, None, now);
            }
        }

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
        let removed = self.write()?.remove_identity(identity);
        self.emit(StoreEvent::Reset {
            identity_id: *identity,
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

        let now = self.clock.now_millis();
        {
            let mut inner = self.write()?;
            inner.remove_identity(identity);
            for record in records {
                inner.records.insert(record.id, record.clone());
                inner.set_intent(record, Some(IntentKind::Upsert), now);
            }
        }

        self.emit(StoreEvent::Reset {
            identity_id: *identity,
        });
        Ok(())
    }

    async fn sweep_expired(&self, retention_ms: i64) -> Result<Vec<RecordId>> {
        let now = self.clock.now_millis();
        let purged: Vec<RecordId> = {
            let mut inner = self.write()?;
            let expired: Vec<RecordId> = inner
                .records
                .values()
                .filter(|r| {
                    r.deleted
                        && r.deleted_at
                            .is_some_and(|at| is_expired_tombstone(at, now, retention_ms))
                })
                .map(|r| r.id)
                .collect();
            for id in &expired {
                inner.records.remove(id);
                inner.intents.remove(id);
            }
            expired
        };

        if !purged.is_empty() {
            self.emit(StoreEvent::Purged {
                ids: purged.clone(),
            });
        }
        Ok(purged)
    }

    async fn list_all(&self, identity: &IdentityId) -> Result<Vec<Record>> {
        let mut records = self.read()?.select(identity, |_| true);
        records.sort_by_key(|r| (Reverse(r.updated_at), r.id));
        Ok(records)
    }

    async fn list_active(&self, identity: &IdentityId) -> Result<Vec<Record>> {
        let mut records = self.read()?.select(identity, |r| !r.deleted);
        records.sort_by_key(|r| (Reverse(r.updated_at), r.id));
        Ok(records)
    }

    async fn list_trash(&self, identity: &IdentityId) -> Result<Vec<Record>> {
        let mut records = self.read()?.select(identity, |r| r.deleted);
        records.sort_by_key(|r| (Reverse(r.deleted_at), r.id));
        Ok(records)
    }

    async fn list_updated_after(&self, identity: &IdentityId, ts: i64) -> Result<Vec<Record>> {
        let mut records = self.read()?.select(identity, |r| r.updated_at > ts);
        records.sort_by_key(|r| (r.updated_at, r.id));
        Ok(records)
    }

    async fn pending_intents(&self, identity: &IdentityId) -> Result<Vec<SyncIntent>> {
        let mut intents: Vec<SyncIntent> = self
            .read()?
            .intents
            .values()
            .filter(|i| i.identity_id == *identity)
            .cloned()
            .collect();
        intents.sort_by_key(|i| (i.queued_at, i.record_id));
        Ok(intents)
    }

    async fn load_session(&self) -> Result<Option<String>> {
        Ok(self.read()?.session.clone())
    }

    async fn store_session(&self, wrapped: &str) -> Result<()> {
        self.write()?.session = Some(wrapped.to_string());
        Ok(())
    }

    async fn clear_session(&self) -> Result<()> {
        self.write()?.session = None;
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}
