//! Relay abstraction.
//!
//! The relay is an untrusted store of opaque encrypted records, partitioned
//! by identity. Every call is idempotent. Upserts are last-write-wins on a
//! strictly greater `updatedAt`; anything else is a no-op on the relay side.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;

use notevault_core::{IdentityId, RecordId, RemoteRecord};

use crate::error::Result;

/// A change pushed by a relay that supports live subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// A record was created or replaced on the relay.
    Upserted(RemoteRecord),
    /// A record was physically removed from the relay.
    HardDeleted { identity_id: IdentityId, id: RecordId },
}

impl RelayEvent {
    /// The identity partition this event belongs to.
    pub fn identity_id(&self) -> IdentityId {
        match self {
            RelayEvent::Upserted(record) => record.identity_id,
            RelayEvent::HardDeleted { identity_id, .. } => *identity_id,
        }
    }
}

/// Client handle to one relay endpoint.
#[async_trait]
pub trait Relay: Send + Sync {
    /// The endpoint this client talks to.
    fn endpoint(&self) -> &str;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<()>;

    /// Create-or-update by `(identityId, id)`.
    async fn upsert(&self, record: &RemoteRecord) -> Result<()>;

    /// Create-or-update many records in one call.
    async fn bulk_upsert(&self, records: &[RemoteRecord]) -> Result<()>;

    /// Tombstone a record on the relay.
    async fn soft_delete(&self, id: &RecordId, identity: &IdentityId, deleted_at: i64)
        -> Result<()>;

    /// Clear a tombstone on the relay.
    async fn restore(&self, id: &RecordId, identity: &IdentityId, updated_at: i64) -> Result<()>;

    /// Physically remove a record from the relay.
    async fn hard_delete(&self, id: &RecordId, identity: &IdentityId) -> Result<()>;

    /// Physically remove many records in one call.
    async fn bulk_hard_delete(&self, ids: &[RecordId], identity: &IdentityId) -> Result<()>;

    /// Every record stored for an identity.
    async fn list_all(&self, identity: &IdentityId) -> Result<Vec<RemoteRecord>>;

    /// Records with `updatedAt > ts`.
    async fn list_updated_after(&self, identity: &IdentityId, ts: i64)
        -> Result<Vec<RemoteRecord>>;

    /// Live change feed, when the transport supports one.
    fn subscribe(&self) -> Option<broadcast::Receiver<RelayEvent>> {
        None
    }
}

/// Creates relay clients for endpoints.
pub trait RelayConnector: Send + Sync {
    /// Build a client for `endpoint`. Does not touch the network.
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn Relay>>;
}

/// An in-memory relay for testing.
///
/// A [`MemoryRelayNetwork`] maps endpoint URLs to [`MemoryRelayServer`]s.
/// Servers can be made unreachable, slow, or made to reject specific
/// operations, to drive the failure paths of the engine.
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Mutex, MutexGuard, PoisonError};
    use std::time::Duration;

    use crate::error::SyncError;

    const EVENT_CAPACITY: usize = 256;

    #[derive(Default)]
    struct RelayState {
        records: HashMap<(IdentityId, RecordId), RemoteRecord>,
        unreachable: bool,
        reject_upserts: bool,
        reject_hard_deletes: bool,
        subscriptions: bool,
        latency: Option<Duration>,
    }

    /// Shared state of one simulated relay.
    pub struct MemoryRelayServer {
        state: Mutex<RelayState>,
        events: broadcast::Sender<RelayEvent>,
    }

    impl MemoryRelayServer {
        /// Create an empty, reachable relay.
        pub fn new() -> Arc<Self> {
            let (events, _) = broadcast::channel(EVENT_CAPACITY);
            Arc::new(Self {
                state: Mutex::new(RelayState::default()),
                events,
            })
        }

        fn state(&self) -> MutexGuard<'_, RelayState> {
            self.state.lock().unwrap_or_else(PoisonError::into_inner)
        }

        /// Make every call fail with `NetworkUnavailable`.
        pub fn set_reachable(&self, reachable: bool) {
            self.state().unreachable = !reachable;
        }

        /// Reject upserts with `RemoteRejected`.
        pub fn reject_upserts(&self, reject: bool) {
            self.state().reject_upserts = reject;
        }

        /// Reject hard deletes with `RemoteRejected`.
        pub fn reject_hard_deletes(&self, reject: bool) {
            self.state().reject_hard_deletes = reject;
        }

        /// Offer a live change feed to clients.
        pub fn enable_subscriptions(&self, enabled: bool) {
            self.state().subscriptions = enabled;
        }

        /// Delay every call by `latency`.
        pub fn set_latency(&self, latency: Option<Duration>) {
            self.state().latency = latency;
        }

        /// Store a record bypassing last-write-wins, as a misbehaving or
        /// concurrent writer would.
        pub fn put(&self, record: RemoteRecord) {
            self.state()
                .records
                .insert((record.identity_id, record.id), record.clone());
            let _ = self.events.send(RelayEvent::Upserted(record));
        }

        /// A stored record.
        pub fn get(&self, identity: &IdentityId, id: &RecordId) -> Option<RemoteRecord> {
            self.state().records.get(&(*identity, *id)).cloned()
        }

        /// Every record stored for an identity, ordered by id.
        pub fn records(&self, identity: &IdentityId) -> Vec<RemoteRecord> {
            let mut records: Vec<RemoteRecord> = self
                .state()
                .records
                .values()
                .filter(|r| r.identity_id == *identity)
                .cloned()
                .collect();
            records.sort_by_key(|r| r.id);
            records
        }

        async fn enter(&self) -> Result<()> {
            let latency = self.state().latency;
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            if self.state().unreachable {
                return Err(SyncError::NetworkUnavailable("relay unreachable".into()));
            }
            Ok(())
        }

        fn apply_upserts(&self, records: &[RemoteRecord]) -> Result<()> {
            let applied: Vec<RemoteRecord> = {
                let mut state = self.state();
                if state.reject_upserts {
                    return Err(SyncError::RemoteRejected("upsert refused".into()));
                }
                records
                    .iter()
                    .filter(|incoming| {
                        let key = (incoming.identity_id, incoming.id);
                        let newer = state
                            .records
                            .get(&key)
                            .map_or(true, |stored| incoming.updated_at > stored.updated_at);
                        if newer {
                            state.records.insert(key, (*incoming).clone());
                        }
                        newer
                    })
                    .cloned()
                    .collect()
            };

            for record in applied {
                let _ = self.events.send(RelayEvent::Upserted(record));
            }
            Ok(())
        }

        fn apply_hard_deletes(&self, ids: &[RecordId], identity: &IdentityId) -> Result<()> {
            let removed: Vec<RecordId> = {
                let mut state = self.state();
                if state.reject_hard_deletes {
                    return Err(SyncError::RemoteRejected("hard delete refused".into()));
                }
                ids.iter()
                    .filter(|id| state.records.remove(&(*identity, **id)).is_some())
                    .copied()
                    .collect()
            };

            for id in removed {
                let _ = self.events.send(RelayEvent::HardDeleted {
                    identity_id: *identity,
                    id,
                });
            }
            Ok(())
        }

        fn modify(
            &self,
            id: &RecordId,
            identity: &IdentityId,
            at: i64,
            change: impl FnOnce(&mut RemoteRecord),
        ) -> Result<()> {
            let changed = {
                let mut state = self.state();
                if state.reject_upserts {
                    return Err(SyncError::RemoteRejected("update refused".into()));
                }
                match state.records.get_mut(&(*identity, *id)) {
                    Some(stored) if at > stored.updated_at => {
                        change(stored);
                        stored.updated_at = at;
                        Some(stored.clone())
                    }
                    _ => None,
                }
            };

            if let Some(record) = changed {
                let _ = self.events.send(RelayEvent::Upserted(record));
            }
            Ok(())
        }
    }

    /// Endpoint registry of simulated relays. Also the connector.
    #[derive(Default)]
    pub struct MemoryRelayNetwork {
        servers: Mutex<HashMap<String, Arc<MemoryRelayServer>>>,
    }

    impl MemoryRelayNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Serve a relay at `endpoint`, creating it on first use.
        pub fn serve(&self, endpoint: &str) -> Arc<MemoryRelayServer> {
            self.servers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(endpoint.to_string())
                .or_insert_with(MemoryRelayServer::new)
                .clone()
        }
    }

    impl RelayConnector for MemoryRelayNetwork {
        fn connect(&self, endpoint: &str) -> Result<Arc<dyn Relay>> {
            let server = self
                .servers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .get(endpoint)
                .cloned()
                .ok_or_else(|| SyncError::Endpoint(format!("no relay at {endpoint}")))?;

            Ok(Arc::new(MemoryRelay {
                endpoint: endpoint.to_string(),
                server,
            }))
        }
    }

    /// Client handle to a [`MemoryRelayServer`].
    pub struct MemoryRelay {
        endpoint: String,
        server: Arc<MemoryRelayServer>,
    }

    #[async_trait]
    impl Relay for MemoryRelay {
        fn endpoint(&self) -> &str {
            &self.endpoint
        }

        async fn ping(&self) -> Result<()> {
            self.server.enter().await
        }

        async fn upsert(&self, record: &RemoteRecord) -> Result<()> {
            self.server.enter().await?;
            self.server.apply_upserts(std::slice::from_ref(record))
        }

        async fn bulk_upsert(&self, records: &[RemoteRecord]) -> Result<()> {
            self.server.enter().await?;
            self.server.apply_upserts(records)
        }

        async fn soft_delete(
            &self,
            id: &RecordId,
            identity: &IdentityId,
            deleted_at: i64,
        ) -> Result<()> {
            self.server.enter().await?;
            self.server.modify(id, identity, deleted_at, |record| {
                record.deleted = true;
                record.deleted_at = Some(deleted_at);
            })
        }

        async fn restore(&self, id: &RecordId, identity: &IdentityId, updated_at: i64) -> Result<()> {
            self.server.enter().await?;
            self.server.modify(id, identity, updated_at, |record| {
                record.deleted = false;
                record.deleted_at = None;
            })
        }

        async fn hard_delete(&self, id: &RecordId, identity: &IdentityId) -> Result<()> {
            self.server.enter().await?;
            self.server
                .apply_hard_deletes(std::slice::from_ref(id), identity)
        }

        async fn bulk_hard_delete(&self, ids: &[RecordId], identity: &IdentityId) -> Result<()> {
            self.server.enter().await?;
            self.server.apply_hard_deletes(ids, identity)
        }

        async fn list_all(&self, identity: &IdentityId) -> Result<Vec<RemoteRecord>> {
            self.server.enter().await?;
            Ok(self.server.records(identity))
        }

        async fn list_updated_after(
            &self,
            identity: &IdentityId,
            ts: i64,
        ) -> Result<Vec<RemoteRecord>> {
            self.server.enter().await?;
            let mut records: Vec<RemoteRecord> = self
                .server
                .records(identity)
                .into_iter()
                .filter(|r| r.updated_at > ts)
                .collect();
            records.sort_by_key(|r| r.updated_at);
            Ok(records)
        }

        fn subscribe(&self) -> Option<broadcast::Receiver<RelayEvent>> {
            if self.server.state().subscriptions {
                Some(self.server.events.subscribe())
            } else {
                None
            }
        }
    }
}
