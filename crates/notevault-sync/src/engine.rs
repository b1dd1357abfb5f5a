//! The reconciliation engine.
//!
//! One cycle, per identity:
//! 1. Fetch the relay's full record list
//! 2. Reconcile each remote record into the local store
//! 3. Collect local records the relay lacks or is behind on
//! 4. Push them in batches and mark them synced
//!
//! Cycles never overlap. Network failures feed the connection manager's
//! backoff and leave local state ready for the next attempt.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use notevault_core::{
    is_expired_tombstone, validate_remote_record, IdentityId, Record, RecordId, RemoteRecord,
    TOMBSTONE_RETENTION_MS,
};
use notevault_store::{LocalStore, LocalStoreExt, StoreError, StoreEvent, MAX_WRITE_ATTEMPTS};

use crate::connection::{ConnectionManager, SyncMode};
use crate::error::{Result, SyncError};
use crate::reconcile::{as_synced, decide_pull, should_push, with_conflict, PullDecision};
use crate::relay::{Relay, RelayEvent};

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Time between periodic cycles.
    pub interval: Duration,
    /// Maximum records per push call.
    pub max_batch_size: usize,
    /// Treat equal-timestamp divergence and stale-base pushes as conflicts.
    pub strict_conflicts: bool,
    /// Remote tombstones older than this are erased everywhere.
    pub tombstone_retention_ms: i64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_batch_size: 100,
            strict_conflicts: true,
            tombstone_retention_ms: TOMBSTONE_RETENTION_MS,
        }
    }
}

/// What one cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Remote records fetched.
    pub pulled: usize,
    /// Remote records new to this device.
    pub inserted: usize,
    /// Local records overwritten by a newer remote version.
    pub applied: usize,
    /// Conflicts recorded this cycle.
    pub conflicts: usize,
    /// Local records pushed and marked synced.
    pub pushed: usize,
    /// Tombstones purged past retention, locally or on the relay.
    pub expired: usize,
    /// Local records removed because the relay erased them.
    pub removed: usize,
    /// Remote records ignored because a hard delete is pending.
    pub skipped_pending: usize,
    /// Remote records that failed validation.
    pub rejected: usize,
}

impl CycleReport {
    fn changed_anything(&self) -> bool {
        self.inserted + self.applied + self.conflicts + self.pushed + self.expired + self.removed
            > 0
    }
}

/// Runs reconciliation cycles for one identity against one local store.
///
/// Cheap to clone; clones share the same cycle lock and pending hard
/// delete set.
#[derive(Clone)]
pub struct ReconciliationEngine {
    inner: Arc<EngineInner>,
}

struct Worker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct EngineInner {
    store: Arc<dyn LocalStore>,
    connection: ConnectionManager,
    identity: IdentityId,
    config: SyncConfig,
    /// Held for the whole of a cycle, a relay event or a hard delete.
    cycle: AsyncMutex<()>,
    pending_hard_deletes: Mutex<HashSet<RecordId>>,
    worker: Mutex<Option<Worker>>,
}

impl ReconciliationEngine {
    /// Create an engine. Nothing runs until [`start`](Self::start) or
    /// [`run_cycle_now`](Self::run_cycle_now).
    pub fn new(
        store: Arc<dyn LocalStore>,
        connection: ConnectionManager,
        identity: IdentityId,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                store,
                connection,
                identity,
                config,
                cycle: AsyncMutex::new(()),
                pending_hard_deletes: Mutex::new(HashSet::new()),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn identity(&self) -> IdentityId {
        self.inner.identity
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.inner.connection
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Ids whose hard delete has not yet been confirmed by a fetch.
    pub fn pending_hard_deletes(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.inner.pending().iter().copied().collect();
        ids.sort();
        ids
    }

    /// True while a cycle is running.
    pub fn is_cycle_in_flight(&self) -> bool {
        self.inner.cycle.try_lock().is_err()
    }

    /// Run one full cycle now.
    ///
    /// Fails with [`SyncError::CycleInProgress`] if one is already running
    /// and with [`SyncError::NetworkUnavailable`] when the connection gate is
    /// closed.
    pub async fn run_cycle_now(&self) -> Result<CycleReport> {
        self.inner.run_cycle().await
    }

    /// Apply one push-delivered relay change, as a fetch would have.
    pub async fn apply_relay_event(&self, event: RelayEvent) -> Result<CycleReport> {
        let _guard = self.inner.try_begin_cycle()?;
        self.inner.apply_event(event).await
    }

    /// Delete a record forever, relay first.
    ///
    /// Waits for an in-flight cycle to finish first, so a push already on
    /// the wire cannot re-create the record on the relay afterwards. The id
    /// joins the pending set before the relay call so that a later stale
    /// fetch cannot resurrect it. If the relay call fails the local record
    /// is left untouched. With sync disabled the delete is local only.
    pub async fn hard_delete(&self, id: RecordId) -> Result<()> {
        let inner = &self.inner;
        let _guard = inner.cycle.lock().await;

        if let Some(local) = inner.store.get(&id).await? {
            if local.identity_id != inner.identity {
                return Err(StoreError::NotFound(id).into());
            }
        }

        if inner.connection.mode() == SyncMode::Disabled {
            inner.store.hard_delete(&id).await?;
            info!(%id, "hard deleted locally, sync disabled");
            return Ok(());
        }

        let relay = inner.connection.client().ok_or_else(|| {
            SyncError::NetworkUnavailable("cannot erase from relay while offline".into())
        })?;

        inner.pending().insert(id);
        if let Err(e) = relay.hard_delete(&id, &inner.identity).await {
            inner.pending().remove(&id);
            if e.is_network() {
                inner.connection.report_failure();
            }
            warn!(%id, error = %e, "relay hard delete failed, local record kept");
            return Err(e);
        }

        inner.store.hard_delete(&id).await?;
        info!(%id, "hard deleted");
        Ok(())
    }

    /// Start periodic cycles, plus a cycle after every local edit and live
    /// application of relay pushes when the relay offers them.
    ///
    /// Idempotent. Must be called inside a tokio runtime.
    pub fn start(&self) {
        let mut worker = self.inner.worker();
        if worker.as_ref().is_some_and(|w| !w.handle.is_finished()) {
            return;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_loop(Arc::downgrade(&self.inner), shutdown_rx));
        *worker = Some(Worker { shutdown, handle });
        info!(identity = %self.inner.identity, "reconciliation started");
    }

    /// Stop scheduling cycles. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        if let Some(worker) = self.inner.worker().take() {
            let _ = worker.shutdown.send(true);
            info!(identity = %self.inner.identity, "reconciliation stopped");
        }
    }

    /// True while the background loop is alive.
    pub fn is_running(&self) -> bool {
        self.inner
            .worker()
            .as_ref()
            .is_some_and(|w| !w.handle.is_finished())
    }
}

impl EngineInner {
    fn pending(&self) -> MutexGuard<'_, HashSet<RecordId>> {
        self.pending_hard_deletes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_begin_cycle(&self) -> Result<AsyncMutexGuard<'_, ()>> {
        self.cycle.try_lock().map_err(|_| SyncError::CycleInProgress)
    }

    fn is_pending(&self, id: &RecordId) -> bool {
        self.pending().contains(id)
    }

    fn is_expired_remote(&self, record: &RemoteRecord, now: i64) -> bool {
        record.deleted
            && record
                .deleted_at
                .is_some_and(|at| is_expired_tombstone(at, now, self.config.tombstone_retention_ms))
    }

    async fn run_cycle(&self) -> Result<CycleReport> {
        let _guard = self.try_begin_cycle()?;
        let relay = self.connection.client().ok_or_else(|| {
            SyncError::NetworkUnavailable("no active relay endpoint".into())
        })?;
        self.cycle(relay.as_ref()).await
    }

    async fn cycle(&self, relay: &dyn Relay) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let now = self.store.clock().now_millis();

        report.expired += self
            .store
            .sweep_expired(self.config.tombstone_retention_ms)
            .await?
            .len();

        // 1. Fetch
        let remote = match relay.list_all(&self.identity).await {
            Ok(remote) => remote,
            Err(e) => {
                self.connection.report_failure();
                return Err(e);
            }
        };
        report.pulled = remote.len();

        // A pending hard delete is confirmed once the relay stops returning it.
        {
            let returned: HashSet<RecordId> = remote.iter().map(|r| r.id).collect();
            self.pending().retain(|id| returned.contains(id));
        }

        // 2. Reconcile pulls
        let mut inserts = Vec::new();
        let mut expired_remote = Vec::new();
        let mut skip_push: HashSet<RecordId> = HashSet::new();
        let mut remote_by_id: HashMap<RecordId, RemoteRecord> = HashMap::new();

        for record in remote {
            if let Err(e) = validate_remote_record(&record, &self.identity) {
                warn!(id = %record.id, error = %e, "ignoring malformed remote record");
                report.rejected += 1;
                skip_push.insert(record.id);
                continue;
            }
            if self.is_pending(&record.id) {
                report.skipped_pending += 1;
                skip_push.insert(record.id);
                continue;
            }
            if self.is_expired_remote(&record, now) {
                expired_remote.push(record.id);
                skip_push.insert(record.id);
                continue;
            }

            self.reconcile_one(&record, &mut report, &mut inserts).await?;
            remote_by_id.insert(record.id, record);
        }

        self.store.bulk_upsert(&inserts).await?;

        if !expired_remote.is_empty() {
            match relay.bulk_hard_delete(&expired_remote, &self.identity).await {
                Ok(()) => {
                    for id in &expired_remote {
                        self.store.hard_delete(id).await?;
                    }
                    report.expired += expired_remote.len();
                }
                Err(e) => warn!(count = expired_remote.len(), error = %e, "could not erase expired remote tombstones"),
            }
        }

        self.connection.report_success();

        // 3. Local records the relay lacks or is behind on
        let to_push: Vec<Record> = self
            .store
            .list_all(&self.identity)
            .await?
            .into_iter()
            .filter(|local| !skip_push.contains(&local.id) && !self.is_pending(&local.id))
            .filter(|local| should_push(local, remote_by_id.get(&local.id)))
            .collect();

        // 4. Push
        for chunk in to_push.chunks(self.config.max_batch_size.max(1)) {
            let batch: Vec<RemoteRecord> = chunk.iter().map(Record::to_remote).collect();
            if let Err(e) = relay.bulk_upsert(&batch).await {
                if e.is_network() {
                    self.connection.report_failure();
                }
                warn!(count = batch.len(), error = %e, "push failed, will retry next cycle");
                return Err(e);
            }

            for record in chunk {
                if self.store.mark_synced(record.id, record.updated_at).await? {
                    report.pushed += 1;
                } else {
                    debug!(id = %record.id, "record changed during push, stays unsynced");
                }
            }
        }

        if report.changed_anything() {
            info!(
                pulled = report.pulled,
                inserted = report.inserted,
                applied = report.applied,
                conflicts = report.conflicts,
                pushed = report.pushed,
                expired = report.expired,
                "reconciliation cycle complete"
            );
        } else {
            debug!(pulled = report.pulled, "reconciliation cycle found nothing to do");
        }
        Ok(report)
    }

    /// Reconcile one remote record, retrying against the fresh row if a
    /// local write lands in between.
    async fn reconcile_one(
        &self,
        remote: &RemoteRecord,
        report: &mut CycleReport,
        inserts: &mut Vec<Record>,
    ) -> Result<()> {
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let local = self.store.get(&remote.id).await?;
            let decision = decide_pull(local.as_ref(), remote, self.config.strict_conflicts);

            let next = match (decision, local.as_ref()) {
                (PullDecision::Insert, _) => {
                    inserts.push(Record::from_remote(remote.clone()));
                    report.inserted += 1;
                    return Ok(());
                }
                (PullDecision::Apply, _) => Record::from_remote(remote.clone()),
                (PullDecision::Conflict, Some(local)) => with_conflict(local, remote),
                (PullDecision::MarkSynced, Some(local)) => as_synced(local),
                _ => return Ok(()),
            };

            if self.store.compare_and_swap(&next, local.as_ref(), None).await? {
                match decision {
                    PullDecision::Apply => report.applied += 1,
                    PullDecision::Conflict => {
                        report.conflicts += 1;
                        warn!(id = %remote.id, "conflict detected, remote version kept aside");
                    }
                    _ => {}
                }
                return Ok(());
            }
        }

        debug!(id = %remote.id, "record kept changing, reconciling next cycle");
        Ok(())
    }

    async fn apply_event(&self, event: RelayEvent) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        if event.identity_id() != self.identity {
            return Ok(report);
        }

        match event {
            RelayEvent::Upserted(remote) => {
                report.pulled = 1;
                let now = self.store.clock().now_millis();
                if let Err(e) = validate_remote_record(&remote, &self.identity) {
                    warn!(id = %remote.id, error = %e, "ignoring malformed pushed record");
                    report.rejected += 1;
                } else if self.is_pending(&remote.id) {
                    report.skipped_pending += 1;
                } else if !self.is_expired_remote(&remote, now) {
                    let mut inserts = Vec::new();
                    self.reconcile_one(&remote, &mut report, &mut inserts).await?;
                    self.store.bulk_upsert(&inserts).await?;
                }
            }
            RelayEvent::HardDeleted { id, .. } => {
                if self.pending().remove(&id) {
                    debug!(%id, "relay confirmed hard delete");
                } else if let Some(local) = self.store.get(&id).await? {
                    // Unsynced local edits outlive a remote erase and get pushed back.
                    if local.synced && self.store.hard_delete(&id).await? {
                        report.removed += 1;
                    }
                }
            }
        }
        Ok(report)
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        if let Some(worker) = self.worker().take() {
            let _ = worker.shutdown.send(true);
        }
    }
}

enum Trigger {
    Tick,
    LocalEdit,
    Relay(RelayEvent),
    FeedClosed,
}

type RelayFeed = Option<(String, broadcast::Receiver<RelayEvent>)>;

async fn next_relay_event(feed: &mut RelayFeed) -> Option<RelayEvent> {
    let Some((_, rx)) = feed else {
        return std::future::pending().await;
    };
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            // Missed pushes are picked up by the next periodic fetch.
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

async fn run_loop(engine: Weak<EngineInner>, mut shutdown: watch::Receiver<bool>) {
    let Some((interval, mut store_events, identity)) = engine
        .upgrade()
        .map(|e| (e.config.interval, e.store.subscribe(), e.identity))
    else {
        return;
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut relay_feed: RelayFeed = None;

    loop {
        let trigger = tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => Trigger::Tick,
            event = store_events.recv() => match event {
                Ok(StoreEvent::Changed { identity_id, local_edit: true, .. }) if identity_id == identity => {
                    Trigger::LocalEdit
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => Trigger::LocalEdit,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            event = next_relay_event(&mut relay_feed) => match event {
                Some(event) => Trigger::Relay(event),
                None => Trigger::FeedClosed,
            },
        };

        let Some(inner) = engine.upgrade() else {
            break;
        };

        match trigger {
            Trigger::Tick | Trigger::LocalEdit => match inner.run_cycle().await {
                Ok(_) => {}
                Err(SyncError::CycleInProgress) => debug!("cycle already in flight"),
                Err(SyncError::NetworkUnavailable(reason)) => debug!(%reason, "skipping cycle"),
                Err(e) => warn!(error = %e, "reconciliation cycle failed"),
            },
            Trigger::Relay(event) => match inner.try_begin_cycle() {
                Ok(_guard) => {
                    if let Err(e) = inner.apply_event(event).await {
                        warn!(error = %e, "applying relay push failed");
                    }
                }
                Err(_) => debug!("cycle in flight, relay push left to the next fetch"),
            },
            Trigger::FeedClosed => relay_feed = None,
        }

        // Follow the active client: resubscribe after reconnects and mode
        // switches, drop the feed while the gate is closed.
        match inner.connection.client() {
            Some(client) => {
                let current = relay_feed.as_ref().map(|(endpoint, _)| endpoint.as_str());
                if current != Some(client.endpoint()) {
                    relay_feed = client
                        .subscribe()
                        .map(|rx| (client.endpoint().to_string(), rx));
                }
            }
            None => relay_feed = None,
        }
    }
    debug!("reconciliation loop exited");
}
