//! # Notevault Sync
//!
//! Converges each device's local store with a relay that holds only
//! ciphertext.
//!
//! ## Overview
//!
//! - [`ConnectionManager`] decides whether syncing may happen at all and
//!   against which endpoint, probing reachability and backing off after
//!   failures.
//! - [`ReconciliationEngine`] runs fetch / reconcile / push cycles for one
//!   identity and performs relay-first hard deletes.
//! - [`Relay`] is the seam to the remote side; [`MemoryRelayNetwork`] serves
//!   in-memory relays for tests and local use.
//!
//! ## Key Properties
//!
//! - **Non-destructive**: an unsynced local edit is never overwritten by a
//!   remote version that did not start from the same base
//! - **Idempotent**: re-running a cycle with nothing new changes nothing
//! - **Serialized**: at most one cycle is in flight per engine
//! - **Resumable**: a failed cycle leaves local state ready for the next
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notevault_core::{IdentityId, SystemClock};
//! use notevault_store::MemoryStore;
//! use notevault_sync::{
//!     ConnectionConfig, ConnectionManager, MemoryRelayNetwork, ReconciliationEngine,
//!     SyncConfig, SyncMode,
//! };
//!
//! async fn example(identity: IdentityId) {
//!     let network = MemoryRelayNetwork::new();
//!     network.serve("memory://cloud");
//!
//!     let connection = ConnectionManager::new(
//!         ConnectionConfig {
//!             mode: SyncMode::Cloud,
//!             cloud_url: Some("memory://cloud".into()),
//!             ..ConnectionConfig::default()
//!         },
//!         network,
//!     );
//!     connection.test_connection().await;
//!
//!     let store = Arc::new(MemoryStore::new(SystemClock::shared()));
//!     let engine = ReconciliationEngine::new(store, connection, identity, SyncConfig::default());
//!     let report = engine.run_cycle_now().await.unwrap();
//!     println!("pushed {} records", report.pushed);
//! }
//! ```
//!
//! ## Cycle
//!
//! ```text
//! Device                               Relay
//!   |-------- list_all(identity) ------>|
//!   |<------- remote records -----------|
//!   |  reconcile each into the store    |
//!   |-------- bulk_upsert(unsynced) --->|
//!   |  mark pushed records synced       |
//! ```

pub mod connection;
pub mod engine;
pub mod error;
pub mod reconcile;
pub mod relay;

pub use connection::{
    backoff_delay, ConnectionConfig, ConnectionManager, ConnectionStatus, SyncMode,
};
pub use engine::{CycleReport, ReconciliationEngine, SyncConfig};
pub use error::{Result, SyncError};
pub use reconcile::{decide_pull, should_push, PullDecision};
pub use relay::{
    memory::MemoryRelay, memory::MemoryRelayNetwork, memory::MemoryRelayServer, Relay,
    RelayConnector, RelayEvent,
};
