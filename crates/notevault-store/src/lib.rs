//! # Notevault Store
//!
//! Durable, queryable storage for encrypted records. The store never sees
//! plaintext: it accepts already-encrypted [`Record`](notevault_core::Record)s
//! and keeps their sync bookkeeping.
//!
//! ## Key Types
//!
//! - [`LocalStore`] - The async trait every backend implements
//! - [`LocalStoreExt`] - User-path writes (`save`, `update`, `soft_delete`,
//!   `restore`) built on compare-and-swap with retry
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests and ephemeral sessions
//! - [`StoreEvent`] - Change notifications for observers
//!
//! ## Usage
//!
//! ```rust,no_run
//! use notevault_core::SystemClock;
//! use notevault_store::{LocalStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("notes.db", SystemClock::shared()).unwrap();
//!     let mut events = store.subscribe();
//!     // store.save(record).await.unwrap();
//!     // let event = events.recv().await.unwrap();
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Optimistic concurrency**: every write to an existing id is a
//!   compare-and-swap on `updatedAt`. A lost race is retried against the
//!   fresh row, so an autosave and an inbound sync write never clobber
//!   each other.
//! - **Monotonic timestamps**: user-path writes stamp
//!   `updatedAt = max(now, previous + 1)`.
//! - **Tombstone expiry**: tombstones older than 30 days are purged when a
//!   store is opened and on every explicit sweep.
//! - **Outbound intents**: each unsynced user write leaves one intent per
//!   record; intents disappear when the record is marked synced, hard
//!   deleted or wiped.

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{
    IntentKind, LocalStore, LocalStoreExt, StoreEvent, SyncIntent, EVENT_CAPACITY,
    MAX_WRITE_ATTEMPTS,
};
