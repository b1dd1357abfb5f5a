//! # Notevault
//!
//! Local-first encrypted notes. Notes are encrypted on the device with a key
//! derived from a recovery phrase, kept in a local store, and converged
//! across devices through a relay that only ever sees ciphertext.
//!
//! ## Overview
//!
//! - **Identity**: a 12-word recovery phrase deterministically yields the
//!   encryption key and the identity id that partitions the relay
//! - **Notes**: every field is sealed independently; edits are stamped with
//!   strictly increasing `updatedAt`
//! - **Sync**: periodic pull / reconcile / push cycles that never overwrite
//!   unsynced local edits; divergent versions are kept for a manual merge
//! - **Trash**: soft-deleted notes expire after 30 days; permanent deletion
//!   reaches the relay before the device
//! - **PIN**: an optional device-local session wrapped under a PIN
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notevault::{generate_phrase, Notebook, NotebookConfig};
//! use notevault::core::SystemClock;
//! use notevault::store::SqliteStore;
//! use notevault::sync::MemoryRelayNetwork;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let phrase = generate_phrase()?;
//!     let store = Arc::new(SqliteStore::open("notes.db", SystemClock::shared())?);
//!
//!     let notebook = Notebook::unlock(
//!         &phrase,
//!         store,
//!         MemoryRelayNetwork::new(),
//!         NotebookConfig::default(),
//!     )
//!     .await?;
//!
//!     let note = notebook.create_note("Groceries", "eggs, milk", None).await?;
//!     notebook.set_pin("1234").await?;
//!     println!("{}", notebook.read_note(note.id).await?.content);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `notevault::core` - Record model, ids, clock, export document
//! - `notevault::crypto` - Key derivation, field cipher, PIN sessions
//! - `notevault::store` - Storage abstraction, SQLite and in-memory stores
//! - `notevault::sync` - Relay protocol, connection manager, reconciliation

pub mod error;
pub mod notebook;

// Re-export component crates
pub use notevault_core as core;
pub use notevault_crypto as crypto;
pub use notevault_store as store;
pub use notevault_sync as sync;

// Re-export main types for convenience
pub use error::{NotebookError, Result};
pub use notebook::{ConflictView, Note, NoteEdit, Notebook, NotebookConfig};

// Re-export commonly used component types
pub use notevault_crypto::generate_phrase;
pub use notevault_sync::{CycleReport, SyncMode};
