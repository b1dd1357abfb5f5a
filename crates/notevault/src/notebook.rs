//! The Notebook: plaintext note API over encrypted storage and sync.
//!
//! A notebook is one unlocked identity bound to a local store and a relay
//! connector. Everything it writes is encrypted before it reaches the store;
//! everything it returns has been decrypted with the identity's key.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use notevault_core::{Clock, ExportDocument, IdentityId, Record, RecordId, RecordPatch};
use notevault_crypto::{
    content_metadata, decrypt_to_string, derive_identity, encrypt_field, unwrap_session,
    wrap_session, CryptoError, Identity,
};
use notevault_store::{LocalStore, LocalStoreExt};
use notevault_sync::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, CycleReport, ReconciliationEngine,
    RelayConnector, SyncConfig, SyncMode,
};

use crate::error::{NotebookError, Result};

/// Configuration for a notebook.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookConfig {
    /// Reconciliation behavior.
    pub sync: SyncConfig,
    /// Relay endpoints and backoff.
    pub connection: ConnectionConfig,
}

/// A decrypted note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: RecordId,
    pub title: String,
    pub content: String,
    pub folder: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub deleted: bool,
    pub synced: bool,
    /// A remote version is waiting for a manual merge.
    pub has_conflict: bool,
}

/// Changes to apply to a note. Unset fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteEdit {
    title: Option<String>,
    content: Option<String>,
    folder: Option<Option<String>>,
}

impl NoteEdit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Move to `folder`, or out of any folder with `None`.
    pub fn folder(mut self, folder: Option<&str>) -> Self {
        self.folder = Some(folder.map(str::to_string));
        self
    }
}

/// Both sides of an unresolved conflict, decrypted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictView {
    /// The local, unsynced content.
    pub local: String,
    /// The remote content parked when the conflict was detected.
    pub remote: String,
    pub remote_updated_at: i64,
}

/// One unlocked identity's notes.
///
/// Provides a unified API for:
/// - Creating, editing and reading notes
/// - Trash, restore and permanent deletion
/// - Viewing and resolving sync conflicts
/// - Export and import
/// - PIN sessions
/// - Driving sync
pub struct Notebook {
    identity: Identity,
    store: Arc<dyn LocalStore>,
    connection: ConnectionManager,
    engine: ReconciliationEngine,
}

impl Notebook {
    // ─────────────────────────────────────────────────────────────────────────
    // Unlocking
    // ─────────────────────────────────────────────────────────────────────────

    /// Unlock with a recovery phrase.
    ///
    /// Key stretching runs on the blocking pool.
    pub async fn unlock(
        phrase: &str,
        store: Arc<dyn LocalStore>,
        connector: Arc<dyn RelayConnector>,
        config: NotebookConfig,
    ) -> Result<Self> {
        let phrase = phrase.to_string();
        let identity = run_blocking(move || derive_identity(&phrase)).await?;
        info!(identity = %identity.id(), "notebook unlocked with recovery phrase");
        Ok(Self::with_identity(identity, store, connector, config))
    }

    /// Unlock with the PIN session stored on this device.
    ///
    /// A wrong PIN fails with [`CryptoError::WrongPin`] and changes nothing.
    pub async fn unlock_with_pin(
        pin: &str,
        store: Arc<dyn LocalStore>,
        connector: Arc<dyn RelayConnector>,
        config: NotebookConfig,
    ) -> Result<Self> {
        let wrapped = store.load_session().await?.ok_or(NotebookError::NoSession)?;
        let pin = pin.to_string();
        let identity = run_blocking(move || unwrap_session(&wrapped, &pin)).await?;
        info!(identity = %identity.id(), "notebook unlocked with PIN");
        Ok(Self::with_identity(identity, store, connector, config))
    }

    /// Build a notebook around an already-derived identity.
    pub fn with_identity(
        identity: Identity,
        store: Arc<dyn LocalStore>,
        connector: Arc<dyn RelayConnector>,
        config: NotebookConfig,
    ) -> Self {
        let connection = ConnectionManager::new(config.connection, connector);
        let engine = ReconciliationEngine::new(
            store.clone(),
            connection.clone(),
            identity.id(),
            config.sync,
        );
        Self {
            identity,
            store,
            connection,
            engine,
        }
    }

    /// Stop syncing and drop the key.
    pub fn lock(self) {
        self.engine.stop();
        debug!(identity = %self.identity.id(), "notebook locked");
    }

    pub fn identity_id(&self) -> IdentityId {
        self.identity.id()
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Notes
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a note.
    pub async fn create_note(
        &self,
        title: &str,
        content: &str,
        folder: Option<&str>,
    ) -> Result<Note> {
        let key = self.identity.key();
        let record = Record::new(
            self.identity.id(),
            encrypt_field(title.as_bytes(), key)?,
            encrypt_field(content.as_bytes(), key)?,
            folder
                .map(|folder| encrypt_field(folder.as_bytes(), key))
                .transpose()?,
            content_metadata(content.as_bytes()),
            self.store.clock().now_millis(),
        );

        let saved = self.store.save(record).await?;
        debug!(id = %saved.id, "note created");
        self.open_note(&saved)
    }

    /// Apply `edit` to a note.
    pub async fn edit_note(&self, id: RecordId, edit: NoteEdit) -> Result<Note> {
        self.owned(id).await?;
        let patch = self.seal_edit(edit)?;
        let updated = self.store.update(id, patch).await?;
        self.open_note(&updated)
    }

    pub async fn read_note(&self, id: RecordId) -> Result<Note> {
        let record = self.owned(id).await?;
        self.open_note(&record)
    }

    /// Live notes, most recently edited first.
    pub async fn list_notes(&self) -> Result<Vec<Note>> {
        let records = self.store.list_active(&self.identity.id()).await?;
        records.iter().map(|record| self.open_note(record)).collect()
    }

    /// Trashed notes, most recently trashed first.
    pub async fn list_trash(&self) -> Result<Vec<Note>> {
        let records = self.store.list_trash(&self.identity.id()).await?;
        records.iter().map(|record| self.open_note(record)).collect()
    }

    pub async fn trash_note(&self, id: RecordId) -> Result<Note> {
        self.owned(id).await?;
        let record = self.store.soft_delete(id).await?;
        self.open_note(&record)
    }

    pub async fn restore_note(&self, id: RecordId) -> Result<Note> {
        self.owned(id).await?;
        let record = self.store.restore(id).await?;
        self.open_note(&record)
    }

    /// Erase a note from the relay, then from this device.
    ///
    /// If the relay cannot be reached the note stays where it is.
    pub async fn delete_forever(&self, id: RecordId) -> Result<()> {
        self.owned(id).await?;
        self.engine.hard_delete(id).await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Conflicts
    // ─────────────────────────────────────────────────────────────────────────

    /// Both versions of a conflicted note, or `None` if there is no conflict.
    pub async fn conflict_of(&self, id: RecordId) -> Result<Option<ConflictView>> {
        let record = self.owned(id).await?;
        let Some(conflict) = &record.conflict else {
            return Ok(None);
        };

        let key = self.identity.key();
        Ok(Some(ConflictView {
            local: decrypt_to_string(&record.encrypted_content, key)?,
            remote: decrypt_to_string(&conflict.content, key)?,
            remote_updated_at: conflict.remote_updated_at,
        }))
    }

    /// Replace a conflicted note's content with the manual merge.
    ///
    /// The merge supersedes the remote version and goes out on the next
    /// cycle.
    pub async fn resolve_conflict(&self, id: RecordId, merged: &str) -> Result<Note> {
        let record = self.owned(id).await?;
        if record.conflict.is_none() {
            return Err(NotebookError::NoConflict(id));
        }

        let patch = self.seal_edit(NoteEdit::new().content(merged))?;
        let resolved = self.store.update(id, patch).await?;
        info!(%id, "conflict resolved");
        self.open_note(&resolved)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export / import
    // ─────────────────────────────────────────────────────────────────────────

    /// Snapshot every record of this identity, still encrypted, as JSON.
    pub async fn export(&self) -> Result<String> {
        let records = self.store.list_all(&self.identity.id()).await?;
        let document = ExportDocument::from_records(records, self.store.clock().now_millis());
        Ok(document.to_json()?)
    }

    /// Replace this identity's records with an exported snapshot.
    ///
    /// The document is validated in full before anything is touched.
    /// Returns the number of records imported.
    pub async fn import(&self, json: &str) -> Result<usize> {
        let document = ExportDocument::from_json(json)?;
        document.validate(&self.identity.id())?;

        let records = document.into_import_records();
        self.store
            .replace_identity(&self.identity.id(), &records)
            .await?;
        info!(count = records.len(), "export document imported");
        Ok(records.len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Device state
    // ─────────────────────────────────────────────────────────────────────────

    /// Wrap the unlocked identity under `pin` and keep it on this device.
    pub async fn set_pin(&self, pin: &str) -> Result<()> {
        let key = self.identity.key().clone();
        let id = self.identity.id();
        let pin = pin.to_string();
        let wrapped = run_blocking(move || wrap_session(&key, id, &pin)).await?;
        self.store.store_session(&wrapped).await?;
        info!("PIN session stored");
        Ok(())
    }

    pub async fn clear_pin(&self) -> Result<()> {
        self.store.clear_session().await?;
        Ok(())
    }

    pub async fn has_pin(&self) -> Result<bool> {
        Ok(self.store.load_session().await?.is_some())
    }

    /// Remove this identity's notes and the PIN session from this device.
    ///
    /// The relay is not touched. Returns the number of records removed.
    pub async fn clear_local_data(&self) -> Result<usize> {
        self.engine.stop();
        let removed = self.store.wipe_identity(&self.identity.id()).await?;
        self.store.clear_session().await?;
        info!(removed, "local data cleared");
        Ok(removed)
    }

    /// Local writes the relay has not acknowledged yet.
    pub async fn pending_changes(&self) -> Result<usize> {
        Ok(self.store.pending_intents(&self.identity.id()).await?.len())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Switch sync mode and check the new endpoint.
    pub async fn set_sync_mode(&self, mode: SyncMode) -> bool {
        self.connection.set_mode(mode).await
    }

    /// Force local-only operation, or lift the override.
    pub async fn set_offline(&self, offline: bool) -> bool {
        self.connection.set_offline_override(offline).await
    }

    /// Run one reconciliation cycle now.
    pub async fn sync_now(&self) -> Result<CycleReport> {
        Ok(self.engine.run_cycle_now().await?)
    }

    /// Check the relay and start background sync.
    ///
    /// An unreachable relay schedules a backoff retry; editing continues
    /// locally in the meantime.
    pub async fn start_sync(&self) {
        if self.connection.mode() != SyncMode::Disabled && !self.connection.test_connection().await
        {
            self.connection.report_failure();
        }
        self.engine.start();
    }

    pub fn stop_sync(&self) {
        self.engine.stop();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal
    // ─────────────────────────────────────────────────────────────────────────

    async fn owned(&self, id: RecordId) -> Result<Record> {
        match self.store.get(&id).await? {
            Some(record) if record.identity_id == self.identity.id() => Ok(record),
            _ => Err(NotebookError::NoteNotFound(id)),
        }
    }

    fn seal_edit(&self, edit: NoteEdit) -> Result<RecordPatch> {
        let key = self.identity.key();
        let mut patch = RecordPatch::new();
        if let Some(title) = edit.title {
            patch = patch.title(encrypt_field(title.as_bytes(), key)?);
        }
        if let Some(content) = edit.content {
            patch = patch.content(
                encrypt_field(content.as_bytes(), key)?,
                content_metadata(content.as_bytes()),
            );
        }
        if let Some(folder) = edit.folder {
            let sealed = folder
                .map(|folder| encrypt_field(folder.as_bytes(), key))
                .transpose()?;
            patch = patch.folder(sealed);
        }
        Ok(patch)
    }

    fn open_note(&self, record: &Record) -> Result<Note> {
        let key = self.identity.key();
        Ok(Note {
            id: record.id,
            title: decrypt_to_string(&record.encrypted_title, key)?,
            content: decrypt_to_string(&record.encrypted_content, key)?,
            folder: record
                .encrypted_folder
                .as_ref()
                .map(|folder| decrypt_to_string(folder, key))
                .transpose()?,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted: record.deleted,
            synced: record.synced,
            has_conflict: record.has_conflict(),
        })
    }
}

/// Run CPU-heavy key work off the async runtime.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> std::result::Result<T, CryptoError> + Send + 'static,
    T: Send + 'static,
{
    let out = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| NotebookError::Background(e.to_string()))?;
    Ok(out?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use notevault_core::{ManualClock, DAY_MS};
    use notevault_crypto::EncryptionKey;
    use notevault_store::MemoryStore;
    use notevault_sync::MemoryRelayNetwork;

    const PHRASE: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn identity(seed: u8) -> Identity {
        Identity::from_parts(
            EncryptionKey::from_bytes([seed; 32]),
            IdentityId::from_bytes([seed; 16]),
        )
    }

    fn notebook(seed: u8, store: Arc<dyn LocalStore>) -> Notebook {
        Notebook::with_identity(
            identity(seed),
            store,
            MemoryRelayNetwork::new(),
            NotebookConfig::default(),
        )
    }

    fn memory_store() -> Arc<dyn LocalStore> {
        Arc::new(MemoryStore::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn test_create_and_read_note() {
        let notebook = notebook(1, memory_store());

        let created = notebook
            .create_note("Groceries", "eggs, milk", Some("home"))
            .await
            .unwrap();
        assert_eq!(created.title, "Groceries");
        assert!(!created.synced);

        let read = notebook.read_note(created.id).await.unwrap();
        assert_eq!(read, created);
        assert_eq!(read.folder.as_deref(), Some("home"));
        assert_eq!(notebook.pending_changes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_store_never_sees_plaintext() {
        let store = memory_store();
        let notebook = notebook(1, store.clone());
        let note = notebook.create_note("secret", "the plan", None).await.unwrap();

        let raw = store.get(&note.id).await.unwrap().unwrap();
        assert_ne!(raw.encrypted_content.ciphertext, "the plan");
        assert!(!format!("{raw:?}").contains("the plan"));
    }

    #[tokio::test]
    async fn test_edit_only_touches_given_fields() {
        let notebook = notebook(1, memory_store());
        let note = notebook.create_note("draft", "body", Some("work")).await.unwrap();

        let renamed = notebook
            .edit_note(note.id, NoteEdit::new().title("final"))
            .await
            .unwrap();
        assert_eq!(renamed.title, "final");
        assert_eq!(renamed.content, "body");
        assert_eq!(renamed.folder.as_deref(), Some("work"));
        assert!(renamed.updated_at > note.updated_at);

        let moved = notebook
            .edit_note(note.id, NoteEdit::new().folder(None))
            .await
            .unwrap();
        assert_eq!(moved.folder, None);
    }

    #[tokio::test]
    async fn test_trash_and_restore() {
        let notebook = notebook(1, memory_store());
        let note = notebook.create_note("old", "stuff", None).await.unwrap();

        let trashed = notebook.trash_note(note.id).await.unwrap();
        assert!(trashed.deleted);
        assert!(notebook.list_notes().await.unwrap().is_empty());
        assert_eq!(notebook.list_trash().await.unwrap().len(), 1);

        notebook.restore_note(note.id).await.unwrap();
        assert_eq!(notebook.list_notes().await.unwrap().len(), 1);
        assert!(notebook.list_trash().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_identity_notes_are_invisible() {
        let store = memory_store();
        let alice = notebook(1, store.clone());
        let bob = notebook(2, store);

        let note = alice.create_note("alice", "private", None).await.unwrap();
        assert!(matches!(
            bob.read_note(note.id).await,
            Err(NotebookError::NoteNotFound(_))
        ));
        assert!(matches!(
            bob.trash_note(note.id).await,
            Err(NotebookError::NoteNotFound(_))
        ));
        assert!(bob.list_notes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_key_surfaces_decryption_error() {
        let store = memory_store();
        let writer = notebook(1, store.clone());
        let note = writer.create_note("t", "c", None).await.unwrap();

        let impostor = Notebook::with_identity(
            Identity::from_parts(EncryptionKey::from_bytes([9; 32]), writer.identity_id()),
            store,
            MemoryRelayNetwork::new(),
            NotebookConfig::default(),
        );
        assert!(matches!(
            impostor.read_note(note.id).await,
            Err(NotebookError::Crypto(CryptoError::DecryptionError(_)))
        ));
    }

    #[tokio::test]
    async fn test_delete_forever_with_sync_disabled() {
        let notebook = notebook(1, memory_store());
        let note = notebook.create_note("bye", "gone", None).await.unwrap();

        notebook.delete_forever(note.id).await.unwrap();
        assert!(matches!(
            notebook.read_note(note.id).await,
            Err(NotebookError::NoteNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_resolve_without_conflict_is_rejected() {
        let notebook = notebook(1, memory_store());
        let note = notebook.create_note("t", "c", None).await.unwrap();

        assert_eq!(notebook.conflict_of(note.id).await.unwrap(), None);
        assert!(matches!(
            notebook.resolve_conflict(note.id, "merged").await,
            Err(NotebookError::NoConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_export_then_import_restores_snapshot() {
        let notebook = notebook(1, memory_store());
        let kept = notebook.create_note("kept", "a", None).await.unwrap();
        let binned = notebook.create_note("binned", "b", None).await.unwrap();
        notebook.trash_note(binned.id).await.unwrap();

        let json = notebook.export().await.unwrap();
        notebook.create_note("after export", "c", None).await.unwrap();

        assert_eq!(notebook.import(&json).await.unwrap(), 2);
        let notes = notebook.list_notes().await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, kept.id);
        assert_eq!(notebook.list_trash().await.unwrap()[0].id, binned.id);
    }

    #[tokio::test]
    async fn test_import_rejects_foreign_document() {
        let store = memory_store();
        let alice = notebook(1, store.clone());
        let bob = notebook(2, store);
        alice.create_note("a", "a", None).await.unwrap();
        let mine = bob.create_note("b", "b", None).await.unwrap();

        let json = alice.export().await.unwrap();
        assert!(matches!(
            bob.import(&json).await,
            Err(NotebookError::Validation(_))
        ));
        assert!(bob.read_note(mine.id).await.is_ok());

        assert!(matches!(bob.import("not json").await, Err(NotebookError::Core(_))));
    }

    #[tokio::test]
    async fn test_pin_session_lifecycle() {
        let store = memory_store();
        let notebook = notebook(1, store.clone());
        let note = notebook.create_note("t", "pinned", None).await.unwrap();

        let none = Notebook::unlock_with_pin(
            "1234",
            store.clone(),
            MemoryRelayNetwork::new(),
            NotebookConfig::default(),
        )
        .await;
        assert!(matches!(none, Err(NotebookError::NoSession)));

        notebook.set_pin("1234").await.unwrap();
        assert!(notebook.has_pin().await.unwrap());

        let wrong = Notebook::unlock_with_pin(
            "0000",
            store.clone(),
            MemoryRelayNetwork::new(),
            NotebookConfig::default(),
        )
        .await;
        assert!(wrong.err().is_some_and(|e| e.is_wrong_pin()));
        assert!(notebook.has_pin().await.unwrap());

        let reopened = Notebook::unlock_with_pin(
            "1234",
            store.clone(),
            MemoryRelayNetwork::new(),
            NotebookConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(reopened.identity_id(), notebook.identity_id());
        assert_eq!(reopened.read_note(note.id).await.unwrap().content, "pinned");

        notebook.clear_pin().await.unwrap();
        assert!(!notebook.has_pin().await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_local_data_is_identity_scoped() {
        let store = memory_store();
        let alice = notebook(1, store.clone());
        let bob = notebook(2, store);
        alice.create_note("a", "a", None).await.unwrap();
        alice.create_note("a2", "a2", None).await.unwrap();
        bob.create_note("b", "b", None).await.unwrap();

        assert_eq!(alice.clear_local_data().await.unwrap(), 2);
        assert!(alice.list_notes().await.unwrap().is_empty());
        assert_eq!(bob.list_notes().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unlock_with_phrase_is_deterministic() {
        let store = memory_store();
        let unlock = |phrase: &'static str| {
            Notebook::unlock(
                phrase,
                store.clone(),
                MemoryRelayNetwork::new(),
                NotebookConfig::default(),
            )
        };

        let first = unlock(PHRASE).await.unwrap();
        let second = unlock(PHRASE).await.unwrap();
        assert_eq!(first.identity_id(), second.identity_id());

        let bad = unlock("not a phrase").await;
        assert!(matches!(
            bad,
            Err(NotebookError::Crypto(CryptoError::InvalidPhrase(_)))
        ));
    }

    #[tokio::test]
    async fn test_old_trash_is_gone_after_sweep() {
        let clock = ManualClock::new(1_000);
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new(clock.clone()));
        let notebook = notebook(1, store.clone());
        let note = notebook.create_note("t", "c", None).await.unwrap();
        notebook.trash_note(note.id).await.unwrap();

        clock.advance(31 * DAY_MS);
        store.sweep_expired(30 * DAY_MS).await.unwrap();
        assert!(notebook.list_trash().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notes_and_pin_survive_reopen() {
        use notevault_store::SqliteStore;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.db");

        let id = {
            let store: Arc<dyn LocalStore> =
                Arc::new(SqliteStore::open(&path, ManualClock::new(1_000)).unwrap());
            let notebook = notebook(1, store);
            notebook.set_pin("2468").await.unwrap();
            notebook.create_note("kept", "on disk", None).await.unwrap().id
        };

        let store: Arc<dyn LocalStore> =
            Arc::new(SqliteStore::open(&path, ManualClock::new(2_000)).unwrap());
        let reopened = Notebook::unlock_with_pin(
            "2468",
            store,
            MemoryRelayNetwork::new(),
            NotebookConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(reopened.identity_id(), identity(1).id());
        assert_eq!(reopened.read_note(id).await.unwrap().content, "on disk");
    }
}
