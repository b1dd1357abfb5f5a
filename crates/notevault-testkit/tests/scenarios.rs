//! Multi-device scenarios against one in-memory relay.

use std::sync::Arc;

use proptest::prelude::*;

use notevault::{NoteEdit, Notebook, NotebookError};
use notevault_core::{Clock, ManualClock, DAY_MS};
use notevault_crypto::{derive_identity, unwrap_session, wrap_session, CryptoError};
use notevault_store::{LocalStore, LocalStoreExt, SqliteStore};
use notevault_sync::{RelayConnector, RelayEvent};
use notevault_testkit::fixtures::{cluster_config, Cluster, TestFixture, FIXTURE_PHRASE, RELAY_URL, T0};
use notevault_testkit::generators::{note_actions, NoteAction};

#[tokio::test]
async fn test_scenario_a_offline_record_is_pushed_on_next_cycle() {
    let cluster = Cluster::new(1).await;
    let device = cluster.device(0);
    device.clock.set(100);

    let note = device
        .notebook
        .create_note("offline", "written on a plane", None)
        .await
        .unwrap();
    assert_eq!(note.updated_at, 100);
    assert!(cluster.server.records(&cluster.identity.id()).is_empty());

    let report = device.notebook.sync_now().await.unwrap();
    assert_eq!(report.pushed, 1);

    let remote = cluster.server.get(&cluster.identity.id(), &note.id).unwrap();
    assert_eq!(remote.updated_at, 100);
    assert!(device.notebook.read_note(note.id).await.unwrap().synced);
}

#[tokio::test]
async fn test_scenario_b_two_devices_converge() {
    let cluster = Cluster::new(2).await;
    let laptop = &cluster.device(0).notebook;
    let phone = &cluster.device(1).notebook;

    let a = laptop.create_note("laptop", "from the laptop", None).await.unwrap();
    let b = phone.create_note("phone", "from the phone", None).await.unwrap();

    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();
    laptop.sync_now().await.unwrap();

    let mut expected = vec![a.id, b.id];
    expected.sort();

    for notebook in [laptop, phone] {
        let mut ids: Vec<_> = notebook
            .list_notes()
            .await
            .unwrap()
            .into_iter()
            .map(|note| note.id)
            .collect();
        ids.sort();
        assert_eq!(ids, expected);
        assert!(notebook.list_notes().await.unwrap().iter().all(|n| n.synced));
    }

    let mut relay_ids: Vec<_> = cluster
        .server
        .records(&cluster.identity.id())
        .into_iter()
        .map(|r| r.id)
        .collect();
    relay_ids.sort();
    assert_eq!(relay_ids, expected);
}

#[test]
fn test_scenario_c_pin_session_roundtrip() {
    let identity = derive_identity(FIXTURE_PHRASE).unwrap();
    let wrapped = wrap_session(identity.key(), identity.id(), "1234").unwrap();

    let unwrapped = unwrap_session(&wrapped, "1234").unwrap();
    assert_eq!(unwrapped.id(), identity.id());
    assert_eq!(unwrapped.key().as_bytes(), identity.key().as_bytes());

    assert!(matches!(
        unwrap_session(&wrapped, "0000"),
        Err(CryptoError::WrongPin)
    ));
}

#[tokio::test]
async fn test_scenario_c_pin_unlock_on_device() {
    let cluster = Cluster::new(1).await;
    let device = cluster.device(0);
    device.notebook.set_pin("1234").await.unwrap();

    let unlock = |pin: &'static str| {
        Notebook::unlock_with_pin(
            pin,
            device.store.clone(),
            cluster.network.clone(),
            cluster_config(Default::default()),
        )
    };

    assert!(unlock("0000").await.err().is_some_and(|e| e.is_wrong_pin()));
    let reopened = unlock("1234").await.unwrap();
    assert_eq!(reopened.identity_id(), cluster.identity.id());
}

#[tokio::test]
async fn test_concurrent_edits_become_a_conflict_not_an_overwrite() {
    let cluster = Cluster::new(2).await;
    let laptop = &cluster.device(0).notebook;
    let phone = &cluster.device(1).notebook;

    let note = laptop.create_note("plan", "v1", None).await.unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    laptop
        .edit_note(note.id, NoteEdit::new().content("laptop edit"))
        .await
        .unwrap();
    cluster.device(1).clock.advance(1_000);
    phone
        .edit_note(note.id, NoteEdit::new().content("phone edit"))
        .await
        .unwrap();

    phone.sync_now().await.unwrap();
    let report = laptop.sync_now().await.unwrap();
    assert_eq!(report.conflicts, 1);

    let local = laptop.read_note(note.id).await.unwrap();
    assert_eq!(local.content, "laptop edit");
    assert!(local.has_conflict);
    assert!(!local.synced);

    let conflict = laptop.conflict_of(note.id).await.unwrap().unwrap();
    assert_eq!(conflict.local, "laptop edit");
    assert_eq!(conflict.remote, "phone edit");

    let relay_copy = cluster.server.get(&cluster.identity.id(), &note.id).unwrap();
    let fixture = TestFixture::with_identity(cluster.identity.clone());
    assert_eq!(fixture.open(&relay_copy.encrypted_content).unwrap(), "phone edit");

    laptop
        .resolve_conflict(note.id, "laptop edit + phone edit")
        .await
        .unwrap();
    assert_eq!(laptop.sync_now().await.unwrap().pushed, 1);
    assert_eq!(phone.sync_now().await.unwrap().applied, 1);

    let merged = phone.read_note(note.id).await.unwrap();
    assert_eq!(merged.content, "laptop edit + phone edit");
    assert!(!merged.has_conflict);
    assert!(laptop.conflict_of(note.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_synced_record_takes_newer_remote_without_conflict() {
    let cluster = Cluster::new(2).await;
    let laptop = &cluster.device(0).notebook;
    let phone = &cluster.device(1).notebook;

    let note = laptop.create_note("t", "first", None).await.unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    laptop
        .edit_note(note.id, NoteEdit::new().content("second").title("t2"))
        .await
        .unwrap();
    laptop.sync_now().await.unwrap();

    let report = phone.sync_now().await.unwrap();
    assert_eq!(report.applied, 1);
    assert_eq!(report.conflicts, 0);

    let pulled = phone.read_note(note.id).await.unwrap();
    assert_eq!(pulled.content, "second");
    assert_eq!(pulled.title, "t2");
    assert!(pulled.synced);
}

#[tokio::test]
async fn test_trash_and_restore_propagate() {
    let cluster = Cluster::new(2).await;
    let laptop = &cluster.device(0).notebook;
    let phone = &cluster.device(1).notebook;

    let note = laptop.create_note("t", "c", None).await.unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    laptop.trash_note(note.id).await.unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();
    assert_eq!(phone.list_trash().await.unwrap().len(), 1);
    assert!(phone.list_notes().await.unwrap().is_empty());

    cluster.device(1).clock.advance(10);
    phone.restore_note(note.id).await.unwrap();
    phone.sync_now().await.unwrap();
    laptop.sync_now().await.unwrap();
    assert_eq!(laptop.list_notes().await.unwrap().len(), 1);
    assert!(laptop.list_trash().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_hard_delete_leaves_record_intact() {
    let cluster = Cluster::new(1).await;
    let notebook = &cluster.device(0).notebook;
    let note = notebook.create_note("keep", "me", None).await.unwrap();
    notebook.sync_now().await.unwrap();
    let before = notebook.read_note(note.id).await.unwrap();

    cluster.server.reject_hard_deletes(true);
    assert!(notebook.delete_forever(note.id).await.is_err());

    assert_eq!(notebook.read_note(note.id).await.unwrap(), before);
    assert!(cluster.server.get(&cluster.identity.id(), &note.id).is_some());
}

#[tokio::test]
async fn test_pending_hard_delete_is_not_resurrected_by_a_stale_device() {
    let cluster = Cluster::new(2).await;
    let laptop = &cluster.device(0).notebook;
    let phone = &cluster.device(1).notebook;

    let note = laptop.create_note("doomed", "x", None).await.unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    laptop.delete_forever(note.id).await.unwrap();
    assert!(cluster.server.get(&cluster.identity.id(), &note.id).is_none());

    // The phone missed the delete and pushes its copy back.
    phone.sync_now().await.unwrap();
    assert!(cluster.server.get(&cluster.identity.id(), &note.id).is_some());

    let report = laptop.sync_now().await.unwrap();
    assert_eq!(report.skipped_pending, 1);
    assert!(matches!(
        laptop.read_note(note.id).await,
        Err(NotebookError::NoteNotFound(_))
    ));
}

#[tokio::test]
async fn test_relay_erase_event_removes_synced_copy() {
    let cluster = Cluster::new(2).await;
    let laptop = &cluster.device(0).notebook;
    let phone = &cluster.device(1).notebook;

    let note = laptop.create_note("gone", "soon", None).await.unwrap();
    laptop.sync_now().await.unwrap();
    phone.sync_now().await.unwrap();

    laptop.delete_forever(note.id).await.unwrap();
    let report = phone
        .engine()
        .apply_relay_event(RelayEvent::HardDeleted {
            identity_id: cluster.identity.id(),
            id: note.id,
        })
        .await
        .unwrap();
    assert_eq!(report.removed, 1);

    phone.sync_now().await.unwrap();
    assert!(cluster.server.get(&cluster.identity.id(), &note.id).is_none());
}

#[tokio::test]
async fn test_relay_upsert_is_idempotent() {
    let cluster = Cluster::new(1).await;
    let relay = cluster.network.connect(RELAY_URL).unwrap();
    let fixture = TestFixture::with_identity(cluster.identity.clone());
    let record = fixture.note("t", "once").unwrap().to_remote();

    relay.upsert(&record).await.unwrap();
    relay.upsert(&record).await.unwrap();
    relay.bulk_upsert(&[record.clone(), record.clone()]).await.unwrap();

    assert_eq!(cluster.server.records(&cluster.identity.id()), vec![record]);
}

#[tokio::test]
async fn test_store_save_is_idempotent_per_id() {
    let fixture = TestFixture::with_seed(3);
    let record = fixture.note("t", "same").unwrap();

    fixture.store.save(record.clone()).await.unwrap();
    fixture.store.save(record).await.unwrap();

    assert_eq!(fixture.store.list_all(&fixture.identity_id()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_relay_outage_keeps_editing_local_then_recovers() {
    let cluster = Cluster::new(1).await;
    let notebook = &cluster.device(0).notebook;
    let note = notebook.create_note("t", "during outage", None).await.unwrap();

    cluster.server.set_reachable(false);
    match notebook.sync_now().await {
        Err(NotebookError::Sync(e)) => assert!(e.is_network()),
        other => panic!("expected a network failure, got {:?}", other.map(|_| ())),
    }
    assert!(!notebook.status().connected);
    assert_eq!(notebook.pending_changes().await.unwrap(), 1);

    notebook
        .edit_note(note.id, NoteEdit::new().content("still typing"))
        .await
        .unwrap();

    cluster.server.set_reachable(true);
    assert!(notebook.connection().test_connection().await);
    assert_eq!(notebook.sync_now().await.unwrap().pushed, 1);
    assert_eq!(notebook.pending_changes().await.unwrap(), 0);
    assert_eq!(notebook.status().failures, 0);
}

#[tokio::test]
async fn test_tombstones_expire_when_the_store_is_opened() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("notes.db");
    let clock = ManualClock::new(T0);
    let fixture = TestFixture::with_seed(4);

    let (old, recent) = {
        let store = SqliteStore::open(&path, clock.clone()).unwrap();
        let old = store.save(fixture.note("old", "a").unwrap()).await.unwrap();
        let recent = store.save(fixture.note("recent", "b").unwrap()).await.unwrap();

        store.soft_delete(old.id).await.unwrap();
        clock.advance(2 * DAY_MS);
        store.soft_delete(recent.id).await.unwrap();
        (old, recent)
    };

    // 31 days after the first delete, 29 after the second.
    clock.set(T0 + 31 * DAY_MS);
    let store = SqliteStore::open(&path, clock.clone()).unwrap();
    assert!(store.get(&old.id).await.unwrap().is_none());
    assert!(store.get(&recent.id).await.unwrap().is_some());
    assert_eq!(store.clock().now_millis(), T0 + 31 * DAY_MS);
}

#[tokio::test]
async fn test_sqlite_backed_devices_sync() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Cluster::new(1).await;
    let store: Arc<dyn LocalStore> =
        Arc::new(SqliteStore::open(dir.path().join("desk.db"), ManualClock::new(T0 + 5)).unwrap());
    let desk = Notebook::with_identity(
        cluster.identity.clone(),
        store,
        cluster.network.clone(),
        cluster_config(Default::default()),
    );
    desk.connection().test_connection().await;

    let laptop = &cluster.device(0).notebook;
    let note = laptop.create_note("shared", "via sqlite", Some("inbox")).await.unwrap();
    laptop.sync_now().await.unwrap();

    assert_eq!(desk.sync_now().await.unwrap().inserted, 1);
    let pulled = desk.read_note(note.id).await.unwrap();
    assert_eq!(pulled.content, "via sqlite");
    assert_eq!(pulled.folder.as_deref(), Some("inbox"));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_updated_at_never_goes_backwards(actions in note_actions(12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        runtime.block_on(async {
            let cluster = Cluster::new(1).await;
            let notebook = &cluster.device(0).notebook;
            let mut previous = notebook.create_note("t", "start", None).await.unwrap();

            for action in actions {
                let next = match &action {
                    NoteAction::Edit(text) => notebook
                        .edit_note(previous.id, NoteEdit::new().content(text.as_str()))
                        .await
                        .unwrap(),
                    NoteAction::Retitle(text) => notebook
                        .edit_note(previous.id, NoteEdit::new().title(text.as_str()))
                        .await
                        .unwrap(),
                    NoteAction::Trash => notebook.trash_note(previous.id).await.unwrap(),
                    NoteAction::Restore => notebook.restore_note(previous.id).await.unwrap(),
                };

                match action {
                    NoteAction::Edit(_) | NoteAction::Retitle(_) => {
                        prop_assert!(next.updated_at > previous.updated_at)
                    }
                    NoteAction::Trash | NoteAction::Restore => {
                        prop_assert!(next.updated_at >= previous.updated_at)
                    }
                }
                previous = next;
            }
            Ok(())
        })?;
    }
}
