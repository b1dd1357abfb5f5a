//! Two devices sharing one recovery phrase, syncing through an in-memory
//! relay. Run with `RUST_LOG`-style output from the fmt subscriber.

use std::sync::Arc;

use notevault::core::SystemClock;
use notevault::store::MemoryStore;
use notevault::sync::{ConnectionConfig, MemoryRelayNetwork, SyncConfig};
use notevault::{generate_phrase, NoteEdit, Notebook, NotebookConfig, SyncMode};

const RELAY: &str = "memory://relay";

async fn device(phrase: &str, network: Arc<MemoryRelayNetwork>) -> anyhow::Result<Notebook> {
    let config = NotebookConfig {
        sync: SyncConfig::default(),
        connection: ConnectionConfig {
            mode: SyncMode::Cloud,
            cloud_url: Some(RELAY.into()),
            ..ConnectionConfig::default()
        },
    };
    let store = Arc::new(MemoryStore::new(SystemClock::shared()));
    let notebook = Notebook::unlock(phrase, store, network, config).await?;
    notebook.connection().test_connection().await;
    Ok(notebook)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let network = MemoryRelayNetwork::new();
    network.serve(RELAY);

    let phrase = generate_phrase()?;
    let laptop = device(&phrase, network.clone()).await?;
    let phone = device(&phrase, network.clone()).await?;

    let shared = laptop.create_note("Trip", "pack the tent", None).await?;
    phone.create_note("Ideas", "a better kettle", None).await?;

    laptop.sync_now().await?;
    phone.sync_now().await?;
    laptop.sync_now().await?;
    println!("laptop sees {} notes", laptop.list_notes().await?.len());
    println!("phone sees {} notes", phone.list_notes().await?.len());

    // Both edit the same note before either syncs again.
    laptop
        .edit_note(shared.id, NoteEdit::new().content("pack the tent and stove"))
        .await?;
    phone
        .edit_note(shared.id, NoteEdit::new().content("pack the tent, no stove"))
        .await?;
    phone.sync_now().await?;
    laptop.sync_now().await?;

    if let Some(conflict) = laptop.conflict_of(shared.id).await? {
        println!("conflict: local={:?} remote={:?}", conflict.local, conflict.remote);
        laptop
            .resolve_conflict(shared.id, "pack the tent; stove optional")
            .await?;
        laptop.sync_now().await?;
        phone.sync_now().await?;
    }

    println!("phone now reads {:?}", phone.read_note(shared.id).await?.content);
    Ok(())
}
