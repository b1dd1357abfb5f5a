//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use notevault::{Notebook, NotebookConfig};
use notevault_core::{
    Clock, EncryptedField, IdentityId, ManualClock, Record, RecordPatch, RemoteRecord,
};
use notevault_crypto::{
    content_metadata, decrypt_to_string, encrypt_field, CryptoError, EncryptionKey, Identity,
};
use notevault_store::MemoryStore;
use notevault_sync::{
    ConnectionConfig, MemoryRelayNetwork, MemoryRelayServer, SyncConfig, SyncMode,
};

/// A valid BIP-39 phrase for tests that exercise real key derivation.
pub const FIXTURE_PHRASE: &str =
    "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

/// Relay endpoint served by [`Cluster`].
pub const RELAY_URL: &str = "memory://relay";

/// Wall-clock start for fixture clocks.
pub const T0: i64 = 1_700_000_000_000;

/// An identity, a manual clock and a memory store.
pub struct TestFixture {
    pub identity: Identity,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

impl TestFixture {
    /// Create a fixture with a random identity.
    pub fn new() -> Self {
        Self::with_identity(Identity::from_parts(
            EncryptionKey::generate(),
            IdentityId::from_bytes(rand::random()),
        ))
    }

    /// Create with a deterministic identity from seed.
    pub fn with_seed(seed: u8) -> Self {
        Self::with_identity(Identity::from_parts(
            EncryptionKey::from_bytes([seed; 32]),
            IdentityId::from_bytes([seed; 16]),
        ))
    }

    pub fn with_identity(identity: Identity) -> Self {
        let clock = ManualClock::new(T0);
        Self {
            store: Arc::new(MemoryStore::new(clock.clone())),
            identity,
            clock,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn identity_id(&self) -> IdentityId {
        self.identity.id()
    }

    pub fn seal(&self, plaintext: &str) -> Result<EncryptedField, CryptoError> {
        encrypt_field(plaintext.as_bytes(), self.identity.key())
    }

    pub fn open(&self, field: &EncryptedField) -> Result<String, CryptoError> {
        decrypt_to_string(field, self.identity.key())
    }

    /// An unsaved note stamped with the fixture clock.
    pub fn note(&self, title: &str, content: &str) -> Result<Record, CryptoError> {
        Ok(Record::new(
            self.identity.id(),
            self.seal(title)?,
            self.seal(content)?,
            None,
            content_metadata(content.as_bytes()),
            self.clock.now_millis(),
        ))
    }

    /// A patch replacing a note's content.
    pub fn content_patch(&self, content: &str) -> Result<RecordPatch, CryptoError> {
        Ok(RecordPatch::new().content(self.seal(content)?, content_metadata(content.as_bytes())))
    }

    /// The relay copy of `base` as another device would have rewritten it.
    pub fn remote_edit(
        &self,
        base: &Record,
        content: &str,
        updated_at: i64,
    ) -> Result<RemoteRecord, CryptoError> {
        let mut remote = base.to_remote();
        remote.encrypted_content = self.seal(content)?;
        remote.metadata = content_metadata(content.as_bytes());
        remote.updated_at = updated_at;
        Ok(remote)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create fixtures for distinct identities.
pub fn multi_identity_fixtures(count: usize) -> Vec<TestFixture> {
    (0..count)
        .map(|i| TestFixture::with_seed(i as u8 + 1))
        .collect()
}

/// One device: its own clock and store, a notebook unlocked for the
/// cluster's identity.
pub struct Device {
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
    pub notebook: Notebook,
}

/// Devices sharing one identity and one in-memory relay.
pub struct Cluster {
    pub network: Arc<MemoryRelayNetwork>,
    pub server: Arc<MemoryRelayServer>,
    pub identity: Identity,
    pub devices: Vec<Device>,
}

impl Cluster {
    /// `count` devices on a fixed identity, all connected.
    pub async fn new(count: usize) -> Self {
        Self::with_config(count, SyncConfig::default()).await
    }

    pub async fn with_config(count: usize, sync: SyncConfig) -> Self {
        let identity = Identity::from_parts(
            EncryptionKey::from_bytes([0x5a; 32]),
            IdentityId::from_bytes([0x5a; 16]),
        );
        let network = MemoryRelayNetwork::new();
        let server = network.serve(RELAY_URL);

        let mut devices = Vec::with_capacity(count);
        for _ in 0..count {
            let clock = ManualClock::new(T0);
            let store = Arc::new(MemoryStore::new(clock.clone()));
            let notebook = Notebook::with_identity(
                identity.clone(),
                store.clone(),
                network.clone(),
                cluster_config(sync.clone()),
            );
            notebook.connection().test_connection().await;
            devices.push(Device {
                clock,
                store,
                notebook,
            });
        }

        Self {
            network,
            server,
            identity,
            devices,
        }
    }

    pub fn device(&self, index: usize) -> &Device {
        &self.devices[index]
    }

    /// Move every device clock forward by `ms`.
    pub fn advance(&self, ms: i64) {
        for device in &self.devices {
            device.clock.advance(ms);
        }
    }
}

/// Notebook configuration pointing at [`RELAY_URL`].
pub fn cluster_config(sync: SyncConfig) -> NotebookConfig {
    NotebookConfig {
        sync,
        connection: ConnectionConfig {
            mode: SyncMode::Cloud,
            cloud_url: Some(RELAY_URL.into()),
            ..ConnectionConfig::default()
        },
    }
}
