//! Recovery phrase handling and identity derivation.

use bip39::Mnemonic;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use notevault_core::IdentityId;

use crate::cipher::EncryptionKey;
use crate::error::{CryptoError, Result};

/// PBKDF2-HMAC-SHA256 rounds for every stretched key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed salt for the encryption key.
pub const ENCRYPTION_SALT: &[u8] = b"notevault/v1/encryption-key";

/// Fixed salt for the identity id. Must differ from [`ENCRYPTION_SALT`].
pub const IDENTITY_SALT: &[u8] = b"notevault/v1/identity-id";

/// The deterministic `{key, id}` pair derived from a recovery phrase.
///
/// The seed bytes are an intermediate value: they are zeroized as soon as
/// both stretched outputs exist and are never persisted.
#[derive(Clone)]
pub struct Identity {
    key: EncryptionKey,
    id: IdentityId,
}

impl Identity {
    /// Reassemble an identity from a key and id (e.g. an unwrapped PIN session).
    pub fn from_parts(key: EncryptionKey, id: IdentityId) -> Self {
        Self { key, id }
    }

    /// The field encryption key.
    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    /// The owner partition key.
    pub fn id(&self) -> IdentityId {
        self.id
    }
}

impl std::fmt::Debug for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("id", &self.id)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Generate a fresh 12-word recovery phrase from 128 bits of entropy.
pub fn generate_phrase() -> Result<String> {
    let mut entropy = Zeroizing::new([0u8; 16]);
    rand::thread_rng().fill_bytes(entropy.as_mut());
    let mnemonic = Mnemonic::from_entropy(entropy.as_ref())
        .map_err(|e| CryptoError::InvalidPhrase(e.to_string()))?;
    Ok(mnemonic.to_string())
}

/// Derive the identity for a recovery phrase.
///
/// Whitespace and letter case in the phrase are normalized first. Fails with
/// [`CryptoError::InvalidPhrase`] if a word is unknown or the checksum does
/// not verify.
///
/// This performs two full key stretches and is deliberately slow; async
/// callers should run it on a blocking worker.
pub fn derive_identity(phrase: &str) -> Result<Identity> {
    let normalized = Zeroizing::new(normalize_phrase(phrase));
    let mnemonic = Mnemonic::parse_normalized(&normalized)
        .map_err(|e| CryptoError::InvalidPhrase(e.to_string()))?;

    let seed = Zeroizing::new(mnemonic.to_seed_normalized(""));

    let key = stretch(seed.as_ref(), ENCRYPTION_SALT);
    let id_material = Zeroizing::new(stretch(seed.as_ref(), IDENTITY_SALT));

    let mut id = [0u8; 16];
    id.copy_from_slice(&id_material[..16]);

    Ok(Identity {
        key: EncryptionKey::from_bytes(key),
        id: IdentityId::from_bytes(id),
    })
}

/// PBKDF2-HMAC-SHA256 with [`PBKDF2_ITERATIONS`] rounds, 32-byte output.
pub fn stretch(secret: &[u8], salt: &[u8]) -> [u8; 32] {
    pbkdf2::pbkdf2_hmac_array::<Sha256, 32>(secret, salt, PBKDF2_ITERATIONS)
}

fn normalize_phrase(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}
