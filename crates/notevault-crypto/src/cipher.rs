//! ChaCha20-Poly1305 field encryption and SHA-256 content hashing.
//!
//! Each field is sealed under a fresh random 96-bit nonce. The AEAD output
//! `ciphertext || tag` is split so the bundle carries the tag separately,
//! and all three parts travel as base64 strings.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use notevault_core::{EncryptedField, RecordMetadata};

use crate::error::{CryptoError, Result};

/// Authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Nonce length in bytes.
const NONCE_LEN: usize = 12;

/// A 256-bit symmetric key for ChaCha20-Poly1305.
#[derive(Clone)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Encrypt, returning `ciphertext || tag`.
    pub(crate) fn seal(&self, plaintext: &[u8], nonce: &EncryptionNonce) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))?;
        cipher
            .encrypt(Nonce::from_slice(&nonce.0), plaintext)
            .map_err(|e| CryptoError::EncryptionError(e.to_string()))
    }

    /// Decrypt `ciphertext || tag`. Any tag failure is reported as `None`.
    pub(crate) fn open(&self, sealed: &[u8], nonce: &EncryptionNonce) -> Option<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new_from_slice(&self.0).ok()?;
        cipher.decrypt(Nonce::from_slice(&nonce.0), sealed).ok()
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(<redacted>)")
    }
}

/// A 96-bit nonce for ChaCha20-Poly1305.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncryptionNonce(pub [u8; NONCE_LEN]);

impl EncryptionNonce {
    /// Generate a new random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; NONCE_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }
}

/// Encrypt one field under `key` with a fresh nonce.
pub fn encrypt_field(plaintext: &[u8], key: &EncryptionKey) -> Result<EncryptedField> {
    let nonce = EncryptionNonce::generate();
    let sealed = key.seal(plaintext, &nonce)?;

    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

    Ok(EncryptedField {
        ciphertext: STANDARD.encode(ciphertext),
        iv: STANDARD.encode(nonce.0),
        auth_tag: STANDARD.encode(tag),
    })
}

/// Decrypt one field.
///
/// Fails with [`CryptoError::DecryptionError`] when any part is not valid
/// base64, has the wrong length, or the tag does not verify.
pub fn decrypt_field(bundle: &EncryptedField, key: &EncryptionKey) -> Result<Vec<u8>> {
    let ciphertext = decode_part(&bundle.ciphertext, "ciphertext")?;
    let iv = decode_part(&bundle.iv, "iv")?;
    let tag = decode_part(&bundle.auth_tag, "authTag")?;

    let iv: [u8; NONCE_LEN] = iv
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::DecryptionError(format!("iv must be {NONCE_LEN} bytes")))?;
    if tag.len() != TAG_LEN {
        return Err(CryptoError::DecryptionError(format!(
            "authTag must be {TAG_LEN} bytes"
        )));
    }

    let mut sealed = ciphertext;
    sealed.extend_from_slice(&tag);

    key.open(&sealed, &EncryptionNonce::from_bytes(iv))
        .ok_or_else(|| CryptoError::DecryptionError("authentication tag mismatch".into()))
}

/// Decrypt one field and interpret it as UTF-8.
pub fn decrypt_to_string(bundle: &EncryptedField, key: &EncryptionKey) -> Result<String> {
    let bytes = decrypt_field(bundle, key)?;
    String::from_utf8(bytes).map_err(|_| CryptoError::DecryptionError("invalid UTF-8".into()))
}

/// Hex SHA-256 of plaintext. Used only to discriminate conflicts.
pub fn hash_content(plaintext: &[u8]) -> String {
    hex::encode(Sha256::digest(plaintext))
}

/// Size and content hash of a plaintext body.
pub fn content_metadata(plaintext: &[u8]) -> RecordMetadata {
    RecordMetadata {
        size: plaintext.len() as u64,
        content_hash: hash_content(plaintext),
    }
}

fn decode_part(value: &str, part: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| CryptoError::DecryptionError(format!("{part}: {e}")))
}
