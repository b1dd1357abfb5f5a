//! PIN-wrapped session strings.
//!
//! Format: `hex(salt):hex(nonce):hex(ciphertext || tag)`. The wrapping key is
//! PBKDF2 over the PIN with a fresh 16-byte salt per wrap. The payload is the
//! JSON object `{"key": <hex>, "identityId": <hex>}`.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, Zeroizing};

use notevault_core::IdentityId;

use crate::cipher::{EncryptionKey, EncryptionNonce};
use crate::error::{CryptoError, Result};
use crate::kdf::{stretch, Identity};

const SALT_LEN: usize = 16;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    key: String,
    identity_id: IdentityId,
}

impl Drop for SessionPayload {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Wrap `key` and `identity_id` under `pin`.
pub fn wrap_session(key: &EncryptionKey, identity_id: IdentityId, pin: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    let wrapping_key = EncryptionKey::from_bytes(stretch(pin.as_bytes(), &salt));

    let payload = SessionPayload {
        key: hex::encode(key.as_bytes()),
        identity_id,
    };
    let json = Zeroizing::new(
        serde_json::to_vec(&payload).map_err(|e| CryptoError::SerializationError(e.to_string()))?,
    );

    let nonce = EncryptionNonce::generate();
    let sealed = wrapping_key.seal(&json, &nonce)?;

    Ok(format!(
        "{}:{}:{}",
        hex::encode(salt),
        hex::encode(nonce.as_bytes()),
        hex::encode(sealed)
    ))
}

/// Unwrap a session string with `pin`.
///
/// A tag failure is the only way a wrong PIN is detected and is reported as
/// [`CryptoError::WrongPin`]. Structural problems are
/// [`CryptoError::MalformedSession`]. Never returns partially decoded data.
pub fn unwrap_session(wrapped: &str, pin: &str) -> Result<Identity> {
    let mut parts = wrapped.trim().split(':');
    let (Some(salt), Some(nonce), Some(sealed), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(CryptoError::MalformedSession(
            "expected salt:iv:ciphertext".into(),
        ));
    };

    let salt = decode_segment(salt, "salt")?;
    let nonce: [u8; 12] = decode_segment(nonce, "iv")?
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedSession("iv must be 12 bytes".into()))?;
    let sealed = decode_segment(sealed, "ciphertext")?;

    let wrapping_key = EncryptionKey::from_bytes(stretch(pin.as_bytes(), &salt));
    let json = Zeroizing::new(
        wrapping_key
            .open(&sealed, &EncryptionNonce::from_bytes(nonce))
            .ok_or(CryptoError::WrongPin)?,
    );

    let payload: SessionPayload = serde_json::from_slice(&json)
        .map_err(|e| CryptoError::MalformedSession(e.to_string()))?;

    let key_bytes = Zeroizing::new(
        hex::decode(&payload.key).map_err(|e| CryptoError::MalformedSession(e.to_string()))?,
    );
    let key: [u8; 32] = key_bytes
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::MalformedSession("key must be 32 bytes".into()))?;

    Ok(Identity::from_parts(
        EncryptionKey::from_bytes(key),
        payload.identity_id,
    ))
}

fn decode_segment(segment: &str, name: &str) -> Result<Vec<u8>> {
    hex::decode(segment).map_err(|e| CryptoError::MalformedSession(format!("{name}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> (EncryptionKey, IdentityId) {
        (EncryptionKey::from_bytes([9; 32]), IdentityId::from_bytes([5; 16]))
    }

    #[test]
    fn test_wrap_unwrap_roundtrip() {
        let (key, id) = identity();
        let wrapped = wrap_session(&key, id, "1234").unwrap();
        let restored = unwrap_session(&wrapped, "1234").unwrap();
        assert_eq!(restored.id(), id);
        assert_eq!(restored.key().as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_wrong_pin_rejected() {
        let (key, id) = identity();
        let wrapped = wrap_session(&key, id, "1234").unwrap();
        assert!(matches!(
            unwrap_session(&wrapped, "0000"),
            Err(CryptoError::WrongPin)
        ));
    }

    #[test]
    fn test_format_is_three_hex_segments() {
        let (key, id) = identity();
        let wrapped = wrap_session(&key, id, "1234").unwrap();
        let parts: Vec<_> = wrapped.split(':').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].len(), SALT_LEN * 2);
        assert_eq!(parts[1].len(), 24);
        assert!(parts.iter().all(|p| hex::decode(p).is_ok()));
    }

    #[test]
    fn test_fresh_salt_per_wrap() {
        let (key, id) = identity();
        let a = wrap_session(&key, id, "1234").unwrap();
        let b = wrap_session(&key, id, "1234").unwrap();
        assert_ne!(a.split(':').next(), b.split(':').next());
    }

    #[test]
    fn test_tampered_session_is_wrong_pin_not_garbage() {
        let (key, id) = identity();
        let wrapped = wrap_session(&key, id, "1234").unwrap();
        let mut parts: Vec<String> = wrapped.split(':').map(String::from).collect();
        let mut sealed = hex::decode(&parts[2]).unwrap();
        sealed[0] ^= 0x01;
        parts[2] = hex::encode(sealed);
        assert!(matches!(
            unwrap_session(&parts.join(":"), "1234"),
            Err(CryptoError::WrongPin)
        ));
    }

    #[test]
    fn test_malformed_session() {
        assert!(matches!(
            unwrap_session("deadbeef", "1234"),
            Err(CryptoError::MalformedSession(_))
        ));
        assert!(matches!(
            unwrap_session("zz:00:00", "1234"),
            Err(CryptoError::MalformedSession(_))
        ));
    }
}
