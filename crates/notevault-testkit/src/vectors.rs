//! Golden test vectors for cross-implementation verification.
//!
//! Every implementation of notevault must produce or accept identical:
//! - encryption key and identity id for a recovery phrase
//! - plaintext for a fixed `{ciphertext, iv, authTag}` bundle
//! - hex SHA-256 content hash and size for a plaintext
//! - `{key, identityId}` for a fixed PIN-wrapped session string

use serde::Serialize;

use notevault_core::{EncryptedField, IdentityId};
use notevault_crypto::{
    content_metadata, decrypt_field, derive_identity, unwrap_session, EncryptionKey,
};

/// Recovery phrase to identity.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhraseVector {
    pub phrase: &'static str,
    /// 32 bytes hex
    pub encryption_key: &'static str,
    /// 16 bytes hex
    pub identity_id: &'static str,
}

/// A sealed field and its plaintext.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldVector {
    pub name: &'static str,
    /// 32 bytes hex
    pub key: &'static str,
    pub plaintext: &'static str,
    /// base64
    pub ciphertext: &'static str,
    /// base64, 12 bytes
    pub iv: &'static str,
    /// base64, 16 bytes
    pub auth_tag: &'static str,
}

/// Plaintext to content metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HashVector {
    pub plaintext: &'static str,
    pub content_hash: &'static str,
    pub size: u64,
}

/// A PIN-wrapped session and what it unwraps to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionVector {
    pub pin: &'static str,
    pub wrapped: &'static str,
    pub key: &'static str,
    pub identity_id: &'static str,
}

/// The full vector set.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVectors {
    pub phrases: Vec<PhraseVector>,
    pub fields: Vec<FieldVector>,
    pub hashes: Vec<HashVector>,
    pub sessions: Vec<SessionVector>,
}

impl GoldenVectors {
    /// Pretty JSON for sharing with other implementations.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn phrase_vectors() -> Vec<PhraseVector> {
    vec![
        PhraseVector {
            phrase: "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about",
            encryption_key: "66ac148a1893722f52f4fac1192286e525f6579ac5f5f439cdcc88ed5fb19d94",
            identity_id: "9d304f4b7b1c76384867f1ece73dfc06",
        },
        PhraseVector {
            phrase: "legal winner thank year wave sausage worth useful legal winner thank yellow",
            encryption_key: "3d2d29d5f6cffb26fd56ad7af8b0e87780b0bcedc6852bf707953bc145007ddb",
            identity_id: "30728523d1ae899a3b411d044c2768aa",
        },
        PhraseVector {
            phrase: "zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo zoo wrong",
            encryption_key: "72966303f73ac57e5107e154b743744c44a541c0b65ed3da58f778fa6a0fdff8",
            identity_id: "65acb3c90dd5f198133c9c76b742c79b",
        },
    ]
}

pub fn field_vectors() -> Vec<FieldVector> {
    const KEY: &str = "4242424242424242424242424242424242424242424242424242424242424242";
    vec![
        FieldVector {
            name: "empty",
            key: KEY,
            plaintext: "",
            ciphertext: "",
            iv: "JCQkJCQkJCQkJCQk",
            auth_tag: "P1HqzlvR3y9GVr+BLHeh3w==",
        },
        FieldVector {
            name: "ascii",
            key: KEY,
            plaintext: "Meeting notes, Q3 planning",
            ciphertext: "qWLgeoKwP4jrBPzulzs9yczpOd3HTTpeuF0=",
            iv: "JCQkJCQkJCQkJCQk",
            auth_tag: "AU4bh8+ZljOLycDdSH4OxQ==",
        },
        FieldVector {
            name: "multibyte",
            key: KEY,
            plaintext: "ünïcödé ✓",
            ciphertext: "J7vrzUS9mx7hqCGrBouO",
            iv: "JCQkJCQkJCQkJCQk",
            auth_tag: "jCun+5P+WxKikohZgXt4Yw==",
        },
    ]
}

pub fn hash_vectors() -> Vec<HashVector> {
    vec![
        HashVector {
            plaintext: "",
            content_hash: "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            size: 0,
        },
        HashVector {
            plaintext: "hello",
            content_hash: "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824",
            size: 5,
        },
        HashVector {
            plaintext: "groceries: eggs, milk\n",
            content_hash: "34fe83b8e1b65d0fbc51f64bb2f53bdd699d369991839a402326551c8a6ba327",
            size: 22,
        },
    ]
}

pub fn session_vectors() -> Vec<SessionVector> {
    vec![SessionVector {
        pin: "1234",
        wrapped: "000102030405060708090a0b0c0d0e0f:070707070707070707070707:b50482c9fff29ed6426a98b8d1f156ebe8db1c3b478b1677f25e92366c5ffddd21a96800f5c5b1cecec1525e560b1f283740e95fe681d4d13448dc4706e7a37268ac6112a3e93bff701688f0e9a92ac2f546bd526c4fef71301ed7af819dc054014d6204419f3712c9c29ec5a2dab7bf746ccac82f881a4159b5975dd3c578041a370aea772f0b58115d",
        key: "1111111111111111111111111111111111111111111111111111111111111111",
        identity_id: "abababababababababababababababab",
    }]
}

pub fn all_vectors() -> GoldenVectors {
    GoldenVectors {
        phrases: phrase_vectors(),
        fields: field_vectors(),
        hashes: hash_vectors(),
        sessions: session_vectors(),
    }
}

/// The key a field vector was sealed under.
pub fn field_key(vector: &FieldVector) -> Result<EncryptionKey, String> {
    let bytes: [u8; 32] = hex::decode(vector.key)
        .map_err(|e| format!("{}: bad key hex: {e}", vector.name))?
        .try_into()
        .map_err(|_| format!("{}: key must be 32 bytes", vector.name))?;
    Ok(EncryptionKey::from_bytes(bytes))
}

/// The sealed bundle of a field vector.
pub fn field_bundle(vector: &FieldVector) -> EncryptedField {
    EncryptedField {
        ciphertext: vector.ciphertext.into(),
        iv: vector.iv.into(),
        auth_tag: vector.auth_tag.into(),
    }
}

/// Check every vector against this implementation. Returns the first
/// mismatch.
pub fn verify_all_vectors() -> Result<(), String> {
    for vector in phrase_vectors() {
        let identity = derive_identity(vector.phrase).map_err(|e| e.to_string())?;
        if hex::encode(identity.key().as_bytes()) != vector.encryption_key {
            return Err(format!("encryption key mismatch for {:?}", vector.phrase));
        }
        if identity.id().to_hex() != vector.identity_id {
            return Err(format!("identity id mismatch for {:?}", vector.phrase));
        }
    }

    for vector in field_vectors() {
        let plaintext = decrypt_field(&field_bundle(&vector), &field_key(&vector)?)
            .map_err(|e| format!("{}: {e}", vector.name))?;
        if plaintext != vector.plaintext.as_bytes() {
            return Err(format!("{}: plaintext mismatch", vector.name));
        }
    }

    for vector in hash_vectors() {
        let metadata = content_metadata(vector.plaintext.as_bytes());
        if metadata.content_hash != vector.content_hash || metadata.size != vector.size {
            return Err(format!("hash mismatch for {:?}", vector.plaintext));
        }
    }

    for vector in session_vectors() {
        let identity = unwrap_session(vector.wrapped, vector.pin).map_err(|e| e.to_string())?;
        let expected_id = IdentityId::from_hex(vector.identity_id).map_err(|e| e.to_string())?;
        if hex::encode(identity.key().as_bytes()) != vector.key || identity.id() != expected_id {
            return Err("session payload mismatch".into());
        }
    }

    Ok(())
}
