//! # Notevault Crypto
//!
//! Key derivation and authenticated encryption for notevault.
//!
//! ## Overview
//!
//! - **Identity**: a BIP-39 recovery phrase is validated against its checksum,
//!   expanded to seed bytes, then stretched with PBKDF2-HMAC-SHA256
//!   (100,000 rounds) under two fixed, distinct salts: one yields the 256-bit
//!   encryption key, the other the 128-bit identity id. The same phrase always
//!   yields the same identity on every device.
//! - **Fields**: each record field is sealed independently with
//!   ChaCha20-Poly1305 under a fresh random 96-bit nonce. The tag is the only
//!   integrity check the system has against an untrusted relay.
//! - **Content hash**: SHA-256 of the plaintext, used only to tell a genuine
//!   conflict from a stale pull.
//! - **PIN sessions**: the key and identity id are wrapped under a PIN-derived
//!   key with a fresh salt, serialized as `salt:iv:ciphertext` hex segments.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use notevault_crypto::{decrypt_field, derive_identity, encrypt_field, generate_phrase};
//!
//! let phrase = generate_phrase().unwrap();
//! let identity = derive_identity(&phrase).unwrap();
//!
//! let sealed = encrypt_field(b"hello", identity.key()).unwrap();
//! let opened = decrypt_field(&sealed, identity.key()).unwrap();
//! assert_eq!(opened, b"hello");
//! ```

pub mod cipher;
pub mod error;
pub mod kdf;
pub mod session;

pub use cipher::{
    content_metadata, decrypt_field, decrypt_to_string, encrypt_field, hash_content,
    EncryptionKey, EncryptionNonce,
};
pub use error::{CryptoError, Result};
pub use kdf::{
    derive_identity, generate_phrase, stretch, Identity, ENCRYPTION_SALT, IDENTITY_SALT,
    PBKDF2_ITERATIONS,
};
pub use session::{unwrap_session, wrap_session};
