//! Error types for the crypto module.

use thiserror::Error;

/// Errors that can occur during key derivation and field encryption.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The recovery phrase failed word-list or checksum validation.
    #[error("invalid recovery phrase: {0}")]
    InvalidPhrase(String),

    /// Tag verification failed: tampered bundle, wrong key, or corruption.
    #[error("decryption failed: {0}")]
    DecryptionError(String),

    /// The PIN did not unwrap the session.
    #[error("wrong PIN")]
    WrongPin,

    /// The wrapped session string is not `salt:iv:ciphertext`.
    #[error("malformed session: {0}")]
    MalformedSession(String),

    /// Encryption error.
    #[error("encryption error: {0}")]
    EncryptionError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
