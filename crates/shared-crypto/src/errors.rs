//! Crypto error types.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),

    #[error("ciphertext too short: minimum {minimum} bytes, got {actual}")]
    CiphertextTooShort { minimum: usize, actual: usize },

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Wrong key, wrong slot, or tampered ciphertext.
    #[error("decryption failed: authentication tag verification failed")]
    DecryptionFailed,

    #[error("decrypted value is not valid UTF-8")]
    InvalidPlaintext,
}
