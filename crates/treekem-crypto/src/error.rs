//! Crypto port errors

use crate::types::CiphertextKind;

/// Failure reported by a [`CryptoPort`](crate::CryptoPort)
///
/// The engine never retries or swallows these; they surface unmodified to the
/// caller of the operation that triggered them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    /// Ciphertext was sealed for a different key
    #[error("Ciphertext sealed for key {expected}, opened with {actual}")]
    KeyMismatch {
        /// Fingerprint of the key the ciphertext was sealed for
        expected: String,
        /// Fingerprint of the key used to open it
        actual: String,
    },

    /// Public-key ciphertext handed to the symmetric opener or vice versa
    #[error("Expected a {expected:?} ciphertext, got {actual:?}")]
    WrongKind {
        /// Kind the opener handles
        expected: CiphertextKind,
        /// Kind carried by the ciphertext
        actual: CiphertextKind,
    },

    /// PRG asked for zero outputs
    #[error("PRG must produce at least the next seed, requested {0} outputs")]
    InvalidPrgLength(usize),
}

/// Result alias for port operations
pub type Result<T> = std::result::Result<T, CryptoError>;
