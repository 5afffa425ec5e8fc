//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from cryptographic primitives
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// AEAD authentication failed.
    ///
    /// Deliberately carries no detail: a wrong key, wrong aad and a tampered
    /// ciphertext are indistinguishable to the caller.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Key material had the wrong length
    #[error("invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Expected key length
        expected: usize,
        /// Actual key length
        actual: usize,
    },

    /// Bytes do not encode a valid Ed25519 point
    #[error("invalid public key")]
    InvalidPublicKey,

    /// Ciphertext framing is malformed (before any authentication)
    #[error("invalid ciphertext: {reason}")]
    InvalidCiphertext {
        /// What was wrong with the framing
        reason: &'static str,
    },

    /// Requested KDF output length is not supported by HKDF-SHA256
    #[error("invalid kdf output length: {requested}")]
    InvalidOutputLength {
        /// Requested output length in bytes
        requested: usize,
    },
}

impl CryptoError {
    /// Returns true if this error signals a violated precondition.
    ///
    /// Precondition violations are internal bugs (wrong key sizes, malformed
    /// framing produced by our own code). They are never shown to users.
    pub fn is_precondition_violation(&self) -> bool {
        !matches!(self, Self::DecryptionFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decryption_failure_is_not_a_precondition_violation() {
        assert!(!CryptoError::DecryptionFailed.is_precondition_violation());
    }

    #[test]
    fn length_errors_are_precondition_violations() {
        assert!(CryptoError::InvalidKeyLength { expected: 32, actual: 31 }.is_precondition_violation());
        assert!(CryptoError::InvalidOutputLength { requested: 9000 }.is_precondition_violation());
    }

    #[test]
    fn error_display() {
        let err = CryptoError::InvalidKeyLength { expected: 32, actual: 16 };
        assert_eq!(err.to_string(), "invalid key length: expected 32, got 16");
    }
}
