//! Authenticated symmetric encryption using AES-256-GCM
//!
//! Ciphertexts are framed as `nonce (12 bytes) ‖ ciphertext ‖ tag (16 bytes)`
//! so that a decryptor only needs the key and the associated data.
//!
//! All functions are pure - the nonce must be provided by the caller.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, Payload},
};

use crate::{CryptoError, kdf::KEY_LENGTH};

/// Size of the AES-GCM nonce in bytes
pub const NONCE_LENGTH: usize = 12;

/// Size of the GCM authentication tag in bytes
pub const TAG_LENGTH: usize = 16;

/// Encrypt `plaintext` under `key` with an explicit `nonce`.
///
/// Returns `nonce ‖ ciphertext ‖ tag`.
///
/// # Security
///
/// The caller MUST never reuse a (key, nonce) pair. Use a fresh random nonce
/// unless the key itself is single-use (as in [`crate::pke`]).
pub fn encrypt(
    key: &[u8],
    nonce: &[u8; NONCE_LENGTH],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;

    let Ok(sealed) = cipher.encrypt(Nonce::from_slice(nonce), Payload { msg: plaintext, aad })
    else {
        unreachable!("AES-256-GCM encryption cannot fail with valid inputs");
    };

    let mut out = Vec::with_capacity(NONCE_LENGTH + sealed.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&sealed);
    Ok(out)
}

/// Decrypt a `nonce ‖ ciphertext ‖ tag` buffer produced by [`encrypt`].
///
/// # Errors
///
/// - `DecryptionFailed`: tag mismatch (wrong key, wrong aad, tampering) or a
///   buffer too short to hold a nonce and tag. No partial plaintext is ever
///   returned.
/// - `InvalidKeyLength`: `key` is not 32 bytes
pub fn decrypt(key: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = cipher(key)?;

    if ciphertext.len() < NONCE_LENGTH + TAG_LENGTH {
        return Err(CryptoError::DecryptionFailed);
    }
    let (nonce, sealed) = ciphertext.split_at(NONCE_LENGTH);

    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad })
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::InvalidKeyLength { expected: KEY_LENGTH, actual: key.len() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x42; 32];
    const NONCE: [u8; NONCE_LENGTH] = [0x07; NONCE_LENGTH];

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let sealed = encrypt(&KEY, &NONCE, b"aad", b"Hello, World!").unwrap();
        let opened = decrypt(&KEY, b"aad", &sealed).unwrap();

        assert_eq!(opened, b"Hello, World!");
    }

    #[test]
    fn output_is_prefixed_with_nonce() {
        let sealed = encrypt(&KEY, &NONCE, b"", b"payload").unwrap();

        assert_eq!(&sealed[..NONCE_LENGTH], &NONCE);
        assert_eq!(sealed.len(), NONCE_LENGTH + b"payload".len() + TAG_LENGTH);
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let sealed = encrypt(&KEY, &NONCE, b"aad", b"").unwrap();
        assert_eq!(decrypt(&KEY, b"aad", &sealed).unwrap(), b"");
    }

    #[test]
    fn wrong_aad_fails() {
        let sealed = encrypt(&KEY, &NONCE, b"aad-a", b"secret").unwrap();
        assert_eq!(decrypt(&KEY, b"aad-b", &sealed), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn truncated_ciphertext_fails_without_panicking() {
        assert_eq!(decrypt(&KEY, b"", &[0u8; 27]), Err(CryptoError::DecryptionFailed));
        assert_eq!(decrypt(&KEY, b"", &[]), Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn short_key_is_rejected() {
        let result = encrypt(&KEY[..16], &NONCE, b"", b"x");
        assert_eq!(result, Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 }));
    }
}
