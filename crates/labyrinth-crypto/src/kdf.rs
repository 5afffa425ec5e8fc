//! Key derivation using HKDF-SHA256 (extract-then-expand)

use hkdf::Hkdf;
use sha2::Sha256;

use crate::CryptoError;

/// Default derived key length (SHA-256 output size)
pub const KEY_LENGTH: usize = 32;

/// Derive a single key of `length` bytes.
///
/// A `salt` of `None` is equivalent to a zero-filled salt of hash length.
pub fn kdf_one_key(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    length: usize,
) -> Result<Vec<u8>, CryptoError> {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = vec![0u8; length];
    hkdf.expand(info, &mut okm).map_err(|_| CryptoError::InvalidOutputLength { requested: length })?;
    Ok(okm)
}

/// Derive a 32-byte key.
///
/// Convenience wrapper over [`kdf_one_key`] for the default length, which
/// can never exceed the HKDF output limit.
pub fn kdf_key(ikm: &[u8], salt: Option<&[u8]>, info: &[u8]) -> [u8; KEY_LENGTH] {
    let hkdf = Hkdf::<Sha256>::new(salt, ikm);

    let mut okm = [0u8; KEY_LENGTH];
    let Ok(()) = hkdf.expand(info, &mut okm) else {
        unreachable!("32 bytes is a valid HKDF-SHA256 output length");
    };
    okm
}

/// Derive two keys from ONE expand call of `first_length + second_length`
/// bytes, split at `first_length`.
///
/// The result is NOT the same as two independent [`kdf_one_key`] calls, and
/// callers must not substitute one for the other: the first key is a prefix
/// of the single-key output of combined length.
pub fn kdf_two_keys(
    ikm: &[u8],
    salt: Option<&[u8]>,
    info: &[u8],
    first_length: usize,
    second_length: usize,
) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
    let mut full = kdf_one_key(ikm, salt, info, first_length + second_length)?;
    let second = full.split_off(first_length);
    Ok((full, second))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let a = kdf_one_key(b"ikm", None, b"info", 32).unwrap();
        let b = kdf_one_key(b"ikm", None, b"info", 32).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn kdf_key_matches_kdf_one_key() {
        let fixed = kdf_key(b"ikm", Some(b"salt"), b"info");
        let dynamic = kdf_one_key(b"ikm", Some(b"salt"), b"info", KEY_LENGTH).unwrap();
        assert_eq!(fixed.as_slice(), dynamic.as_slice());
    }

    #[test]
    fn absent_salt_equals_zero_salt() {
        let none = kdf_key(b"ikm", None, b"info");
        let zeros = kdf_key(b"ikm", Some(&[0u8; 32]), b"info");
        assert_eq!(none, zeros);
    }

    #[test]
    fn different_info_produces_different_keys() {
        let a = kdf_key(b"ikm", None, b"epoch_devices_0");
        let b = kdf_key(b"ikm", None, b"epoch_devices_1");
        assert_ne!(a, b);
    }

    #[test]
    fn two_keys_is_split_of_single_expand() {
        let (first, second) = kdf_two_keys(b"ikm", None, b"info", 16, 32).unwrap();
        let full = kdf_one_key(b"ikm", None, b"info", 48).unwrap();

        assert_eq!(first.len(), 16);
        assert_eq!(second.len(), 32);
        assert_eq!(first.as_slice(), &full[..16]);
        assert_eq!(second.as_slice(), &full[16..]);
    }

    #[test]
    fn two_keys_differs_from_independent_calls() {
        let (_, second) = kdf_two_keys(b"ikm", None, b"info", 32, 32).unwrap();
        let independent = kdf_key(b"ikm", None, b"info");
        assert_ne!(second.as_slice(), independent.as_slice());
    }

    #[test]
    fn oversized_output_is_rejected() {
        let result = kdf_one_key(b"ikm", None, b"info", 255 * 32 + 1);
        assert_eq!(result, Err(CryptoError::InvalidOutputLength { requested: 255 * 32 + 1 }));
    }
}
