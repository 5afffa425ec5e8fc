//! Dual-purpose Ed25519 / X25519 keys
//!
//! One Ed25519 keypair is used both for signatures and, via the birational
//! map from the Edwards curve to the Montgomery curve, for X25519 key
//! agreement. The private scalar used for agreement is the clamped SHA-512
//! prefix of the Ed25519 seed, matching RFC 8032 key expansion.
//!
//! # Domain Separation
//!
//! Every signature covers `use_case_byte ‖ data`. A signature produced for
//! one use case never verifies for another.

use std::fmt;

use curve25519_dalek::montgomery::MontgomeryPoint;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::CryptoError;

/// Ed25519 signature size in bytes
pub const SIGNATURE_LENGTH: usize = 64;

/// Encoded public key size in bytes (Ed25519 compressed point)
pub const PUBLIC_KEY_LENGTH: usize = 32;

/// Private key seed size in bytes
pub const PRIVATE_KEY_LENGTH: usize = 32;

/// Private half of a dual-purpose keypair.
///
/// Zeroized on drop.
#[derive(Clone)]
pub struct PrivateKey {
    signing_key: SigningKey,
}

impl PrivateKey {
    /// Create a private key from a 32-byte seed.
    ///
    /// Caller MUST provide cryptographically secure random bytes in
    /// production.
    pub fn from_seed(seed: &[u8; PRIVATE_KEY_LENGTH]) -> Self {
        Self { signing_key: SigningKey::from_bytes(seed) }
    }

    /// Restore a private key from persisted bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let seed: &[u8; PRIVATE_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength { expected: PRIVATE_KEY_LENGTH, actual: bytes.len() }
        })?;
        Ok(Self::from_seed(seed))
    }

    /// Seed bytes, for persistence only.
    pub fn to_bytes(&self) -> Zeroizing<[u8; PRIVATE_KEY_LENGTH]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    /// Public half of this keypair.
    pub fn public_key(&self) -> PublicKey {
        PublicKey { verifying_key: self.signing_key.verifying_key() }
    }

    /// Sign `use_case_byte ‖ data`.
    pub fn sign(&self, use_case_byte: u8, data: &[u8]) -> [u8; SIGNATURE_LENGTH] {
        let message = domain_separated(use_case_byte, data);
        self.signing_key.sign(&message).to_bytes()
    }

    /// X25519 Diffie-Hellman with another key's Montgomery form.
    pub fn agree(&self, other: &PublicKey) -> [u8; 32] {
        let mut scalar = self.signing_key.to_scalar_bytes();
        let shared = other.montgomery().mul_clamped(scalar);
        scalar.zeroize();
        shared.to_bytes()
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Public half of a dual-purpose keypair.
///
/// Equality compares the X25519 (Montgomery) form.
#[derive(Clone, Copy)]
pub struct PublicKey {
    verifying_key: VerifyingKey,
}

impl PublicKey {
    /// Parse an Ed25519 compressed point.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength`: not 32 bytes
    /// - `InvalidPublicKey`: bytes do not decompress to a curve point
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let encoded: &[u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
            CryptoError::InvalidKeyLength { expected: PUBLIC_KEY_LENGTH, actual: bytes.len() }
        })?;
        let verifying_key =
            VerifyingKey::from_bytes(encoded).map_err(|_| CryptoError::InvalidPublicKey)?;
        Ok(Self { verifying_key })
    }

    /// Ed25519 encoding of this key.
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LENGTH] {
        self.verifying_key.as_bytes()
    }

    /// X25519 encoding of this key (Montgomery u-coordinate).
    pub fn to_x25519_bytes(&self) -> [u8; 32] {
        self.montgomery().to_bytes()
    }

    /// Verify a signature over `use_case_byte ‖ data`.
    ///
    /// Malformed signatures verify as `false`.
    pub fn verify(&self, signature: &[u8], use_case_byte: u8, data: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        let message = domain_separated(use_case_byte, data);
        self.verifying_key.verify(&message, &signature).is_ok()
    }

    fn montgomery(&self) -> MontgomeryPoint {
        self.verifying_key.to_montgomery()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_x25519_bytes().ct_eq(&other.to_x25519_bytes()).into()
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.as_bytes();
        write!(f, "PublicKey({:02x}{:02x}{:02x}{:02x}..)", bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

fn domain_separated(use_case_byte: u8, data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(1 + data.len());
    message.push(use_case_byte);
    message.extend_from_slice(data);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keypair(fill: u8) -> (PrivateKey, PublicKey) {
        let private = PrivateKey::from_seed(&[fill; 32]);
        let public = private.public_key();
        (private, public)
    }

    #[test]
    fn sign_verify_roundtrip() {
        let (private, public) = keypair(1);

        let signature = private.sign(0xFF, b"Some data");
        assert!(public.verify(&signature, 0xFF, b"Some data"));
    }

    #[test]
    fn modified_signature_fails() {
        let (private, public) = keypair(1);

        let mut signature = private.sign(0xFF, b"Some data");
        signature[21] = !signature[21];

        assert!(!public.verify(&signature, 0xFF, b"Some data"));
    }

    #[test]
    fn use_case_byte_separates_domains() {
        let (private, public) = keypair(2);

        let signature = private.sign(0x30, b"storage key");
        assert!(!public.verify(&signature, 0x31, b"storage key"));
    }

    #[test]
    fn truncated_signature_fails() {
        let (private, public) = keypair(3);
        let signature = private.sign(0x01, b"data");

        assert!(!public.verify(&signature[..63], 0x01, b"data"));
    }

    #[test]
    fn agreement_is_symmetric() {
        let (alice_private, alice_public) = keypair(4);
        let (bob_private, bob_public) = keypair(5);

        assert_eq!(alice_private.agree(&bob_public), bob_private.agree(&alice_public));
    }

    #[test]
    fn private_key_bytes_roundtrip() {
        let (private, public) = keypair(6);
        let restored = PrivateKey::from_bytes(private.to_bytes().as_slice()).unwrap();

        assert_eq!(restored.public_key(), public);
    }

    #[test]
    fn public_key_bytes_roundtrip() {
        let (_, public) = keypair(7);
        let parsed = PublicKey::from_bytes(public.as_bytes()).unwrap();

        assert_eq!(parsed, public);
        assert_eq!(parsed.as_bytes(), public.as_bytes());
    }

    #[test]
    fn public_key_wrong_length_is_rejected() {
        assert_eq!(
            PublicKey::from_bytes(&[0u8; 31]),
            Err(CryptoError::InvalidKeyLength { expected: 32, actual: 31 })
        );
    }

    #[test]
    fn distinct_seeds_produce_distinct_keys() {
        let (_, a) = keypair(8);
        let (_, b) = keypair(9);
        assert_ne!(a, b);
    }

    #[test]
    fn debug_does_not_leak_private_material() {
        let (private, _) = keypair(10);
        assert_eq!(format!("{private:?}"), "PrivateKey(..)");
    }
}
