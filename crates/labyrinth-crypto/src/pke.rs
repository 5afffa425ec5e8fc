//! Sender-authenticated public key encryption
//!
//! HPKE-style construction used to hand the next epoch's entropy to one
//! recipient. Both the sender's static auth key and a fresh ephemeral key are
//! combined with the recipient's static key, then bound to a pre-shared key:
//!
//! ```text
//! fresh_secret = DH(sender_auth, recipient) ‖ DH(ephemeral, recipient)
//! inner_aad    = 0x01 ‖ sender_auth_x25519 ‖ recipient_x25519 ‖ ephemeral_x25519 ‖ aad
//! subkey       = HKDF(ikm = fresh_secret, salt = psk, info = inner_aad)
//! ciphertext   = 0x01 ‖ ephemeral_ed25519 ‖ 0^12 ‖ AES-GCM(subkey, 0^12, aad, pt)
//! ```
//!
//! # Security
//!
//! - The all-zero nonce is safe: the subkey is unique per call because the
//!   ephemeral key is fresh, so no (key, nonce) pair ever repeats.
//! - Decryption recomputes `inner_aad` from its own view of every key. Any
//!   mismatch surfaces as a single `DecryptionFailed`, never revealing which
//!   input was wrong.
//! - `inner_aad` binds the Montgomery form of the ephemeral key, which has
//!   no Edwards sign bit. Flipping that bit on the wire still opens to the
//!   same plaintext; it cannot change what is decrypted.

use crate::{
    CryptoError, aead,
    kdf::{KEY_LENGTH, kdf_key},
    keys::{PUBLIC_KEY_LENGTH, PrivateKey, PublicKey},
    util::concat,
};

/// Version byte prefixed to every ciphertext and mixed into the subkey
pub const VERSION: u8 = 0x01;

/// Bytes preceding the AEAD output: version byte and ephemeral public key
pub const HEADER_LENGTH: usize = 1 + PUBLIC_KEY_LENGTH;

/// Encrypt `plaintext` to `recipient`, authenticating as `sender_auth`.
///
/// `ephemeral_seed` MUST be fresh cryptographically secure random bytes for
/// every call in production.
///
/// # Errors
///
/// - `InvalidKeyLength`: `psk` is not 32 bytes
pub fn encrypt(
    recipient: &PublicKey,
    sender_auth: &PrivateKey,
    psk: &[u8],
    aad: &[u8],
    plaintext: &[u8],
    ephemeral_seed: &[u8; 32],
) -> Result<Vec<u8>, CryptoError> {
    check_psk(psk)?;

    let ephemeral = PrivateKey::from_seed(ephemeral_seed);
    let ephemeral_public = ephemeral.public_key();

    let id_id = sender_auth.agree(recipient);
    let id_ephem = ephemeral.agree(recipient);

    let subkey = derive_subkey(
        &id_id,
        &id_ephem,
        psk,
        &sender_auth.public_key(),
        recipient,
        &ephemeral_public,
        aad,
    );

    let sealed = aead::encrypt(&subkey, &[0u8; aead::NONCE_LENGTH], aad, plaintext)?;

    Ok(concat(&[&[VERSION], ephemeral_public.as_bytes(), &sealed]))
}

/// Decrypt a ciphertext produced by [`encrypt`].
///
/// # Errors
///
/// - `InvalidKeyLength`: `psk` is not 32 bytes
/// - `InvalidCiphertext`: too short, or unknown version byte
/// - `InvalidPublicKey`: embedded ephemeral key is not a curve point
/// - `DecryptionFailed`: any key, psk, or aad mismatch, or tampering
pub fn decrypt(
    recipient: &PrivateKey,
    sender_auth: &PublicKey,
    psk: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    check_psk(psk)?;

    if ciphertext.len() < HEADER_LENGTH {
        return Err(CryptoError::InvalidCiphertext { reason: "shorter than header" });
    }
    if ciphertext[0] != VERSION {
        return Err(CryptoError::InvalidCiphertext { reason: "unknown version byte" });
    }

    let ephemeral_public = PublicKey::from_bytes(&ciphertext[1..HEADER_LENGTH])?;
    let body = &ciphertext[HEADER_LENGTH..];

    let id_id = recipient.agree(sender_auth);
    let id_ephem = recipient.agree(&ephemeral_public);

    let subkey = derive_subkey(
        &id_id,
        &id_ephem,
        psk,
        sender_auth,
        &recipient.public_key(),
        &ephemeral_public,
        aad,
    );

    aead::decrypt(&subkey, aad, body)
}

fn derive_subkey(
    id_id: &[u8; 32],
    id_ephem: &[u8; 32],
    psk: &[u8],
    sender_auth: &PublicKey,
    recipient: &PublicKey,
    ephemeral: &PublicKey,
    aad: &[u8],
) -> [u8; KEY_LENGTH] {
    let fresh_secret = concat(&[id_id, id_ephem]);
    let inner_aad = concat(&[
        &[VERSION],
        &sender_auth.to_x25519_bytes(),
        &recipient.to_x25519_bytes(),
        &ephemeral.to_x25519_bytes(),
        aad,
    ]);

    kdf_key(&fresh_secret, Some(psk), &inner_aad)
}

fn check_psk(psk: &[u8]) -> Result<(), CryptoError> {
    if psk.len() == KEY_LENGTH {
        Ok(())
    } else {
        Err(CryptoError::InvalidKeyLength { expected: KEY_LENGTH, actual: psk.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        recipient: PrivateKey,
        sender: PrivateKey,
        psk: [u8; 32],
        aad: [u8; 8],
    }

    fn fixture() -> Fixture {
        Fixture {
            recipient: PrivateKey::from_seed(&[0xA1; 32]),
            sender: PrivateKey::from_seed(&[0xB2; 32]),
            psk: [0x5C; 32],
            aad: [0x0A; 8],
        }
    }

    fn seal(f: &Fixture, plaintext: &[u8]) -> Vec<u8> {
        encrypt(&f.recipient.public_key(), &f.sender, &f.psk, &f.aad, plaintext, &[0xE3; 32])
            .unwrap()
    }

    #[test]
    fn recipient_decrypts_sender_message() {
        let f = fixture();
        let ciphertext = seal(&f, b"Hello Alice!");

        let plaintext =
            decrypt(&f.recipient, &f.sender.public_key(), &f.psk, &f.aad, &ciphertext).unwrap();
        assert_eq!(plaintext, b"Hello Alice!");
    }

    #[test]
    fn ciphertext_layout() {
        let f = fixture();
        let ciphertext = seal(&f, b"0123456789abcdef0123456789abcdef");

        assert_eq!(ciphertext[0], VERSION);
        assert_eq!(&ciphertext[1..HEADER_LENGTH], PrivateKey::from_seed(&[0xE3; 32]).public_key().as_bytes());
        assert_eq!(&ciphertext[HEADER_LENGTH..HEADER_LENGTH + aead::NONCE_LENGTH], &[0u8; aead::NONCE_LENGTH]);
        assert_eq!(ciphertext.len(), HEADER_LENGTH + aead::NONCE_LENGTH + 32 + aead::TAG_LENGTH);
    }

    #[test]
    fn wrong_psk_fails() {
        let f = fixture();
        let ciphertext = seal(&f, b"Hello Alice!");

        let result = decrypt(&f.recipient, &f.sender.public_key(), &[0u8; 32], &f.aad, &ciphertext);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn altered_aad_fails() {
        let f = fixture();
        let ciphertext = seal(&f, b"Hello Alice!");

        let result =
            decrypt(&f.recipient, &f.sender.public_key(), &f.psk, b"epoch_2", &ciphertext);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn wrong_sender_fails() {
        let f = fixture();
        let ciphertext = seal(&f, b"Hello Alice!");
        let impostor = PrivateKey::from_seed(&[0xCC; 32]).public_key();

        let result = decrypt(&f.recipient, &impostor, &f.psk, &f.aad, &ciphertext);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn wrong_recipient_fails() {
        let f = fixture();
        let ciphertext = seal(&f, b"Hello Alice!");
        let eavesdropper = PrivateKey::from_seed(&[0xDD; 32]);

        let result = decrypt(&eavesdropper, &f.sender.public_key(), &f.psk, &f.aad, &ciphertext);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn tampered_body_fails() {
        let f = fixture();
        let mut ciphertext = seal(&f, b"Hello Alice!");
        let last = ciphertext.len() - 1;
        ciphertext[last] ^= 0x80;

        let result = decrypt(&f.recipient, &f.sender.public_key(), &f.psk, &f.aad, &ciphertext);
        assert_eq!(result, Err(CryptoError::DecryptionFailed));
    }

    #[test]
    fn short_psk_is_rejected() {
        let f = fixture();
        let result =
            encrypt(&f.recipient.public_key(), &f.sender, &[0u8; 16], &f.aad, b"x", &[1; 32]);
        assert_eq!(result, Err(CryptoError::InvalidKeyLength { expected: 32, actual: 16 }));
    }

    #[test]
    fn bad_version_is_rejected() {
        let f = fixture();
        let mut ciphertext = seal(&f, b"Hello Alice!");
        ciphertext[0] = 0x02;

        let result = decrypt(&f.recipient, &f.sender.public_key(), &f.psk, &f.aad, &ciphertext);
        assert!(matches!(result, Err(CryptoError::InvalidCiphertext { .. })));
    }

    #[test]
    fn truncated_header_is_rejected() {
        let f = fixture();
        let result = decrypt(&f.recipient, &f.sender.public_key(), &f.psk, &f.aad, &[VERSION; 10]);
        assert!(matches!(result, Err(CryptoError::InvalidCiphertext { .. })));
    }

    #[test]
    fn fresh_ephemeral_changes_ciphertext() {
        let f = fixture();
        let a = encrypt(&f.recipient.public_key(), &f.sender, &f.psk, &f.aad, b"m", &[1; 32]).unwrap();
        let b = encrypt(&f.recipient.public_key(), &f.sender, &f.psk, &f.aad, b"m", &[2; 32]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn flipped_ephemeral_sign_bit_opens_same_plaintext() {
        let f = fixture();
        let mut ciphertext = seal(&f, b"Hello Alice!");
        // Top bit of the last ephemeral byte is the Edwards x sign
        ciphertext[HEADER_LENGTH - 1] ^= 0x80;

        let plaintext =
            decrypt(&f.recipient, &f.sender.public_key(), &f.psk, &f.aad, &ciphertext).unwrap();
        assert_eq!(plaintext, b"Hello Alice!");
    }

    #[test]
    fn matches_reference_construction() {
        let f = fixture();
        let ephemeral_seed = [0xE3; 32];
        let ephemeral = PrivateKey::from_seed(&ephemeral_seed);
        let recipient = f.recipient.public_key();

        let fresh_secret = concat(&[&f.sender.agree(&recipient), &ephemeral.agree(&recipient)]);
        let inner_aad = concat(&[
            &[0x01],
            &f.sender.public_key().to_x25519_bytes(),
            &recipient.to_x25519_bytes(),
            &ephemeral.public_key().to_x25519_bytes(),
            &f.aad,
        ]);
        let subkey = kdf_key(&fresh_secret, Some(&f.psk), &inner_aad);
        let body = aead::encrypt(&subkey, &[0u8; 12], &f.aad, b"Hello Alice!").unwrap();
        let expected = concat(&[&[0x01], ephemeral.public_key().as_bytes(), &body]);

        let ciphertext =
            encrypt(&recipient, &f.sender, &f.psk, &f.aad, b"Hello Alice!", &ephemeral_seed).unwrap();
        assert_eq!(ciphertext, expected);
        assert_eq!(
            decrypt(&f.recipient, &f.sender.public_key(), &f.psk, &f.aad, &expected).unwrap(),
            b"Hello Alice!"
        );
    }
}
