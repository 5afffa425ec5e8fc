//! Fuzz target for authenticated PKE decryption
//!
//! Entropy for every new epoch arrives as a PKE ciphertext chosen by the
//! server, so decryption is the main attacker-reachable parser.
//!
//! # Strategy
//!
//! - Raw: arbitrary bytes decrypted under arbitrary keys and psk
//! - Tampered: a valid ciphertext with one byte flipped
//! - Wrong context: a valid ciphertext opened with a different psk or aad
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - A modified ciphertext never opens to a different plaintext. Only the
//!   ephemeral key's Edwards sign bit may flip and still open, since the
//!   subkey binds its Montgomery form
//! - A modified context never decrypts
//! - An untouched ciphertext always decrypts to the original plaintext

#![no_main]

use arbitrary::Arbitrary;
use labyrinth_crypto::{PrivateKey, pke};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
enum PkeInput {
    Raw { recipient_seed: [u8; 32], sender_seed: [u8; 32], psk: Vec<u8>, aad: Vec<u8>, ciphertext: Vec<u8> },
    Tampered { seeds: Seeds, plaintext: Vec<u8>, position: usize, mask: u8 },
    WrongContext { seeds: Seeds, plaintext: Vec<u8>, other_psk: [u8; 32], other_aad: Vec<u8> },
}

#[derive(Debug, Arbitrary)]
struct Seeds {
    recipient: [u8; 32],
    sender: [u8; 32],
    ephemeral: [u8; 32],
    psk: [u8; 32],
    aad: Vec<u8>,
}

fn seal(seeds: &Seeds, plaintext: &[u8]) -> (PrivateKey, PrivateKey, Vec<u8>) {
    let recipient = PrivateKey::from_seed(&seeds.recipient);
    let sender = PrivateKey::from_seed(&seeds.sender);
    let ciphertext = pke::encrypt(
        &recipient.public_key(),
        &sender,
        &seeds.psk,
        &seeds.aad,
        plaintext,
        &seeds.ephemeral,
    )
    .expect("32-byte psk always encrypts");
    (recipient, sender, ciphertext)
}

fuzz_target!(|input: PkeInput| {
    match input {
        PkeInput::Raw { recipient_seed, sender_seed, psk, aad, ciphertext } => {
            let recipient = PrivateKey::from_seed(&recipient_seed);
            let sender = PrivateKey::from_seed(&sender_seed).public_key();
            let _ = pke::decrypt(&recipient, &sender, &psk, &aad, &ciphertext);
        },

        PkeInput::Tampered { seeds, plaintext, position, mask } => {
            let (recipient, sender, mut ciphertext) = seal(&seeds, &plaintext);
            let sender = sender.public_key();

            let opened = pke::decrypt(&recipient, &sender, &seeds.psk, &seeds.aad, &ciphertext)
                .expect("untouched ciphertext decrypts");
            assert_eq!(opened, plaintext);

            if mask == 0 {
                return;
            }
            let index = position % ciphertext.len();
            ciphertext[index] ^= mask;
            let sign_bit_only = index == pke::HEADER_LENGTH - 1 && mask == 0x80;
            if let Ok(reopened) = pke::decrypt(&recipient, &sender, &seeds.psk, &seeds.aad, &ciphertext) {
                assert!(sign_bit_only, "flipped byte {index} still decrypted");
                assert_eq!(reopened, plaintext);
            }
        },

        PkeInput::WrongContext { seeds, plaintext, other_psk, other_aad } => {
            let (recipient, sender, ciphertext) = seal(&seeds, &plaintext);
            let sender = sender.public_key();

            if other_psk != seeds.psk {
                assert!(pke::decrypt(&recipient, &sender, &other_psk, &seeds.aad, &ciphertext).is_err());
            }
            if other_aad != seeds.aad {
                assert!(pke::decrypt(&recipient, &sender, &seeds.psk, &other_aad, &ciphertext).is_err());
            }
        },
    }
});
