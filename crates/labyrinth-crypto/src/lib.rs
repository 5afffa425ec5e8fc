//! Labyrinth Cryptographic Primitives
//!
//! Cryptographic building blocks for the Labyrinth epoch protocol. Pure
//! functions with deterministic outputs. Callers provide random bytes (nonces,
//! key seeds, ephemeral seeds) for deterministic testing.
//!
//! # Key Hierarchy
//!
//! Every epoch owns a 32-byte root key. Everything else is derived from it or
//! distributed under it:
//!
//! ```text
//! Epoch N root key
//!        │
//!        ├─ HKDF "epoch_devices_N"        → membership MAC key
//!        ├─ HKDF "message_key_in_epoch_…" → per-thread message keys
//!        └─ HKDF "epoch_chaining_N_<id>"  → (chaining key, distribution PSK)
//!                                                │
//!              fresh entropy ── HKDF(salt = chaining key) → Epoch N+1 root key
//!                    │
//!                    └─ authenticated PKE (psk = distribution PSK) → each member
//! ```
//!
//! # Keys
//!
//! A single Ed25519 keypair serves as both a signing key and, through the
//! birational map to Curve25519, an X25519 agreement key. Signatures are
//! domain separated by a one-byte use case prefix.
//!
//! # Security
//!
//! - AES-256-GCM authenticates every ciphertext; a failed tag yields
//!   [`CryptoError::DecryptionFailed`] and no plaintext.
//! - Authenticated PKE mixes a static-static and an ephemeral-static DH with a
//!   pre-shared key, so only a holder of the previous epoch can produce or
//!   read entropy for the next one.
//! - Private key material is zeroized on drop.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
mod error;
pub mod kdf;
pub mod keys;
pub mod mac;
pub mod pke;
pub mod util;

pub use error::CryptoError;
pub use kdf::{KEY_LENGTH, kdf_one_key, kdf_two_keys};
pub use keys::{PrivateKey, PublicKey, SIGNATURE_LENGTH};
