//! Labyrinth epoch protocol.
//!
//! Maintains a forward-secure chain of shared root keys ("epochs") across
//! every device of one account, plus a recovery path that rebuilds a durable
//! virtual device from a 40-character recovery code.
//!
//! # Architecture
//!
//! ```text
//!                      ┌─────────────┐
//!                      │  Labyrinth  │  initialize / recover / resume
//!                      └──────┬──────┘  encrypt / decrypt
//!                             │
//!          ┌──────────────────┼───────────────────┐
//!          ▼                  ▼                   ▼
//!   ┌─────────────┐   ┌──────────────┐   ┌────────────────┐
//!   │   phases    │   │  EpochChain  │   │ VirtualDevice  │
//!   │ open / join │──►│  (gap-free)  │◄──│ recovery code  │
//!   │ auth / rot. │   └──────────────┘   │ escrow         │
//!   └──────┬──────┘                      └───────┬────────┘
//!          │                                     │
//!          ▼                                     ▼
//!   ┌───────────────────────┐            ┌──────────────┐
//!   │ LabyrinthServerClient │            │  key bundles │
//!   └───────────────────────┘            └──────────────┘
//! ```
//!
//! Protocol logic never touches the network, the clock or the RNG directly:
//! the server is a [`LabyrinthServerClient`], randomness comes from an
//! [`Environment`], and byte fields cross every boundary through a
//! [`BytesCodec`].

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod codec;
pub mod device;
pub mod env;
pub mod epoch;
pub mod error;
pub mod key_bundle;
mod labyrinth;
pub mod phases;
pub mod server;
pub mod virtual_device;

pub use codec::{Base64Codec, BytesCodec};
pub use device::{Device, DeviceSerialized};
pub use env::{Environment, SystemEnv};
pub use epoch::{Epoch, EpochChain, EpochChainSerialized, SequenceId};
pub use error::{CodecError, EpochChainError, LabyrinthError, RecoveryError, TransportError};
pub use labyrinth::{Labyrinth, LabyrinthSerialized};
pub use server::LabyrinthServerClient;
pub use virtual_device::{RecoveryCode, VirtualDevice};
