//! Deterministic simulation harness for Labyrinth protocol testing.
//!
//! [`MemoryServer`] implements the server collaborator in memory and
//! [`SimEnv`] makes every key, nonce and timestamp reproducible from a seed,
//! so whole multi-device scenarios run in a single test process.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod memory_server;
pub mod sim_env;

pub use memory_server::{MemoryServer, MemoryServerConfig};
pub use sim_env::{SimEnv, SimInstant};
