#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

//! Deterministic environment for simulation.
//!
//! Randomness comes from a seeded ChaCha20 stream and time only moves when a
//! test calls [`SimEnv::advance`]. Clones share both, so a server and the
//! clients it talks to observe one clock and one reproducible RNG stream.

use std::{
    fmt,
    ops::Sub,
    sync::{Arc, Mutex},
    time::Duration,
};

use labyrinth_core::Environment;
use rand::RngCore;
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng};

/// Point on the virtual clock, measured from simulation start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time elapsed since simulation start.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

/// Seeded, manually clocked [`Environment`].
#[derive(Clone)]
pub struct SimEnv {
    inner: Arc<Mutex<SimEnvInner>>,
}

struct SimEnvInner {
    rng: ChaCha20Rng,
    now: Duration,
}

impl SimEnv {
    /// Environment with a fixed default seed.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment whose random stream is fully determined by `seed`.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimEnvInner {
                rng: ChaCha20Rng::seed_from_u64(seed),
                now: Duration::ZERO,
            })),
        }
    }

    /// Move the shared clock forward.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned. This is acceptable for
    /// simulation code.
    #[allow(clippy::expect_used)]
    pub fn advance(&self, by: Duration) {
        let mut inner = self.inner.lock().expect("Mutex poisoned");
        inner.now = inner.now.saturating_add(by);
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimEnv").field("now", &self.now()).finish_non_exhaustive()
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    #[allow(clippy::expect_used)]
    fn now(&self) -> SimInstant {
        SimInstant(self.inner.lock().expect("Mutex poisoned").now)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        self.inner.lock().expect("Mutex poisoned").rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_stream() {
        let a = SimEnv::with_seed(7);
        let b = SimEnv::with_seed(7);

        assert_eq!(a.random_array::<32>(), b.random_array::<32>());
    }

    #[test]
    fn different_seed_different_stream() {
        assert_ne!(SimEnv::with_seed(1).random_array::<32>(), SimEnv::with_seed(2).random_array::<32>());
    }

    #[test]
    fn clones_share_clock_and_stream() {
        let env = SimEnv::with_seed(3);
        let clone = env.clone();
        let reference = SimEnv::with_seed(3);

        env.advance(Duration::from_secs(5));
        assert_eq!(clone.now().since_start(), Duration::from_secs(5));

        let _ = env.random_array::<16>();
        let mut skipped = [0u8; 16];
        reference.random_bytes(&mut skipped);
        assert_eq!(clone.random_array::<16>(), reference.random_array::<16>());
    }

    #[test]
    fn clock_only_moves_on_advance() {
        let env = SimEnv::new();
        let start = env.now();
        let _ = env.random_array::<8>();
        assert_eq!(env.now() - start, Duration::ZERO);

        env.advance(Duration::from_millis(250));
        assert_eq!(env.now() - start, Duration::from_millis(250));
    }
}
