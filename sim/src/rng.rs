//! Deterministic simulation RNG.
//!
//! Wraps `ChaCha8Rng` so identical seeds produce identical runs. The stream
//! is shared between the frame driver and every behavior that needs
//! randomness (target picking, think delays, terrain morphing), so it lives
//! behind an `Arc<Mutex<_>>` and is handed out as a cheap `SharedRng` clone.

use bevy_ecs::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::sync::{Arc, Mutex, PoisonError};

/// Default seed used when no explicit seed is provided.
pub const DEFAULT_SEED: u64 = 42;

/// Handle to the shared simulation random stream.
#[derive(Clone, Debug)]
pub struct SharedRng(Arc<Mutex<ChaCha8Rng>>);

impl SharedRng {
    pub fn from_seed_u64(seed: u64) -> Self {
        Self(Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))))
    }

    /// Run `f` with exclusive access to the underlying generator.
    pub fn with<R>(&self, f: impl FnOnce(&mut ChaCha8Rng) -> R) -> R {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }

    /// Integer in `[lo, hi)`. Returns `lo` for an empty range.
    pub fn range_i(&self, lo: i32, hi: i32) -> i32 {
        if hi <= lo {
            return lo;
        }
        self.with(|rng| rng.gen_range(lo..hi))
    }

    /// Float in `[lo, hi)`. Returns `lo` for an empty range.
    pub fn range_f(&self, lo: f32, hi: f32) -> f32 {
        if hi <= lo {
            return lo;
        }
        self.with(|rng| rng.gen_range(lo..hi))
    }

    /// Either `-1.0` or `1.0`.
    pub fn sign(&self) -> f32 {
        if self.with(|rng| rng.gen::<bool>()) {
            1.0
        } else {
            -1.0
        }
    }
}

impl Default for SharedRng {
    fn default() -> Self {
        Self::from_seed_u64(DEFAULT_SEED)
    }
}

/// Deterministic RNG resource for all simulation randomness.
#[derive(Resource, Clone, Debug, Default)]
pub struct SimRng(pub SharedRng);

impl SimRng {
    pub fn from_seed_u64(seed: u64) -> Self {
        Self(SharedRng::from_seed_u64(seed))
    }

    pub fn handle(&self) -> SharedRng {
        self.0.clone()
    }
}
