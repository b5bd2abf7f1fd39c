//! Deterministic random number generation.
//!
//! RULE: Nothing in the simulation may call any platform RNG.
//! All randomness flows through the single SimRng seeded from the
//! simulation config. Its full generator state can be captured with
//! `state()` and put back with `set_state()`, so a resumed run draws
//! exactly the values an uninterrupted run would have drawn.
//!
//! Each simulation owns its own SimRng. Never share one across runs.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use serde::{Deserialize, Serialize};

use crate::{error::SimResult, types::EntityId};

/// Opaque, serialisable generator state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState(Pcg64Mcg);

impl RngState {
    pub fn to_json(&self) -> SimResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> SimResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

pub struct SimRng {
    inner: Pcg64Mcg,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self { inner: Pcg64Mcg::seed_from_u64(seed) }
    }

    /// Restart the stream from `seed`.
    pub fn seed(&mut self, seed: u64) {
        self.inner = Pcg64Mcg::seed_from_u64(seed);
    }

    pub fn state(&self) -> RngState {
        RngState(self.inner.clone())
    }

    pub fn set_state(&mut self, state: RngState) {
        self.inner = state.0;
    }

    /// Roll a float in [0.0, 1.0).
    pub fn next_f64(&mut self) -> f64 {
        let bits = self.inner.next_u64();
        (bits >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Uniform integer in [low, high). Returns `low` for an empty range.
    pub fn range(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.inner.gen_range(low..high)
    }

    /// Uniform integer in [low, high]. Returns `low` when `high < low`.
    pub fn range_inclusive(&mut self, low: i64, high: i64) -> i64 {
        if high < low {
            return low;
        }
        self.inner.gen_range(low..=high)
    }

    /// Bernoulli trial: returns true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_f64() < p
    }

    /// Pick one element uniformly. None for an empty slice.
    pub fn choose<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        if items.is_empty() {
            return None;
        }
        let i = self.range(0, items.len() as i64) as usize;
        items.get(i)
    }

    /// Replayable identifier. Same seed, same ids.
    pub fn id(&mut self) -> EntityId {
        let mut bytes = [0u8; 16];
        self.inner.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes)
            .into_uuid()
            .simple()
            .to_string()
    }
}

impl RngCore for SimRng {
    fn next_u32(&mut self) -> u32 {
        self.inner.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.inner.fill_bytes(dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.inner.try_fill_bytes(dest)
    }
}
