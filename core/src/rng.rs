//! Deterministic random number generation for generated content.
//!
//! RULE: generated sessions never touch a platform RNG. Every draw comes
//! from a `SeededRng` stream derived from one master seed, so the same
//! seed always yields the same world and the same save bytes.
//!
//! Each generator gets its own stream, seeded from
//! (master_seed XOR stream_index * golden-ratio constant), so adding a
//! stream never shifts the draws of existing ones.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;

pub struct SeededRng {
    pub name: &'static str,
    inner:    Pcg64Mcg,
}

impl SeededRng {
    pub fn new(master_seed: u64, stream: RngStream) -> Self {
        let derived = master_seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self {
            name:  stream.name(),
            inner: Pcg64Mcg::seed_from_u64(derived),
        }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.inner.next_u64()
    }

    /// Uniform in [low, high]. `low` must not exceed `high`.
    pub fn range_i64(&mut self, low: i64, high: i64) -> i64 {
        self.inner.gen_range(low..=high)
    }

    pub fn range_u32(&mut self, low: u32, high: u32) -> u32 {
        self.inner.gen_range(low..=high)
    }

    /// Bernoulli trial: true with probability p.
    pub fn chance(&mut self, p: f64) -> bool {
        self.inner.gen_bool(p.clamp(0.0, 1.0))
    }

    /// One element of a non-empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        let index = self.inner.gen_range(0..items.len());
        &items[index]
    }
}

/// Stable stream assignments.
/// NEVER reorder or remove entries; only append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum RngStream {
    Names = 0,
    World = 1,
    Items = 2,
}

impl RngStream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Names => "names",
            Self::World => "world",
            Self::Items => "items",
        }
    }
}
