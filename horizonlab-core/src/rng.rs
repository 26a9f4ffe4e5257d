//! Deterministic RNG hierarchy.
//!
//! A master seed generates sub-seeds for each `(stream, index)` pair, e.g.
//! `("mc/b=7", 1532)` for one bootstrap path or `("refine", 3)` for one
//! hill-climb. Sub-seeds are BLAKE3-derived, so results do not depend on the
//! order in which rayon workers pick up units of work.

use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngHierarchy {
    master_seed: u64,
}

impl RngHierarchy {
    pub fn new(master_seed: u64) -> Self {
        Self { master_seed }
    }

    pub fn master_seed(&self) -> u64 {
        self.master_seed
    }

    /// Derive the sub-seed for `(stream, index)`. Pure function of its inputs.
    pub fn sub_seed(&self, stream: &str, index: u64) -> u64 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.master_seed.to_le_bytes());
        hasher.update(&(stream.len() as u64).to_le_bytes());
        hasher.update(stream.as_bytes());
        hasher.update(&index.to_le_bytes());
        let hash = hasher.finalize();
        let mut head = [0u8; 8];
        head.copy_from_slice(&hash.as_bytes()[..8]);
        u64::from_le_bytes(head)
    }

    pub fn rng_for(&self, stream: &str, index: u64) -> StdRng {
        StdRng::seed_from_u64(self.sub_seed(stream, index))
    }

    /// A child hierarchy rooted at `(stream, index)`.
    pub fn child(&self, stream: &str, index: u64) -> RngHierarchy {
        RngHierarchy::new(self.sub_seed(stream, index))
    }
}
