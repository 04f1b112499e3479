//! Deduplicated worklist with seeded random pop.
//!
//! Random pop order decorrelates peephole order between runs, so rewrite
//! rules that only work in one visit order show up as seed-dependent test
//! failures. The fixpoint itself must not depend on the order.

use crate::ir::arena::BitSet;
use crate::ir::node::NodeId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Default pop seed.
pub const DEFAULT_SEED: u64 = 123;

/// Set + array of pending nodes; pushing twice is a no-op.
#[derive(Debug, Clone)]
pub struct WorkList {
    items: Vec<NodeId>,
    on: BitSet,
    rng: StdRng,
    seed: u64,
    /// Total distinct pushes, for statistics.
    pushed: usize,
}

impl WorkList {
    pub fn new() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }

    pub fn with_seed(seed: u64) -> Self {
        WorkList {
            items: Vec::new(),
            on: BitSet::new(),
            rng: StdRng::seed_from_u64(seed),
            seed,
            pushed: 0,
        }
    }

    /// Restart the pop sequence from `seed`, keeping pending entries.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
        self.seed = seed;
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Add `n` unless already present. Returns true if it was added.
    pub fn push(&mut self, n: NodeId) -> bool {
        if self.on.insert(n.as_usize()) {
            self.items.push(n);
            self.pushed += 1;
            true
        } else {
            false
        }
    }

    pub fn push_all(&mut self, nodes: impl IntoIterator<Item = NodeId>) {
        for n in nodes {
            self.push(n);
        }
    }

    #[inline]
    pub fn contains(&self, n: NodeId) -> bool {
        self.on.contains(n.as_usize())
    }

    /// Remove and return a random pending node.
    pub fn pop(&mut self) -> Option<NodeId> {
        if self.items.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.items.len());
        let n = self.items.swap_remove(idx);
        self.on.remove(n.as_usize());
        Some(n)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_pushed(&self) -> usize {
        self.pushed
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.on.clear();
    }
}

impl Default for WorkList {
    fn default() -> Self {
        Self::new()
    }
}
