//! Striped async locks keyed by unordered point pair.
//!
//! A mutation that validates and then inserts an edge holds the stripe of
//! its pair from before validation until after commit, so `a → b` and
//! `b → a` can never both pass the backward-path check. Unrelated pairs
//! may share a stripe; that only costs throughput.
//!
//! The locks live in one process and cover one pair at a time. Concurrent
//! inserts on different pairs, such as `a → b`, `b → c` and `c → a`, each
//! validate against a graph without the others and can still close a
//! short cycle.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use pathway_core::PointId;
use tokio::sync::{Mutex, MutexGuard};

pub struct PairLocks {
    stripes: Vec<Mutex<()>>,
}

/// Held stripes, released on drop.
#[must_use]
pub struct PairGuard<'a> {
    _held: Vec<MutexGuard<'a, ()>>,
}

impl PairLocks {
    pub fn new(stripes: usize) -> Self {
        let stripes = stripes.max(1);
        Self {
            stripes: (0..stripes).map(|_| Mutex::new(())).collect(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe_of(&self, a: PointId, b: PointId) -> usize {
        let key = if a <= b { (a, b) } else { (b, a) };
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Lock every pair in `pairs`. Stripes are taken in ascending order
    /// and at most once each, so concurrent callers cannot deadlock.
    pub async fn lock_pairs(&self, pairs: &[(PointId, PointId)]) -> PairGuard<'_> {
        let mut indices: Vec<usize> = pairs.iter().map(|&(a, b)| self.stripe_of(a, b)).collect();
        indices.sort_unstable();
        indices.dedup();

        let mut held = Vec::with_capacity(indices.len());
        for index in indices {
            held.push(self.stripes[index].lock().await);
        }
        PairGuard { _held: held }
    }
}
