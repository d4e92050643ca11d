//! Epoch tree
//!
//! An epoch tags one version of the group tree. Every structural operation
//! steps to a fresh child epoch, so epochs form their own ancestor tree:
//! speculative proposals may fork before a commit collapses them, which means
//! only ancestor/descendant relations are meaningful. Two epochs on different
//! forks are *incomparable*; [`EpochTree::order`] reports that as `None`
//! rather than inventing an order.
//!
//! Ancestor queries use binary lifting: an epoch at depth `d` stores jump
//! pointers to its ancestors `2^0, 2^1, ..., 2^floor(log2 d)` levels up,
//! giving O(log Δdepth) `ancestor`, `lt`, `ge` and `lca`.

mod map;

pub use map::EpochMap;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Handle to an epoch in an [`EpochTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct EpochId(u32);

impl EpochId {
    /// Arena index of the epoch
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Epoch#{}", self.0)
    }
}

#[derive(Debug, Clone)]
struct EpochRecord {
    depth: u32,
    /// `jumps[k]` is the ancestor `2^k` levels up
    jumps: Vec<EpochId>,
}

/// Arena of epochs with jump pointers
#[derive(Debug, Clone)]
pub struct EpochTree {
    records: Vec<EpochRecord>,
}

impl Default for EpochTree {
    fn default() -> Self {
        Self::new()
    }
}

fn floor_log2(value: u32) -> usize {
    debug_assert!(value > 0);
    (u32::BITS - 1 - value.leading_zeros()) as usize
}

impl EpochTree {
    /// Create a tree holding only the genesis epoch
    pub fn new() -> Self {
        Self {
            records: vec![EpochRecord {
                depth: 0,
                jumps: Vec::new(),
            }],
        }
    }

    /// The depth-0 epoch every other epoch descends from
    pub fn genesis(&self) -> EpochId {
        EpochId(0)
    }

    /// Number of epochs ever created
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false: the genesis epoch exists from construction
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn record(&self, epoch: EpochId) -> &EpochRecord {
        &self.records[epoch.index()]
    }

    /// Create a child of `parent`, one level deeper
    pub fn step(&mut self, parent: EpochId) -> EpochId {
        let depth = self.record(parent).depth + 1;
        let jump_count = floor_log2(depth) + 1;
        let mut jumps = Vec::with_capacity(jump_count);
        jumps.push(parent);
        for k in 1..jump_count {
            let half = jumps[k - 1];
            jumps.push(self.record(half).jumps[k - 1]);
        }
        let id = EpochId(
            u32::try_from(self.records.len()).unwrap_or_else(|_| panic!("epoch arena exhausted")),
        );
        self.records.push(EpochRecord { depth, jumps });
        id
    }

    /// Distance from genesis
    pub fn depth(&self, epoch: EpochId) -> u32 {
        self.record(epoch).depth
    }

    /// Direct parent, `None` for genesis
    pub fn parent(&self, epoch: EpochId) -> Option<EpochId> {
        self.record(epoch).jumps.first().copied()
    }

    /// Ancestor of `epoch` at `depth`
    ///
    /// # Panics
    ///
    /// If `depth` is deeper than `epoch` itself.
    pub fn ancestor(&self, epoch: EpochId, depth: u32) -> EpochId {
        let mut current = epoch;
        let mut current_depth = self.depth(current);
        assert!(
            depth <= current_depth,
            "ancestor depth {depth} below epoch {epoch} at depth {current_depth}"
        );
        while current_depth > depth {
            let k = floor_log2(current_depth - depth);
            current = self.record(current).jumps[k];
            current_depth -= 1 << k;
        }
        current
    }

    /// `older` is a strict ancestor of `newer`
    pub fn lt(&self, older: EpochId, newer: EpochId) -> bool {
        let depth = self.depth(older);
        depth < self.depth(newer) && self.ancestor(newer, depth) == older
    }

    /// `newer` equals `older` or descends from it
    pub fn ge(&self, newer: EpochId, older: EpochId) -> bool {
        newer == older || self.lt(older, newer)
    }

    /// Ancestry order, `None` when the epochs sit on different forks
    pub fn order(&self, a: EpochId, b: EpochId) -> Option<Ordering> {
        if a == b {
            Some(Ordering::Equal)
        } else if self.lt(a, b) {
            Some(Ordering::Less)
        } else if self.lt(b, a) {
            Some(Ordering::Greater)
        } else {
            None
        }
    }

    /// Whether one of the epochs descends from the other
    pub fn comparable(&self, a: EpochId, b: EpochId) -> bool {
        self.order(a, b).is_some()
    }

    /// Lowest common ancestor
    pub fn lca(&self, a: EpochId, b: EpochId) -> EpochId {
        let depth = self.depth(a).min(self.depth(b));
        let mut a = self.ancestor(a, depth);
        let mut b = self.ancestor(b, depth);
        if a == b {
            return a;
        }
        let mut k = self.record(a).jumps.len();
        while k > 0 {
            k -= 1;
            let (ja, jb) = (self.record(a).jumps[k], self.record(b).jumps[k]);
            if ja != jb {
                a = ja;
                b = jb;
                k = k.min(self.record(a).jumps.len());
            }
        }
        // a and b are now distinct children of the common ancestor
        self.record(a).jumps[0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_pointers_reach_genesis() {
        let mut epochs = EpochTree::new();
        let mut current = epochs.genesis();
        for _ in 0..100 {
            current = epochs.step(current);
        }
        assert_eq!(epochs.depth(current), 100);
        assert_eq!(epochs.ancestor(current, 0), epochs.genesis());
        assert_eq!(epochs.depth(epochs.ancestor(current, 37)), 37);
    }

    #[test]
    fn test_forks_are_incomparable() {
        let mut epochs = EpochTree::new();
        let root = epochs.step(epochs.genesis());
        let left = epochs.step(root);
        let right = epochs.step(root);
        assert_eq!(epochs.order(left, right), None);
        assert!(!epochs.lt(left, right));
        assert!(!epochs.ge(left, right));
        assert_eq!(epochs.order(root, left), Some(Ordering::Less));
        assert_eq!(epochs.lca(left, right), root);
    }

    #[test]
    fn test_lca_at_uneven_depths() {
        let mut epochs = EpochTree::new();
        let fork = epochs.step(epochs.genesis());
        let mut deep = fork;
        for _ in 0..13 {
            deep = epochs.step(deep);
        }
        let mut shallow = epochs.step(fork);
        shallow = epochs.step(shallow);
        assert_eq!(epochs.lca(deep, shallow), fork);
        assert_eq!(epochs.lca(deep, fork), fork);
    }
}
