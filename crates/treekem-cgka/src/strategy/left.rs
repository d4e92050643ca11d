//! Left-balanced binary trees
//!
//! Every internal node has exactly two children, the left subtree is
//! perfect, and the right subtree is never taller than the left. Appending a
//! leaf therefore walks down the right spine to the first perfect subtree
//! and pairs it with the newcomer.
//!
//! Removed members leave tombstones. Joiners may reuse a tombstone slot
//! ([`Placement`]), and trailing tombstones may be cut off ([`Removal`]).

use super::{Mutation, TreeStrategy};
use crate::epoch::EpochId;
use crate::error::CgkaError;
use crate::tree::{NodeId, PersistentTree};
use crate::Result;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where joiners land
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    /// Reuse the tombstone closest to the adder, else append
    #[default]
    Greedy,
    /// Reuse a uniformly chosen tombstone with probability
    /// `removed / (removed + 1)`, else append
    Random,
    /// Always append
    Append,
}

/// What removal does beyond leaving a tombstone
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Removal {
    /// Keep the tombstone in place
    #[default]
    Keep,
    /// Cut off trailing all-tombstone subtrees on the right spine
    Truncate,
}

/// Left-balanced binary tree strategy
#[derive(Debug, Clone)]
pub struct LeftTree {
    placement: Placement,
    removal: Removal,
    rng: StdRng,
}

impl LeftTree {
    /// Create a strategy; `seed` drives random placement
    pub fn new(placement: Placement, removal: Removal, seed: u64) -> Self {
        Self {
            placement,
            removal,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Configured placement policy
    pub fn placement(&self) -> Placement {
        self.placement
    }

    /// Configured removal policy
    pub fn removal(&self) -> Removal {
        self.removal
    }

    fn pair(
        tree: &mut PersistentTree,
        epoch: EpochId,
        left: NodeId,
        right: NodeId,
        trace: Option<NodeId>,
    ) -> NodeId {
        debug_assert!(tree.node(left).is_perfect(), "left subtree must be perfect");
        debug_assert!(
            tree.node(right).height() <= tree.node(left).height(),
            "right subtree taller than left"
        );
        tree.new_node(epoch, vec![left, right], trace)
    }

    fn build_perfect(tree: &mut PersistentTree, epoch: EpochId, height: u32) -> NodeId {
        if height == 0 {
            return tree.new_leaf(epoch);
        }
        let left = Self::build_perfect(tree, epoch, height - 1);
        let right = Self::build_perfect(tree, epoch, height - 1);
        Self::pair(tree, epoch, left, right, None)
    }

    fn build_left(tree: &mut PersistentTree, epoch: EpochId, size: usize) -> NodeId {
        if size == 1 {
            return tree.new_leaf(epoch);
        }
        // Largest power of two strictly below size
        let left_height = usize::BITS - 1 - (size - 1).leading_zeros();
        let left = Self::build_perfect(tree, epoch, left_height);
        let right = Self::build_left(tree, epoch, size - (1 << left_height));
        Self::pair(tree, epoch, left, right, None)
    }

    fn append(tree: &mut PersistentTree, epoch: EpochId, node: NodeId, leaf: NodeId) -> NodeId {
        if tree.node(node).is_perfect() {
            return Self::pair(tree, epoch, node, leaf, Some(leaf));
        }
        let (left, right) = match tree.node(node).children() {
            &[left, right] => (left, right),
            other => unreachable!("binary node with {} children", other.len()),
        };
        let child = Self::append(tree, epoch, right, leaf);
        let copy = Self::pair(tree, epoch, left, child, Some(child));
        tree.set_decompose(copy, vec![node, leaf]);
        copy
    }

    fn leftmost_tombstone(tree: &PersistentTree, node: NodeId) -> NodeId {
        let mut current = node;
        while !tree.node(current).is_leaf() {
            current = tree
                .node(current)
                .children()
                .iter()
                .copied()
                .find(|&c| tree.node(c).removed_count() > 0)
                .unwrap_or_else(|| unreachable!("counted tombstone not found below {current}"));
        }
        current
    }

    fn nth_tombstone(tree: &PersistentTree, node: NodeId, mut n: u32) -> NodeId {
        let mut current = node;
        while !tree.node(current).is_leaf() {
            let mut next = None;
            for &child in tree.node(current).children() {
                let count = tree.node(child).removed_count();
                if n < count {
                    next = Some(child);
                    break;
                }
                n -= count;
            }
            current = next.unwrap_or_else(|| unreachable!("tombstone index out of range"));
        }
        current
    }

    fn nearest_tombstone(
        tree: &PersistentTree,
        epoch: EpochId,
        root: NodeId,
        hint: Option<NodeId>,
    ) -> NodeId {
        hint.and_then(|leaf| {
            tree.copath(leaf, epoch)
                .into_iter()
                .find(|&sibling| tree.node(sibling).removed_count() > 0)
        })
        .map_or_else(
            || Self::leftmost_tombstone(tree, root),
            |sibling| Self::leftmost_tombstone(tree, sibling),
        )
    }

    fn pick_tombstone(
        &mut self,
        tree: &PersistentTree,
        epoch: EpochId,
        root: NodeId,
        hint: Option<NodeId>,
    ) -> Option<NodeId> {
        let removed = tree.node(root).removed_count();
        if removed == 0 {
            return None;
        }
        match self.placement {
            Placement::Append => None,
            Placement::Greedy => Some(Self::nearest_tombstone(tree, epoch, root, hint)),
            Placement::Random => {
                if self.rng.gen_range(0..=removed) == 0 {
                    return None;
                }
                let index = self.rng.gen_range(0..removed);
                Some(Self::nth_tombstone(tree, root, index))
            }
        }
    }

    fn truncate(tree: &mut PersistentTree, epoch: EpochId, node: NodeId) -> Option<NodeId> {
        if tree.node(node).is_all_removed() {
            return None;
        }
        let (left, right) = match tree.node(node).children() {
            &[] => return Some(node),
            &[left, right] => (left, right),
            other => unreachable!("binary node with {} children", other.len()),
        };
        match Self::truncate(tree, epoch, right) {
            Some(kept) if kept == right => Some(node),
            Some(kept) => {
                let fresh = |n: NodeId| tree.node(n).epoch() == epoch;
                let trace = (fresh(kept) && !fresh(left)).then_some(kept);
                Some(Self::pair(tree, epoch, left, kept, trace))
            }
            None => Self::truncate(tree, epoch, left),
        }
    }
}

impl Default for LeftTree {
    fn default() -> Self {
        Self::new(Placement::default(), Removal::default(), 0)
    }
}

impl TreeStrategy for LeftTree {
    fn name(&self) -> &'static str {
        "left-balanced"
    }

    fn init(
        &mut self,
        tree: &mut PersistentTree,
        members: usize,
        epoch: EpochId,
    ) -> Result<Mutation> {
        if members == 0 {
            return Err(CgkaError::EmptyGroup);
        }
        let root = Self::build_left(tree, epoch, members);
        Ok(Mutation { epoch, root })
    }

    fn add(
        &mut self,
        tree: &mut PersistentTree,
        epoch: EpochId,
        root: NodeId,
        leaf: NodeId,
        hint: Option<NodeId>,
    ) -> Result<Mutation> {
        debug_assert!(tree.node(leaf).is_leaf() && !tree.node(leaf).is_removed());
        let root = match self.pick_tombstone(tree, epoch, root, hint) {
            Some(tombstone) => {
                debug!(%tombstone, %leaf, "Reusing tombstone slot");
                tree.replace(epoch, tombstone, leaf, |tree, old, copy| {
                    tree.set_decompose(copy, vec![old, leaf]);
                })
            }
            None => Self::append(tree, epoch, root, leaf),
        };
        Ok(Mutation { epoch, root })
    }

    fn remove(
        &mut self,
        tree: &mut PersistentTree,
        epoch: EpochId,
        root: NodeId,
        victim: NodeId,
        _hint: Option<NodeId>,
    ) -> Result<Mutation> {
        if tree.node(root).live_count() <= 1 {
            return Err(CgkaError::LastMember);
        }
        let tombstone = tree.new_tombstone(epoch);
        let root = tree.replace(epoch, victim, tombstone, |_, _, _| {});
        let root = match self.removal {
            Removal::Keep => root,
            Removal::Truncate => {
                let kept = Self::truncate(tree, epoch, root).ok_or(CgkaError::LastMember)?;
                if kept != root {
                    let discarded = tree.discard(root, epoch, kept);
                    debug!(discarded = discarded.len(), "Truncated trailing tombstones");
                }
                kept
            }
        };
        Ok(Mutation { epoch, root })
    }
}
