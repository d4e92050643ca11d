//! Regeneration regions
//!
//! A region decides which skeleton nodes the committer re-keys. Nodes outside
//! the region are blanked (or recomposed) instead, which trades fewer fresh
//! keys now for more ciphertexts in later commits.

use crate::epoch::EpochId;
use crate::tree::{NodeId, PersistentTree};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Region predicate consulted for every skeleton node during a commit
pub trait Region: Send {
    /// Whether `node` should be re-keyed by the committer whose leaf is
    /// `committer`; `direct_path` is the committer's path as of `epoch`
    fn is_in_region(
        &self,
        tree: &PersistentTree,
        node: NodeId,
        committer: NodeId,
        epoch: EpochId,
        root: NodeId,
        direct_path: &BTreeSet<NodeId>,
    ) -> bool;
}

/// Only the committer's direct path
#[derive(Debug, Clone, Copy, Default)]
pub struct PathRegion;

impl Region for PathRegion {
    fn is_in_region(
        &self,
        _tree: &PersistentTree,
        node: NodeId,
        _committer: NodeId,
        _epoch: EpochId,
        _root: NodeId,
        direct_path: &BTreeSet<NodeId>,
    ) -> bool {
        direct_path.contains(&node)
    }
}

/// Every skeleton node
#[derive(Debug, Clone, Copy, Default)]
pub struct FullRegion;

impl Region for FullRegion {
    fn is_in_region(
        &self,
        _tree: &PersistentTree,
        _node: NodeId,
        _committer: NodeId,
        _epoch: EpochId,
        _root: NodeId,
        _direct_path: &BTreeSet<NodeId>,
    ) -> bool {
        true
    }
}

/// Nodes within a bounded number of hops below the committer's path
///
/// A node qualifies when it is on the path, or when walking at most `depth`
/// parent links from it reaches the path. The bound may be lowered per
/// committer leaf, never raised.
#[derive(Debug, Clone, Default)]
pub struct DepthRegion {
    depth: u32,
    overrides: BTreeMap<NodeId, u32>,
}

impl DepthRegion {
    /// Region reaching `depth` hops below the path for every committer
    pub fn new(depth: u32) -> Self {
        Self {
            depth,
            overrides: BTreeMap::new(),
        }
    }

    /// Use `depth` instead of the default when `committer` commits, capped
    /// at the default
    pub fn with_override(mut self, committer: NodeId, depth: u32) -> Self {
        self.overrides.insert(committer, depth.min(self.depth));
        self
    }

    /// Bound applied for a committer leaf
    pub fn depth_for(&self, committer: NodeId) -> u32 {
        self.overrides.get(&committer).copied().unwrap_or(self.depth)
    }
}

impl Region for DepthRegion {
    fn is_in_region(
        &self,
        tree: &PersistentTree,
        node: NodeId,
        committer: NodeId,
        epoch: EpochId,
        _root: NodeId,
        direct_path: &BTreeSet<NodeId>,
    ) -> bool {
        if direct_path.contains(&node) {
            return true;
        }
        let mut current = node;
        for _ in 0..self.depth_for(committer) {
            match tree.parent(current, epoch) {
                Some(parent) if direct_path.contains(&parent) => return true,
                Some(parent) => current = parent,
                None => return false,
            }
        }
        false
    }
}

/// Serializable choice of region
///
/// In TOML: `region = "path"`, `region = "full"` or `region = { depth = 2 }`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionKind {
    /// [`PathRegion`]
    #[default]
    Path,
    /// [`FullRegion`]
    Full,
    /// [`DepthRegion`] with the given bound
    Depth(u32),
}

impl RegionKind {
    /// Instantiate the region
    pub fn build(self) -> Box<dyn Region> {
        match self {
            RegionKind::Path => Box::new(PathRegion),
            RegionKind::Full => Box::new(FullRegion),
            RegionKind::Depth(depth) => Box::new(DepthRegion::new(depth)),
        }
    }
}
