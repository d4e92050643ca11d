//! Tree nodes and the key material they carry

use crate::epoch::{EpochId, EpochMap};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::fmt;
use std::sync::Arc;
use treekem_crypto::{KeyPair, SymmetricKey};

/// Handle to a node in a [`PersistentTree`](super::PersistentTree)
///
/// Handles are allocated monotonically and never reused, so they double as a
/// creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Arena index of the node
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node#{}", self.0)
    }
}

/// Key material held at a node
///
/// Key pairs and symmetric keys are shared behind `Arc` because
/// recomposition hands the exact same material to a replacement node.
#[derive(Debug, Clone, Default)]
pub struct NodeData {
    /// Node key pair, `None` when blank
    pub keys: Option<Arc<KeyPair>>,
    /// Symmetric key derived alongside the key pair
    pub ske: Option<Arc<SymmetricKey>>,
    /// Nodes below this one that do not know its secret key
    pub unmerged: Vec<NodeId>,
}

impl NodeData {
    /// Forget all key material
    pub fn blank(&mut self) {
        *self = Self::default();
    }

    /// Whether a key pair is present
    pub fn has_keys(&self) -> bool {
        self.keys.is_some()
    }
}

/// A node in the persistent tree
///
/// Structure (`children`, `child_trace`, `decompose`, aggregate counts) is
/// fixed at creation. Only parent history, key material and the retirement
/// flags change afterwards.
#[derive(Debug)]
pub struct Node {
    pub(super) epoch: EpochId,
    pub(super) children: Vec<NodeId>,
    pub(super) child_trace: Option<NodeId>,
    pub(super) parents: EpochMap<Option<NodeId>>,
    pub(super) root_cache: Cell<Option<(EpochId, NodeId)>>,
    pub(super) decompose: Option<Vec<NodeId>>,
    pub(super) is_component: bool,
    pub(super) retired: bool,
    pub(super) removed: bool,
    pub(super) height: u32,
    pub(super) leaf_count: u32,
    pub(super) removed_count: u32,
    pub(super) perfect: bool,
    pub(super) data: NodeData,
}

impl Node {
    pub(super) fn leaf(epoch: EpochId, removed: bool) -> Self {
        Self {
            epoch,
            children: Vec::new(),
            child_trace: None,
            parents: EpochMap::new(),
            root_cache: Cell::new(None),
            decompose: None,
            is_component: false,
            retired: false,
            removed,
            height: 0,
            leaf_count: 1,
            removed_count: u32::from(removed),
            perfect: true,
            data: NodeData::default(),
        }
    }

    /// Epoch the node was created in
    pub fn epoch(&self) -> EpochId {
        self.epoch
    }

    /// Children in order, empty for leaves
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The child whose change caused this node to be created
    pub fn child_trace(&self) -> Option<NodeId> {
        self.child_trace
    }

    /// `[predecessor, added...]` when this node merges a predecessor with
    /// newly attached subtrees
    pub fn decompose(&self) -> Option<&[NodeId]> {
        self.decompose.as_deref()
    }

    /// Whether the node was absorbed into a replacement via `decompose`
    pub fn is_component(&self) -> bool {
        self.is_component
    }

    /// Whether the node has been detached from the live tree
    pub fn is_retired(&self) -> bool {
        self.retired
    }

    /// Whether the node is a leaf (live or tombstone)
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Whether the node is a tombstone leaf
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Whether every leaf below the node is a tombstone
    pub fn is_all_removed(&self) -> bool {
        self.removed_count == self.leaf_count
    }

    /// Longest path to a leaf
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Leaves below the node, tombstones included
    pub fn leaf_count(&self) -> u32 {
        self.leaf_count
    }

    /// Tombstones below the node
    pub fn removed_count(&self) -> u32 {
        self.removed_count
    }

    /// Live leaves below the node
    pub fn live_count(&self) -> u32 {
        self.leaf_count - self.removed_count
    }

    /// Whether the subtree is a perfect binary tree
    pub fn is_perfect(&self) -> bool {
        self.perfect
    }

    /// Key material
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    /// Parent history, keyed by the epoch each pointer was set
    pub fn parent_history(&self) -> &EpochMap<Option<NodeId>> {
        &self.parents
    }
}
