//! Persistent versioned tree
//!
//! Nodes live in an arena and are never mutated structurally: a change at
//! some leaf creates fresh nodes along its path (path copying) while every
//! untouched subtree is shared between versions. Each node records its parent
//! per epoch in an [`EpochMap`], so any node can answer "who was my parent,
//! and which root was I under, as of epoch `e`".
//!
//! ## Lifecycle
//!
//! A structural operation at epoch `e`:
//!
//! 1. creates nodes with [`PersistentTree::new_node`] (which points the
//!    children's parent at `e`) or walks a replacement to the root with
//!    [`PersistentTree::replace`]
//! 2. seals the epoch with [`PersistentTree::seal`], fixing the root and the
//!    parent pointers below every new node
//! 3. releases history of the previous version with
//!    [`PersistentTree::clear_till`]
//!
//! Retired nodes keep their key material until the caller drops it, because
//! recomposition may still read it through `decompose`.

mod node;

pub use node::{Node, NodeData, NodeId};

use crate::epoch::{EpochId, EpochTree};
use std::collections::BTreeSet;
use tracing::trace;

/// Arena-backed persistent tree plus the epoch tree it is versioned by
#[derive(Debug, Default)]
pub struct PersistentTree {
    epochs: EpochTree,
    nodes: Vec<Node>,
}

impl PersistentTree {
    /// Create an empty arena with only the genesis epoch
    pub fn new() -> Self {
        Self::default()
    }

    /// The epoch tree
    pub fn epochs(&self) -> &EpochTree {
        &self.epochs
    }

    /// Step to a fresh child epoch of `parent`
    pub fn step(&mut self, parent: EpochId) -> EpochId {
        self.epochs.step(parent)
    }

    /// Number of nodes ever allocated
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was ever allocated
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Borrow a node
    ///
    /// # Panics
    ///
    /// If `id` was not allocated by this tree.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    /// Key material of a node
    pub fn data(&self, id: NodeId) -> &NodeData {
        &self.node(id).data
    }

    /// Mutable key material of a node
    pub fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.node_mut(id).data
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(
            u32::try_from(self.nodes.len()).unwrap_or_else(|_| panic!("node arena exhausted")),
        );
        self.nodes.push(node);
        id
    }

    /// Allocate a live leaf created in `epoch`
    pub fn new_leaf(&mut self, epoch: EpochId) -> NodeId {
        self.push(Node::leaf(epoch, false))
    }

    /// Allocate a tombstone leaf created in `epoch`
    pub fn new_tombstone(&mut self, epoch: EpochId) -> NodeId {
        self.push(Node::leaf(epoch, true))
    }

    /// Allocate an internal node and point each child's parent at it as of
    /// `epoch`, overwriting any pointer already set in that epoch
    ///
    /// `child_trace` names the single child created in `epoch` that caused
    /// this node; it must be `None` when several children are new.
    pub fn new_node(
        &mut self,
        epoch: EpochId,
        children: Vec<NodeId>,
        child_trace: Option<NodeId>,
    ) -> NodeId {
        assert!(!children.is_empty(), "internal node without children");
        for &child in &children {
            assert!(
                self.epochs.ge(epoch, self.node(child).epoch),
                "child {child} is newer than its parent epoch {epoch}"
            );
        }
        if let Some(trace) = child_trace {
            assert!(children.contains(&trace), "trace {trace} is not a child");
            let fresh = children
                .iter()
                .filter(|&&c| self.node(c).epoch == epoch)
                .count();
            assert!(fresh <= 1, "trace given with {fresh} children new in {epoch}");
        }

        let kids: Vec<&Node> = children.iter().map(|&c| self.node(c)).collect();
        let height = 1 + kids.iter().map(|n| n.height).max().unwrap_or(0);
        let leaf_count = kids.iter().map(|n| n.leaf_count).sum();
        let removed_count = kids.iter().map(|n| n.removed_count).sum();
        let perfect = kids.len() == 2
            && kids.iter().all(|n| n.perfect)
            && kids[0].height == kids[1].height;

        let id = self.push(Node {
            epoch,
            children: children.clone(),
            child_trace,
            height,
            leaf_count,
            removed_count,
            perfect,
            removed: false,
            ..Node::leaf(epoch, false)
        });
        for child in children {
            self.set_parent(child, epoch, Some(id));
        }
        id
    }

    /// Record that `node` merges `parts[0]` with the subtrees `parts[1..]`
    ///
    /// Marks the predecessor `parts[0]` as a component.
    pub fn set_decompose(&mut self, node: NodeId, parts: Vec<NodeId>) {
        assert!(parts.len() >= 2, "decompose needs a predecessor and an addition");
        self.node_mut(parts[0]).is_component = true;
        self.node_mut(node).decompose = Some(parts);
    }

    /// Set the parent of `node` as of `epoch`
    pub fn set_parent(&mut self, node: NodeId, epoch: EpochId, parent: Option<NodeId>) {
        let Self { epochs, nodes } = self;
        nodes[node.index()].parents.insert(epochs, epoch, parent);
    }

    /// Parent of `node` as of `epoch`
    pub fn parent(&self, node: NodeId, epoch: EpochId) -> Option<NodeId> {
        self.node(node)
            .parents
            .lowest_ancestor(&self.epochs, epoch)
            .and_then(|(_, parent)| *parent)
    }

    /// Root above `node` as of `epoch`
    ///
    /// With `caching`, the answer is memoised per node. Only cache lookups
    /// at sealed epochs; an unsealed epoch may still change.
    pub fn root_of(&self, node: NodeId, epoch: EpochId, caching: bool) -> NodeId {
        let cell = &self.node(node).root_cache;
        if caching {
            if let Some((cached_epoch, root)) = cell.get() {
                if cached_epoch == epoch && self.parent(root, epoch).is_none() {
                    return root;
                }
            }
        }
        let mut current = node;
        while let Some(parent) = self.parent(current, epoch) {
            current = parent;
        }
        if caching {
            cell.set(Some((epoch, current)));
        }
        current
    }

    /// Nodes from `node` up to its root as of `epoch`, inclusive
    pub fn path(&self, node: NodeId, epoch: EpochId) -> Vec<NodeId> {
        let mut path = vec![node];
        let mut current = node;
        while let Some(parent) = self.parent(current, epoch) {
            path.push(parent);
            current = parent;
        }
        path
    }

    /// Siblings of every node on the path of `node`, bottom-up
    pub fn copath(&self, node: NodeId, epoch: EpochId) -> Vec<NodeId> {
        let path = self.path(node, epoch);
        path.windows(2)
            .flat_map(|pair| {
                self.node(pair[1])
                    .children
                    .iter()
                    .copied()
                    .filter(move |&c| c != pair[0])
            })
            .collect()
    }

    /// Replace `old` with `new` under every ancestor of `old` as of `epoch`
    ///
    /// Each ancestor is copied with the replaced child swapped in; the copy's
    /// trace is the replaced child when that child is new in `epoch`. The
    /// `plugin` sees every `(old ancestor, copy)` pair bottom-up and may
    /// annotate the copy. Returns the new root.
    pub fn replace<F>(&mut self, epoch: EpochId, old: NodeId, new: NodeId, mut plugin: F) -> NodeId
    where
        F: FnMut(&mut Self, NodeId, NodeId),
    {
        let (mut old, mut new) = (old, new);
        while let Some(parent) = self.parent(old, epoch) {
            let children = self
                .node(parent)
                .children
                .iter()
                .map(|&c| if c == old { new } else { c })
                .collect();
            let trace = (self.node(new).epoch == epoch).then_some(new);
            let copy = self.new_node(epoch, children, trace);
            plugin(self, parent, copy);
            old = parent;
            new = copy;
        }
        new
    }

    /// Fix `root` as the root of `epoch` and point the children of every
    /// node created in `epoch` at their parent
    pub fn seal(&mut self, epoch: EpochId, root: NodeId) {
        self.set_parent(root, epoch, None);
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            if self.node(node).epoch != epoch {
                continue;
            }
            let children = self.node(node).children.clone();
            for child in children {
                self.set_parent(child, epoch, Some(node));
                stack.push(child);
            }
        }
    }

    /// Release parent history of every node under `old_root` that is no
    /// longer under `new_root` as of `epoch`
    ///
    /// Subtrees still attached are left alone apart from dropping parent
    /// entries shadowed by `epoch`. Returns the retired nodes, children
    /// before parents.
    pub fn clear_till(&mut self, old_root: NodeId, epoch: EpochId, new_root: NodeId) -> Vec<NodeId> {
        let mut retired = Vec::new();
        if old_root != new_root {
            self.retire(old_root, epoch, new_root, &mut retired);
        }
        trace!(retired = retired.len(), %epoch, "Cleared detached history");
        retired
    }

    fn retire(&mut self, node: NodeId, epoch: EpochId, root: NodeId, retired: &mut Vec<NodeId>) {
        if self.node(node).retired {
            return;
        }
        if self.root_of(node, epoch, false) == root {
            let Self { epochs, nodes } = self;
            nodes[node.index()].parents.prune_shadowed(epochs, epoch);
            return;
        }
        let children = self.node(node).children.clone();
        for child in children {
            self.retire(child, epoch, root, retired);
        }
        let entry = self.node_mut(node);
        entry.parents.clear();
        entry.root_cache.set(None);
        entry.retired = true;
        retired.push(node);
    }

    /// Retire the nodes created in `epoch` below `discarded` that are not
    /// part of the version rooted at `kept`, parents before children
    ///
    /// Older nodes are left to [`PersistentTree::clear_till`].
    pub fn discard(&mut self, discarded: NodeId, epoch: EpochId, kept: NodeId) -> Vec<NodeId> {
        let mut live = BTreeSet::new();
        let mut stack = vec![kept];
        while let Some(node) = stack.pop() {
            if self.node(node).epoch == epoch && live.insert(node) {
                stack.extend(self.node(node).children.iter().copied());
            }
        }

        let mut retired = Vec::new();
        let mut stack = vec![discarded];
        while let Some(node) = stack.pop() {
            let entry = self.node(node);
            if entry.epoch != epoch || entry.retired || live.contains(&node) {
                continue;
            }
            stack.extend(entry.children.iter().copied());
            let entry = self.node_mut(node);
            entry.parents.clear();
            entry.root_cache.set(None);
            entry.retired = true;
            retired.push(node);
        }
        retired
    }

    /// All leaves under `root`, tombstones included, left to right
    pub fn leaves(&self, root: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            let entry = self.node(node);
            if entry.is_leaf() {
                leaves.push(node);
            } else {
                stack.extend(entry.children.iter().rev());
            }
        }
        leaves
    }

    /// Live leaves under `root`, left to right
    pub fn live_leaves(&self, root: NodeId) -> Vec<NodeId> {
        let mut leaves = self.leaves(root);
        leaves.retain(|&leaf| !self.node(leaf).removed);
        leaves
    }

    /// Follow `child_trace` from `root` down to the last changed node
    pub fn trace_leaf(&self, root: NodeId) -> NodeId {
        let mut current = root;
        while let Some(next) = self.node(current).child_trace {
            current = next;
        }
        current
    }
}
