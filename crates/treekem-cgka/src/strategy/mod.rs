//! Tree-shape strategies
//!
//! A strategy decides where joiners land and what happens to the shape when
//! members leave. It builds new versions through the
//! [`PersistentTree`] primitives and reports the resulting root; it never
//! touches key material, except to annotate replacement nodes through
//! `decompose` so the engine can recompose them.
//!
//! The engine seals the epoch a strategy returns. A strategy that steps
//! through intermediate epochs seals those itself.

mod left;

pub use left::{LeftTree, Placement, Removal};

use crate::epoch::EpochId;
use crate::tree::{NodeId, PersistentTree};
use crate::Result;

/// Outcome of a structural operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    /// Epoch the new root belongs to, equal to or descending from the
    /// epoch the operation was asked to run in
    pub epoch: EpochId,
    /// Root of the new version
    pub root: NodeId,
}

/// Shape policy for the group tree
pub trait TreeStrategy: Send {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Build a tree of `members` fresh leaves in `epoch`; the caller finds
    /// them in order through [`PersistentTree::live_leaves`]
    fn init(&mut self, tree: &mut PersistentTree, members: usize, epoch: EpochId)
        -> Result<Mutation>;

    /// Attach the fresh `leaf` to the version rooted at `root`
    ///
    /// `hint` is the adder's leaf and may steer placement.
    fn add(
        &mut self,
        tree: &mut PersistentTree,
        epoch: EpochId,
        root: NodeId,
        leaf: NodeId,
        hint: Option<NodeId>,
    ) -> Result<Mutation>;

    /// Detach `victim` from the version rooted at `root`
    fn remove(
        &mut self,
        tree: &mut PersistentTree,
        epoch: EpochId,
        root: NodeId,
        victim: NodeId,
        hint: Option<NodeId>,
    ) -> Result<Mutation>;

    /// React to a key update at `leaf`; `None` keeps the shape
    fn update(
        &mut self,
        _tree: &mut PersistentTree,
        _epoch: EpochId,
        _root: NodeId,
        _leaf: NodeId,
        _hint: Option<NodeId>,
    ) -> Result<Option<Mutation>> {
        Ok(None)
    }
}
