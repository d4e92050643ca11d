//! Commit-time skeleton walk
//!
//! The skeleton is every node created since the last commit, every node
//! queued in the skeleton proposal, and the committer's own direct path. A
//! commit visits it bottom-up from the root and, per node:
//!
//! - tombstones and all-removed subtrees are blanked
//! - the committer's own leaf draws a fresh seed; every other leaf keeps its
//!   key, since only a leaf's owner may know its secret
//! - internal nodes first rinse their taint; outside the region they are
//!   blanked or recomposed, inside it they derive a seed from the trace child
//!   (or draw one), regenerate keys, and deliver the seed to every other
//!   child
//!
//! The root's next seed is the new group secret.

use super::report::{CommitReport, Delivery};
use crate::config::CgkaConfig;
use crate::epoch::EpochId;
use crate::error::CgkaError;
use crate::region::Region;
use crate::taint::TaintTable;
use crate::tree::{NodeData, NodeId, PersistentTree};
use crate::types::MemberId;
use crate::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{trace, warn};
use treekem_crypto::{CryptoPort, Seed};

/// Expand `seed`, install the derived key material at `node`, and return the
/// seed for the next level up
pub(super) fn derive_node_keys<C: CryptoPort>(
    crypto: &mut C,
    tree: &mut PersistentTree,
    use_ske: bool,
    node: NodeId,
    seed: &Seed,
) -> Result<Seed> {
    let outputs = if use_ske { 3 } else { 2 };
    let (next, secrets) = crypto.prg(seed, outputs)?;
    if secrets.len() != outputs - 1 {
        return Err(CgkaError::PortContract {
            expected: outputs - 1,
            actual: secrets.len(),
        });
    }
    let keys = crypto.pke_gen(&secrets[0]);
    let ske = use_ske.then(|| Arc::new(crypto.ske_gen(&secrets[1])));
    *tree.data_mut(node) = NodeData {
        keys: Some(Arc::new(keys)),
        ske,
        unmerged: Vec::new(),
    };
    Ok(next)
}

/// Engine state a commit reads and rewrites
pub(super) struct Skeleton<'a, C: CryptoPort> {
    pub(super) tree: &'a mut PersistentTree,
    pub(super) crypto: &'a mut C,
    pub(super) taint: &'a mut TaintTable,
    pub(super) region: &'a dyn Region,
    pub(super) config: &'a CgkaConfig,
    pub(super) proposal: &'a BTreeSet<NodeId>,
    pub(super) committer: MemberId,
    pub(super) committer_leaf: NodeId,
    pub(super) epoch: EpochId,
    pub(super) committed: EpochId,
    pub(super) root: NodeId,
}

impl<'a, C: CryptoPort> Skeleton<'a, C> {
    /// Walk the skeleton and produce the commit
    pub(super) fn run(self) -> Result<CommitReport> {
        let path = self.tree.path(self.committer_leaf, self.epoch);
        let path_child = path.windows(2).map(|pair| (pair[1], pair[0])).collect();
        let walk = Walk {
            path: path.into_iter().collect(),
            path_child,
            visited: Vec::new(),
            regenerated: Vec::new(),
            blanked: Vec::new(),
            recomposed: Vec::new(),
            deliveries: Vec::new(),
            fresh_draws: 0,
            input: self,
        };
        walk.finish()
    }
}

struct Walk<'a, C: CryptoPort> {
    input: Skeleton<'a, C>,
    path: BTreeSet<NodeId>,
    /// Path node to the path child below it
    path_child: BTreeMap<NodeId, NodeId>,
    visited: Vec<NodeId>,
    regenerated: Vec<NodeId>,
    blanked: Vec<NodeId>,
    recomposed: Vec<NodeId>,
    deliveries: Vec<Delivery>,
    fresh_draws: u32,
}

impl<'a, C: CryptoPort> Walk<'a, C> {
    fn finish(mut self) -> Result<CommitReport> {
        let root = self.input.root;
        let seed = if self.in_skeleton(root) {
            self.visit(root)?
        } else {
            None
        };
        let group_secret = match seed {
            Some(next) => next,
            None => {
                let secret = self.draw();
                self.broadcast(root, root, &secret)?;
                secret
            }
        };
        Ok(CommitReport {
            committer: self.input.committer,
            epoch: self.input.epoch,
            visited: self.visited,
            regenerated: self.regenerated,
            blanked: self.blanked,
            recomposed: self.recomposed,
            deliveries: self.deliveries,
            fresh_draws: self.fresh_draws,
            group_secret,
        })
    }

    fn in_skeleton(&self, node: NodeId) -> bool {
        let epochs = self.input.tree.epochs();
        let created = self.input.tree.node(node).epoch();
        debug_assert!(
            epochs.ge(self.input.epoch, created),
            "{node} created after the epoch being committed"
        );
        self.path.contains(&node)
            || self.input.proposal.contains(&node)
            || epochs.lt(self.input.committed, created)
    }

    fn draw(&mut self) -> Seed {
        self.fresh_draws += 1;
        self.input.crypto.random()
    }

    fn visit(&mut self, node: NodeId) -> Result<Option<Seed>> {
        self.visited.push(node);
        let entry = self.input.tree.node(node);
        if entry.is_all_removed() {
            self.blank(node);
            return Ok(None);
        }
        if entry.is_leaf() {
            if node != self.input.committer_leaf {
                trace!(%node, "Foreign leaf keeps its key");
                return Ok(None);
            }
            return self.refresh_leaf(node).map(Some);
        }
        let children = entry.children().to_vec();
        let in_region = self.input.region.is_in_region(
            self.input.tree,
            node,
            self.input.committer_leaf,
            self.input.epoch,
            self.input.root,
            &self.path,
        );

        let mut seeds = Vec::new();
        for &child in &children {
            if self.in_skeleton(child) {
                if let Some(seed) = self.visit(child)? {
                    seeds.push((child, seed));
                }
            }
        }
        self.input.taint.rinse(node);

        if !in_region {
            self.drop_material(node);
            return Ok(None);
        }

        let (trace_child, seed) = match self.select_trace(node, &seeds) {
            Some(index) => {
                let (child, seed) = seeds.swap_remove(index);
                (Some(child), seed)
            }
            None => (None, self.draw()),
        };
        let next = self.install(node, &seed)?;
        if !self.path.contains(&node) {
            self.input.taint.insert(self.input.committer, node);
        }
        for child in children {
            if Some(child) != trace_child {
                self.broadcast(child, node, &seed)?;
            }
        }
        trace!(%node, trace = ?trace_child, "Regenerated node");
        self.regenerated.push(node);
        Ok(Some(next))
    }

    fn refresh_leaf(&mut self, leaf: NodeId) -> Result<Seed> {
        self.input.taint.rinse(leaf);
        let seed = self.draw();
        let next = self.install(leaf, &seed)?;
        self.regenerated.push(leaf);
        Ok(next)
    }

    fn install(&mut self, node: NodeId, seed: &Seed) -> Result<Seed> {
        derive_node_keys(
            self.input.crypto,
            self.input.tree,
            self.input.config.use_ske,
            node,
            seed,
        )
    }

    fn blank(&mut self, node: NodeId) {
        self.input.tree.data_mut(node).blank();
        self.input.taint.rinse(node);
        self.blanked.push(node);
    }

    /// Out-of-region internal node: recompose when allowed, else blank
    fn drop_material(&mut self, node: NodeId) {
        self.input.tree.data_mut(node).blank();
        if self.input.config.recompose && !self.input.proposal.contains(&node) {
            if let Some((data, origin)) = self.find_material(node) {
                trace!(%node, %origin, unmerged = data.unmerged.len(), "Recomposed node");
                *self.input.tree.data_mut(node) = data;
                self.input.taint.transfer(origin, node);
                self.recomposed.push(node);
                return;
            }
        }
        self.blanked.push(node);
    }

    /// Material a replacement node may adopt from its predecessor chain,
    /// with the node it originally belonged to
    fn find_material(&self, node: NodeId) -> Option<(NodeData, NodeId)> {
        let tree = &*self.input.tree;
        let (&predecessor, added) = tree.node(node).decompose()?.split_first()?;
        if self.input.proposal.contains(&predecessor) {
            return None;
        }
        let (mut data, origin) = if tree.data(predecessor).has_keys() {
            (tree.data(predecessor).clone(), predecessor)
        } else {
            self.find_material(predecessor)?
        };
        data.unmerged.extend(
            added
                .iter()
                .copied()
                .filter(|&part| !tree.node(part).is_all_removed()),
        );
        Some((data, origin))
    }

    fn select_trace(&self, node: NodeId, seeds: &[(NodeId, Seed)]) -> Option<usize> {
        let position = |target: NodeId| seeds.iter().position(|(child, _)| *child == target);
        self.path_child
            .get(&node)
            .and_then(|&child| position(child))
            .or_else(|| self.input.tree.node(node).child_trace().and_then(position))
            .or_else(|| (!seeds.is_empty()).then_some(0))
    }

    /// Deliver `secret` to every live member below `node`
    fn broadcast(&mut self, node: NodeId, source: NodeId, secret: &Seed) -> Result<()> {
        let entry = self.input.tree.node(node);
        if entry.is_all_removed() || node == self.input.committer_leaf {
            return Ok(());
        }
        let data = entry.data();
        if data.has_keys() && (data.unmerged.is_empty() || self.input.config.follow_unmerged) {
            let unmerged = data.unmerged.clone();
            self.encrypt_to(node, source, secret)?;
            for member in unmerged {
                self.broadcast(member, source, secret)?;
            }
            return Ok(());
        }
        let children = entry.children().to_vec();
        if children.is_empty() {
            warn!(%node, "Live leaf without keys cannot receive");
            return Ok(());
        }
        for child in children {
            self.broadcast(child, source, secret)?;
        }
        Ok(())
    }

    fn encrypt_to(&mut self, node: NodeId, source: NodeId, secret: &Seed) -> Result<()> {
        let data = self.input.tree.data(node);
        let Some(keys) = data.keys.clone() else {
            warn!(%node, "Delivery target has no keys");
            return Ok(());
        };
        let symmetric = data.ske.clone().filter(|_| {
            self.input.config.use_ske
                && (self.path.contains(&node)
                    || self.input.taint.contains(self.input.committer, node))
        });
        let ciphertext = match symmetric {
            Some(key) => self.input.crypto.ske_enc(&key, secret)?,
            None => self.input.crypto.pke_enc(&keys.public, secret)?,
        };
        self.deliveries.push(Delivery {
            recipient: node,
            source,
            ciphertext,
        });
        Ok(())
    }
}
