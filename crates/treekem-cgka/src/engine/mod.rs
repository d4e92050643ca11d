//! TreeKEM group engine
//!
//! [`TreeKem`] owns the persistent tree, the member roster, the skeleton
//! proposal and the taint table. Structural operations (`add`, `remove`,
//! `update`) each step to a fresh epoch and queue work; `commit` walks the
//! skeleton and produces the ciphertexts that move every remaining member to
//! the new group secret.
//!
//! ## Batching
//!
//! With [`CgkaConfig::batch_proposals`] unset, every operation commits on
//! behalf of its initiator and returns the [`CommitReport`]. With it set,
//! operations only accumulate until [`TreeKem::commit`].
//!
//! ## Errors
//!
//! Preconditions on member ids are checked before any state changes. Port
//! failures during a commit propagate unchanged; the epoch then stays
//! uncommitted and node material may be partially rewritten, so the group
//! should be discarded.

mod report;
mod skeleton;

pub use report::{CommitReport, Delivery};

use crate::config::CgkaConfig;
use crate::epoch::EpochId;
use crate::error::CgkaError;
use crate::region::Region;
use crate::strategy::{Mutation, TreeStrategy};
use crate::taint::TaintTable;
use crate::tree::{NodeId, PersistentTree};
use crate::types::MemberId;
use crate::Result;
use skeleton::{derive_node_keys, Skeleton};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use treekem_crypto::{CryptoPort, Secret, Seed};

/// Continuous group key agreement over a persistent TreeKEM tree
pub struct TreeKem<C: CryptoPort> {
    config: CgkaConfig,
    crypto: C,
    tree: PersistentTree,
    strategy: Box<dyn TreeStrategy>,
    region: Box<dyn Region>,
    epoch: EpochId,
    committed: EpochId,
    root: NodeId,
    leaves: BTreeMap<MemberId, NodeId>,
    owners: BTreeMap<NodeId, MemberId>,
    proposal: BTreeSet<NodeId>,
    /// Retired components whose taint is dropped at the next commit
    pending_components: Vec<NodeId>,
    taint: TaintTable,
    group_secret: Option<Secret>,
}

impl<C: CryptoPort> TreeKem<C> {
    /// Create a group of `members` with the configured strategy and region
    ///
    /// Members are placed left to right in the given order. The initial
    /// epoch counts as committed; internal nodes start blank (see
    /// [`TreeKem::fill`]).
    pub fn init(config: CgkaConfig, crypto: C, members: &[MemberId]) -> Result<Self> {
        let strategy = Box::new(config.left_tree());
        let region = config.region.build();
        Self::with_parts(config, crypto, strategy, region, members)
    }

    /// Create a group with a custom strategy and region
    pub fn with_parts(
        config: CgkaConfig,
        mut crypto: C,
        mut strategy: Box<dyn TreeStrategy>,
        region: Box<dyn Region>,
        members: &[MemberId],
    ) -> Result<Self> {
        if members.is_empty() {
            return Err(CgkaError::EmptyGroup);
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = members.iter().find(|m| !seen.insert(**m)) {
            return Err(CgkaError::DuplicateMember(*duplicate));
        }

        let mut tree = PersistentTree::new();
        let genesis = tree.epochs().genesis();
        let Mutation { epoch, root } = strategy.init(&mut tree, members.len(), genesis)?;
        tree.seal(epoch, root);

        let placed = tree.live_leaves(root);
        assert_eq!(
            placed.len(),
            members.len(),
            "strategy {} placed the wrong number of leaves",
            strategy.name()
        );
        let mut leaves = BTreeMap::new();
        let mut owners = BTreeMap::new();
        for (&member, &leaf) in members.iter().zip(&placed) {
            let seed = crypto.random();
            tree.data_mut(leaf).keys = Some(Arc::new(crypto.pke_gen(&seed)));
            leaves.insert(member, leaf);
            owners.insert(leaf, member);
        }

        info!(
            members = members.len(),
            strategy = strategy.name(),
            region = ?config.region,
            "Initialized group"
        );
        Ok(Self {
            config,
            crypto,
            tree,
            strategy,
            region,
            epoch,
            committed: epoch,
            root,
            leaves,
            owners,
            proposal: BTreeSet::new(),
            pending_components: Vec::new(),
            taint: TaintTable::new(),
            group_secret: None,
        })
    }

    /// Key every internal node bottom-up as if each member had just
    /// committed along its path, and derive a group secret
    ///
    /// Meant as a warm start right after [`TreeKem::init`], so measurements
    /// begin from a fully keyed tree instead of a blank one.
    pub fn fill(&mut self) -> Result<()> {
        let secret = match self.fill_node(self.root)? {
            Some(next) => next,
            None => self.crypto.random(),
        };
        debug!(secret = %secret.fingerprint(), "Filled tree");
        self.group_secret = Some(secret);
        Ok(())
    }

    fn fill_node(&mut self, node: NodeId) -> Result<Option<Seed>> {
        let entry = self.tree.node(node);
        if entry.is_leaf() || entry.is_all_removed() {
            return Ok(None);
        }
        let trace = entry.child_trace();
        let children = entry.children().to_vec();

        let mut seeds = Vec::new();
        for child in children {
            if let Some(seed) = self.fill_node(child)? {
                seeds.push((child, seed));
            }
        }
        let chosen = trace
            .and_then(|t| seeds.iter().position(|(child, _)| *child == t))
            .or_else(|| (!seeds.is_empty()).then_some(0));
        let seed = match chosen {
            Some(index) => seeds.swap_remove(index).1,
            None => self.crypto.random(),
        };
        derive_node_keys(
            &mut self.crypto,
            &mut self.tree,
            self.config.use_ske,
            node,
            &seed,
        )
        .map(Some)
    }

    /// `adder` adds `new` to the group
    ///
    /// Returns the commit report unless proposals are batched.
    pub fn add(&mut self, adder: MemberId, new: MemberId) -> Result<Option<CommitReport>> {
        let hint = self.leaf(adder)?;
        if self.leaves.contains_key(&new) {
            return Err(CgkaError::DuplicateMember(new));
        }

        let epoch = self.tree.step(self.epoch);
        let leaf = self.tree.new_leaf(epoch);
        let seed = self.crypto.random();
        self.tree.data_mut(leaf).keys = Some(Arc::new(self.crypto.pke_gen(&seed)));

        let mutation = self
            .strategy
            .add(&mut self.tree, epoch, self.root, leaf, Some(hint))?;
        self.advance(epoch, mutation);
        self.leaves.insert(new, leaf);
        self.owners.insert(leaf, new);
        self.proposal.insert(leaf);

        info!(%adder, member = %new, %leaf, epoch = %self.epoch, "Added member");
        self.auto_commit(adder)
    }

    /// `remover` removes `victim` from the group
    ///
    /// Every node the victim is known to hold a secret for is queued for
    /// re-keying. Returns the commit report unless proposals are batched.
    pub fn remove(&mut self, remover: MemberId, victim: MemberId) -> Result<Option<CommitReport>> {
        let hint = self.leaf(remover)?;
        let victim_leaf = self.leaf(victim)?;
        if remover == victim {
            return Err(CgkaError::SelfRemoval(victim));
        }

        let epoch = self.tree.step(self.epoch);
        let mutation = self.strategy.remove(
            &mut self.tree,
            epoch,
            self.root,
            victim_leaf,
            Some(hint),
        )?;
        self.advance(epoch, mutation);
        self.leaves.remove(&victim);
        self.owners.remove(&victim_leaf);

        let tainted = self.taint.drop_member(victim);
        for &node in &tainted {
            self.queue_stale(node);
        }

        info!(
            %remover,
            member = %victim,
            tainted = tainted.len(),
            epoch = %self.epoch,
            "Removed member"
        );
        self.auto_commit(remover)
    }

    /// `updater` requests fresh keys along the path of `target`
    ///
    /// Every node above the target's leaf is queued, as is every node the
    /// target tainted. The leaf itself changes only when the target commits.
    /// Returns the commit report unless proposals are batched.
    pub fn update(&mut self, updater: MemberId, target: MemberId) -> Result<Option<CommitReport>> {
        let hint = self.leaf(updater)?;
        let leaf = self.leaf(target)?;

        let epoch = self.tree.step(self.epoch);
        match self
            .strategy
            .update(&mut self.tree, epoch, self.root, leaf, Some(hint))?
        {
            Some(mutation) => self.advance(epoch, mutation),
            None => {
                self.tree.seal(epoch, self.root);
                self.epoch = epoch;
            }
        }

        let path = self.tree.path(leaf, self.epoch);
        self.proposal.extend(path);
        for node in self.taint.nodes_of(target) {
            self.queue_stale(node);
        }

        info!(%updater, member = %target, epoch = %self.epoch, "Queued update");
        self.auto_commit(updater)
    }

    /// Commit every pending proposal on behalf of `committer`
    ///
    /// Returns `None` when nothing changed since the last commit.
    pub fn commit(&mut self, committer: MemberId) -> Result<Option<CommitReport>> {
        let committer_leaf = self.leaf(committer)?;
        if self.epoch == self.committed {
            debug!(%committer, epoch = %self.epoch, "Nothing to commit");
            return Ok(None);
        }

        let report = Skeleton {
            tree: &mut self.tree,
            crypto: &mut self.crypto,
            taint: &mut self.taint,
            region: self.region.as_ref(),
            config: &self.config,
            proposal: &self.proposal,
            committer,
            committer_leaf,
            epoch: self.epoch,
            committed: self.committed,
            root: self.root,
        }
        .run()?;

        self.committed = self.epoch;
        self.proposal.clear();
        for node in self.pending_components.drain(..) {
            self.taint.rinse(node);
            self.tree.data_mut(node).blank();
        }
        self.group_secret = Some(report.group_secret.clone());

        info!(
            %committer,
            epoch = %self.epoch,
            visited = report.visited.len(),
            regenerated = report.regenerated.len(),
            recomposed = report.recomposed.len(),
            ciphertexts = report.ciphertext_count(),
            fresh_draws = report.fresh_draws,
            "Committed"
        );
        Ok(Some(report))
    }

    fn auto_commit(&mut self, member: MemberId) -> Result<Option<CommitReport>> {
        if self.config.batch_proposals {
            Ok(None)
        } else {
            self.commit(member)
        }
    }

    /// Seal the strategy's result and release what it detached
    ///
    /// Retired components keep their material until the next commit has had
    /// the chance to recompose from them.
    fn advance(&mut self, requested: EpochId, mutation: Mutation) {
        debug_assert!(
            self.tree.epochs().ge(mutation.epoch, requested),
            "strategy returned an epoch outside the requested lineage"
        );
        self.tree.seal(mutation.epoch, mutation.root);
        let retired = self
            .tree
            .clear_till(self.root, mutation.epoch, mutation.root);
        for node in retired {
            if self.tree.node(node).is_component() {
                self.pending_components.push(node);
            } else {
                self.taint.rinse(node);
                self.tree.data_mut(node).blank();
            }
        }
        self.root = mutation.root;
        self.epoch = mutation.epoch;
    }

    /// Queue a stale node: its whole path when attached, else the node itself
    /// so recomposition will not reuse it
    fn queue_stale(&mut self, node: NodeId) {
        debug_assert!(!self.tree.node(node).is_leaf(), "leaf {node} tainted");
        if self.tree.root_of(node, self.epoch, false) == self.root {
            let path = self.tree.path(node, self.epoch);
            self.proposal.extend(path);
        } else {
            self.proposal.insert(node);
        }
    }

    /// Leaf of a member
    pub fn leaf(&self, member: MemberId) -> Result<NodeId> {
        self.leaves
            .get(&member)
            .copied()
            .ok_or(CgkaError::UnknownMember(member))
    }

    /// Member owning a live leaf
    pub fn member_at(&self, leaf: NodeId) -> Option<MemberId> {
        self.owners.get(&leaf).copied()
    }

    /// Path from a member's leaf to the root
    pub fn path_of(&self, member: MemberId) -> Result<Vec<NodeId>> {
        Ok(self.tree.path(self.leaf(member)?, self.epoch))
    }

    /// Whether `member` is in the group
    pub fn is_member(&self, member: MemberId) -> bool {
        self.leaves.contains_key(&member)
    }

    /// Current members in id order
    pub fn members(&self) -> impl Iterator<Item = MemberId> + '_ {
        self.leaves.keys().copied()
    }

    /// Number of members
    pub fn member_count(&self) -> usize {
        self.leaves.len()
    }

    /// Group secret of the last commit, `None` before the first
    pub fn group_secret(&self) -> Option<&Secret> {
        self.group_secret.as_ref()
    }

    /// Current epoch
    pub fn epoch(&self) -> EpochId {
        self.epoch
    }

    /// Epoch of the last commit
    pub fn epoch_committed(&self) -> EpochId {
        self.committed
    }

    /// Whether proposals are waiting for a commit
    pub fn has_pending(&self) -> bool {
        self.epoch != self.committed
    }

    /// Current root
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The persistent tree
    pub fn tree(&self) -> &PersistentTree {
        &self.tree
    }

    /// Taint table
    pub fn taint(&self) -> &TaintTable {
        &self.taint
    }

    /// Nodes queued for the next commit besides newly created ones
    pub fn skeleton_proposal(&self) -> &BTreeSet<NodeId> {
        &self.proposal
    }

    /// Configuration in effect
    pub fn config(&self) -> &CgkaConfig {
        &self.config
    }

    /// Capability port
    pub fn crypto(&self) -> &C {
        &self.crypto
    }

    /// Mutable capability port, e.g. to reset counters
    pub fn crypto_mut(&mut self) -> &mut C {
        &mut self.crypto
    }
}

impl<C: CryptoPort> fmt::Debug for TreeKem<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TreeKem")
            .field("epoch", &self.epoch)
            .field("committed", &self.committed)
            .field("root", &self.root)
            .field("members", &self.leaves.len())
            .field("proposal", &self.proposal.len())
            .finish_non_exhaustive()
    }
}
