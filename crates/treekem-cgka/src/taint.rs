//! Taint bookkeeping
//!
//! A committer that re-keys a node off its own direct path learns that
//! node's secret although it does not sit below it. The taint table records
//! these `(member, node)` facts in both directions so that removing or
//! updating the member can re-queue every node whose secret it still knows.

use crate::tree::NodeId;
use crate::types::MemberId;
use std::collections::{BTreeMap, BTreeSet};

/// Bidirectional member/node taint relation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaintTable {
    by_member: BTreeMap<MemberId, BTreeSet<NodeId>>,
    by_node: BTreeMap<NodeId, BTreeSet<MemberId>>,
}

impl TaintTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `member` knows the secret of `node`
    pub fn insert(&mut self, member: MemberId, node: NodeId) -> bool {
        self.by_node.entry(node).or_default().insert(member);
        self.by_member.entry(member).or_default().insert(node)
    }

    /// Whether `member` is recorded as knowing `node`
    pub fn contains(&self, member: MemberId, node: NodeId) -> bool {
        self.by_member
            .get(&member)
            .is_some_and(|nodes| nodes.contains(&node))
    }

    /// Nodes tainted by `member`
    pub fn nodes_of(&self, member: MemberId) -> Vec<NodeId> {
        self.by_member
            .get(&member)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Members tainting `node`
    pub fn holders_of(&self, node: NodeId) -> Vec<MemberId> {
        self.by_node
            .get(&node)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Forget every entry for `node`, returning how many were dropped
    pub fn rinse(&mut self, node: NodeId) -> usize {
        let Some(members) = self.by_node.remove(&node) else {
            return 0;
        };
        for member in &members {
            if let Some(nodes) = self.by_member.get_mut(member) {
                nodes.remove(&node);
                if nodes.is_empty() {
                    self.by_member.remove(member);
                }
            }
        }
        members.len()
    }

    /// Forget every entry for `member`, returning the nodes it tainted
    pub fn drop_member(&mut self, member: MemberId) -> Vec<NodeId> {
        let nodes = self.by_member.remove(&member).unwrap_or_default();
        for node in &nodes {
            if let Some(members) = self.by_node.get_mut(node) {
                members.remove(&member);
                if members.is_empty() {
                    self.by_node.remove(node);
                }
            }
        }
        nodes.into_iter().collect()
    }

    /// Copy every holder of `from` onto `to`
    pub fn transfer(&mut self, from: NodeId, to: NodeId) -> usize {
        let holders = self.holders_of(from);
        for member in &holders {
            self.insert(*member, to);
        }
        holders.len()
    }

    /// Number of `(member, node)` entries
    pub fn len(&self) -> usize {
        self.by_member.values().map(BTreeSet::len).sum()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.by_member.is_empty()
    }

    /// All entries ordered by member
    pub fn iter(&self) -> impl Iterator<Item = (MemberId, NodeId)> + '_ {
        self.by_member
            .iter()
            .flat_map(|(member, nodes)| nodes.iter().map(move |node| (*member, *node)))
    }

    /// Whether both directions describe the same relation
    pub fn is_consistent(&self) -> bool {
        let forward = self.len();
        let backward: usize = self.by_node.values().map(BTreeSet::len).sum();
        forward == backward
            && self.iter().all(|(member, node)| {
                self.by_node
                    .get(&node)
                    .is_some_and(|members| members.contains(&member))
            })
    }
}
