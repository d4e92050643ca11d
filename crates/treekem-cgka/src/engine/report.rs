//! Commit outcome

use crate::epoch::EpochId;
use crate::tree::NodeId;
use crate::types::MemberId;
use treekem_crypto::{Ciphertext, Secret};

/// One ciphertext produced while distributing a regenerated secret
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Node whose key the ciphertext is addressed to
    pub recipient: NodeId,
    /// Node whose seed the ciphertext carries; for a fresh group secret this
    /// is the root
    pub source: NodeId,
    /// The sealed secret
    pub ciphertext: Ciphertext,
}

/// Everything a commit did, in walk order
#[derive(Debug, Clone)]
pub struct CommitReport {
    /// Member that performed the commit
    pub committer: MemberId,
    /// Epoch the commit finalised
    pub epoch: EpochId,
    /// Skeleton nodes in the order the walk entered them
    pub visited: Vec<NodeId>,
    /// Nodes given fresh key material
    pub regenerated: Vec<NodeId>,
    /// Nodes left without key material
    pub blanked: Vec<NodeId>,
    /// Out-of-region nodes that adopted their predecessor's material
    pub recomposed: Vec<NodeId>,
    /// Ciphertexts to hand to the delivery layer
    pub deliveries: Vec<Delivery>,
    /// Seeds drawn from fresh randomness rather than derived from a child
    pub fresh_draws: u32,
    /// The new group secret
    pub group_secret: Secret,
}

impl CommitReport {
    /// Number of ciphertexts produced
    pub fn ciphertext_count(&self) -> usize {
        self.deliveries.len()
    }

    /// Deliveries carrying the seed of `source`
    pub fn deliveries_from(&self, source: NodeId) -> impl Iterator<Item = &Delivery> + '_ {
        self.deliveries.iter().filter(move |d| d.source == source)
    }
}
