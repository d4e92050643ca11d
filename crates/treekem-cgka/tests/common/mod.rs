//! Shared helpers for engine integration tests
#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use tracing_subscriber::EnvFilter;
use treekem_cgka::{CgkaConfig, CommitReport, Delivery, MemberId, NodeId, TreeKem};
use treekem_crypto::{
    Ciphertext, CiphertextKind, CountingCrypto, CryptoPort, KeyPair, PublicKey, Result, Secret,
    SecretKey, Seed, SymmetricKey, SECRET_LENGTH,
};

/// Route engine logs to the test writer; `RUST_LOG=treekem_cgka=trace` to see walks
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counting port that also remembers every key it ever generated
#[derive(Debug, Default)]
pub struct RecordingCrypto {
    inner: CountingCrypto,
    pke: BTreeMap<PublicKey, SecretKey>,
    ske: BTreeMap<[u8; SECRET_LENGTH], SymmetricKey>,
}

impl RecordingCrypto {
    pub fn new(seed: u64) -> Self {
        Self {
            inner: CountingCrypto::new(seed),
            ..Self::default()
        }
    }

    pub fn counting(&self) -> &CountingCrypto {
        &self.inner
    }

    /// Open a ciphertext with whichever recorded key it targets
    pub fn open(&self, ciphertext: &Ciphertext) -> Option<Secret> {
        let mut scratch = CountingCrypto::new(0);
        match ciphertext.kind {
            CiphertextKind::Pke => {
                let secret = self.pke.get(&PublicKey::from_bytes(ciphertext.key_id))?;
                scratch.pke_dec(secret, ciphertext).ok()
            }
            CiphertextKind::Ske => {
                let key = self.ske.get(&ciphertext.key_id)?;
                scratch.ske_dec(key, ciphertext).ok()
            }
        }
    }
}

impl CryptoPort for RecordingCrypto {
    fn random(&mut self) -> Seed {
        self.inner.random()
    }

    fn prg(&mut self, seed: &Seed, outputs: usize) -> Result<(Seed, Vec<Secret>)> {
        self.inner.prg(seed, outputs)
    }

    fn pke_gen(&mut self, secret: &Secret) -> KeyPair {
        let pair = self.inner.pke_gen(secret);
        self.pke.insert(pair.public, pair.secret.clone());
        pair
    }

    fn pke_enc(&mut self, public: &PublicKey, message: &Secret) -> Result<Ciphertext> {
        self.inner.pke_enc(public, message)
    }

    fn pke_dec(&mut self, secret: &SecretKey, ciphertext: &Ciphertext) -> Result<Secret> {
        self.inner.pke_dec(secret, ciphertext)
    }

    fn ske_gen(&mut self, secret: &Secret) -> SymmetricKey {
        let key = self.inner.ske_gen(secret);
        self.ske.insert(key.key_id(), key.clone());
        key
    }

    fn ske_enc(&mut self, key: &SymmetricKey, message: &Secret) -> Result<Ciphertext> {
        self.inner.ske_enc(key, message)
    }

    fn ske_dec(&mut self, key: &SymmetricKey, ciphertext: &Ciphertext) -> Result<Secret> {
        self.inner.ske_dec(key, ciphertext)
    }
}

pub fn ids(count: u64) -> Vec<MemberId> {
    (0..count).map(MemberId).collect()
}

/// Initialised and filled group of `count` members
pub fn group(count: u64, config: CgkaConfig) -> TreeKem<RecordingCrypto> {
    let mut group = TreeKem::init(config, RecordingCrypto::new(count), &ids(count)).unwrap();
    group.fill().unwrap();
    group
}

/// Public key a seed expands to at a node
fn public_of(seed: &Seed) -> PublicKey {
    let mut scratch = CountingCrypto::new(0);
    let (_, secrets) = scratch.prg(seed, 2).unwrap();
    scratch.pke_gen(&secrets[0]).public
}

fn next_seed(seed: &Seed) -> Seed {
    CountingCrypto::new(0).prg(seed, 2).unwrap().0
}

fn public_at<C: CryptoPort>(group: &TreeKem<C>, node: NodeId) -> Option<PublicKey> {
    group.tree().data(node).keys.as_ref().map(|pair| pair.public)
}

/// Whether `member` may use a delivery addressed to `recipient`
fn may_open<C: CryptoPort>(
    group: &TreeKem<C>,
    report: &CommitReport,
    path: &[NodeId],
    derived: &BTreeSet<NodeId>,
    delivery: &Delivery,
) -> bool {
    let recipient = delivery.recipient;
    if !path.contains(&recipient) {
        return false;
    }
    let unmerged = &group.tree().data(recipient).unmerged;
    if unmerged.iter().any(|node| path.contains(node)) {
        return false;
    }
    // Fresh keys are only known once derived
    !report.regenerated.contains(&recipient) || derived.contains(&recipient)
}

/// Group secret `member` can reconstruct from the commit, walking its own
/// path bottom-up and chaining seeds wherever node keys match
pub fn derive_as(
    group: &TreeKem<RecordingCrypto>,
    report: &CommitReport,
    member: MemberId,
) -> Option<Secret> {
    let path = group.path_of(member).ok()?;
    let mut derived = BTreeSet::new();
    let mut carry: Option<Seed> = None;

    for &node in &path {
        let expected = public_at(group, node);
        let matches = |seed: &Seed| expected == Some(public_of(seed));
        let seed = carry.take().filter(|seed| matches(seed)).or_else(|| {
            report
                .deliveries_from(node)
                .filter(|delivery| may_open(group, report, &path, &derived, delivery))
                .filter_map(|delivery| group.crypto().open(&delivery.ciphertext))
                .find(|seed| matches(seed))
        });
        if let Some(seed) = seed {
            derived.insert(node);
            carry = Some(next_seed(&seed));
        }
    }
    carry
}

/// Every member but the committer reconstructs the committed group secret
pub fn assert_all_derive(group: &TreeKem<RecordingCrypto>, report: &CommitReport) {
    let secret = group.group_secret().expect("committed group has a secret");
    for member in group.members() {
        if member == report.committer {
            continue;
        }
        assert_eq!(
            derive_as(group, report, member).as_ref(),
            Some(secret),
            "{member} cannot derive the group secret committed by {}",
            report.committer
        );
    }
}

/// Public keys and symmetric key ids `member` holds right now: its path plus
/// every node it tainted
pub fn known_key_ids<C: CryptoPort>(group: &TreeKem<C>, member: MemberId) -> BTreeSet<[u8; 32]> {
    let mut nodes = group.path_of(member).unwrap_or_default();
    nodes.extend(group.taint().nodes_of(member));
    let mut known = BTreeSet::new();
    for node in nodes {
        let data = group.tree().data(node);
        if let Some(pair) = &data.keys {
            known.insert(*pair.public.as_bytes());
        }
        if let Some(key) = &data.ske {
            known.insert(key.key_id());
        }
    }
    known
}

/// Taint entries name live members and nodes attached to the current root
pub fn assert_taint_attached<C: CryptoPort>(group: &TreeKem<C>) {
    assert!(group.taint().is_consistent());
    for (member, node) in group.taint().iter() {
        assert!(group.is_member(member), "taint held by departed {member}");
        assert_eq!(
            group.tree().root_of(node, group.epoch(), false),
            group.root(),
            "{member} taints detached {node}"
        );
    }
}
