//! Secrets, keys and ciphertexts exchanged with the capability ports
//!
//! Every value is a fixed 32-byte string. Secret-bearing types are zeroized on
//! drop, compare in constant time, and never print their contents: `Debug`
//! shows a short blake3 fingerprint instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length in bytes of every secret, key and ciphertext body
pub const SECRET_LENGTH: usize = 32;

fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(&blake3::hash(bytes).as_bytes()[..4])
}

/// Secret value: a PRG seed, a path secret, or the group secret
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Secret([u8; SECRET_LENGTH]);

/// Seeds and secrets share a representation; the alias documents intent
pub type Seed = Secret;

impl Secret {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    /// Short non-secret identifier for logs and assertions
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Secret {}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret({})", self.fingerprint())
    }
}

/// Public half of a node or leaf key pair
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PublicKey([u8; SECRET_LENGTH]);

impl PublicKey {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    /// Short identifier for logs
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.fingerprint())
    }
}

/// Private half of a key pair
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; SECRET_LENGTH]);

impl SecretKey {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }
}

impl PartialEq for SecretKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SecretKey {}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey({})", fingerprint(&self.0))
    }
}

/// Key pair produced by `pke_gen`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    /// Encryption key, known to everyone in the group
    pub public: PublicKey,
    /// Decryption key, known to the members below the node
    pub secret: SecretKey,
}

/// Symmetric key produced by `ske_gen`
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; SECRET_LENGTH]);

impl SymmetricKey {
    /// Wrap raw bytes
    pub fn from_bytes(bytes: [u8; SECRET_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes
    pub fn as_bytes(&self) -> &[u8; SECRET_LENGTH] {
        &self.0
    }

    /// Public identifier of the key, safe to attach to ciphertexts
    pub fn key_id(&self) -> [u8; SECRET_LENGTH] {
        *blake3::hash(&self.0).as_bytes()
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for SymmetricKey {}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey({})", fingerprint(&self.key_id()))
    }
}

/// Which primitive sealed a ciphertext
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CiphertextKind {
    /// Sealed to a public key
    Pke,
    /// Sealed under a symmetric key
    Ske,
}

/// Encrypted secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    /// Primitive used
    pub kind: CiphertextKind,
    /// Public key bytes (PKE) or symmetric key id (SKE) the ciphertext targets
    pub key_id: [u8; SECRET_LENGTH],
    /// Per-encryption nonce
    pub nonce: u64,
    /// Encrypted secret
    pub body: [u8; SECRET_LENGTH],
}
