//! Counting crypto double
//!
//! Deterministic, seedable stand-in for real primitives. Every call is tallied
//! in [`CryptoStats`] so benchmarks and tests can measure how many draws,
//! expansions, key generations and encryptions an operation costs.
//!
//! The construction is blake3 throughout:
//!
//! - PRG: blake3 XOF in derive-key mode over the seed
//! - PKE: the public key is a blake3 derivation of the secret key, and the body
//!   is the message XOR a keystream keyed by the public key
//! - SKE: same shape, keyed by the symmetric key
//!
//! Anyone holding a public key can open ciphertexts addressed to it. This is a
//! measurement and testing tool, never a production port.

use crate::error::CryptoError;
use crate::port::CryptoPort;
use crate::types::{
    Ciphertext, CiphertextKind, KeyPair, PublicKey, Secret, SecretKey, Seed, SymmetricKey,
    SECRET_LENGTH,
};
use crate::Result;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

const PRG_CONTEXT: &str = "treekem-crypto 2024 prg v1";
const PKE_SECRET_CONTEXT: &str = "treekem-crypto 2024 pke secret key v1";
const PKE_PUBLIC_CONTEXT: &str = "treekem-crypto 2024 pke public key v1";
const SKE_CONTEXT: &str = "treekem-crypto 2024 ske key v1";

/// Per-primitive call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CryptoStats {
    /// Fresh randomness draws
    pub random: u64,
    /// PRG expansions
    pub prg: u64,
    /// Key pair generations
    pub pke_gen: u64,
    /// Public-key encryptions
    pub pke_enc: u64,
    /// Public-key decryptions
    pub pke_dec: u64,
    /// Symmetric key generations
    pub ske_gen: u64,
    /// Symmetric encryptions
    pub ske_enc: u64,
    /// Symmetric decryptions
    pub ske_dec: u64,
}

impl CryptoStats {
    /// Counters accumulated since an earlier snapshot
    pub fn since(&self, earlier: &CryptoStats) -> CryptoStats {
        CryptoStats {
            random: self.random.saturating_sub(earlier.random),
            prg: self.prg.saturating_sub(earlier.prg),
            pke_gen: self.pke_gen.saturating_sub(earlier.pke_gen),
            pke_enc: self.pke_enc.saturating_sub(earlier.pke_enc),
            pke_dec: self.pke_dec.saturating_sub(earlier.pke_dec),
            ske_gen: self.ske_gen.saturating_sub(earlier.ske_gen),
            ske_enc: self.ske_enc.saturating_sub(earlier.ske_enc),
            ske_dec: self.ske_dec.saturating_sub(earlier.ske_dec),
        }
    }

    /// Ciphertexts produced by either primitive
    pub fn encryptions(&self) -> u64 {
        self.pke_enc + self.ske_enc
    }
}

/// Seeded counting implementation of [`CryptoPort`]
#[derive(Debug, Clone)]
pub struct CountingCrypto {
    rng: StdRng,
    nonce: u64,
    stats: CryptoStats,
}

impl CountingCrypto {
    /// Create a double whose draws are reproducible from `seed`
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            nonce: 0,
            stats: CryptoStats::default(),
        }
    }

    /// Create a double seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            nonce: 0,
            stats: CryptoStats::default(),
        }
    }

    /// Counters so far
    pub fn stats(&self) -> CryptoStats {
        self.stats
    }

    /// Zero all counters, keeping RNG state
    pub fn reset_stats(&mut self) {
        self.stats = CryptoStats::default();
    }

    fn next_nonce(&mut self) -> u64 {
        self.nonce = self.nonce.wrapping_add(1);
        self.nonce
    }

    fn public_of(secret: &SecretKey) -> PublicKey {
        PublicKey::from_bytes(blake3::derive_key(PKE_PUBLIC_CONTEXT, secret.as_bytes()))
    }

    fn seal(
        kind: CiphertextKind,
        key_id: [u8; SECRET_LENGTH],
        keystream_key: &[u8; SECRET_LENGTH],
        nonce: u64,
        message: &Secret,
    ) -> Ciphertext {
        let pad = blake3::keyed_hash(keystream_key, &nonce.to_le_bytes());
        let mut body = [0u8; SECRET_LENGTH];
        for (out, (m, p)) in body
            .iter_mut()
            .zip(message.as_bytes().iter().zip(pad.as_bytes()))
        {
            *out = m ^ p;
        }
        Ciphertext {
            kind,
            key_id,
            nonce,
            body,
        }
    }

    fn open(keystream_key: &[u8; SECRET_LENGTH], ciphertext: &Ciphertext) -> Secret {
        let pad = blake3::keyed_hash(keystream_key, &ciphertext.nonce.to_le_bytes());
        let mut plain = [0u8; SECRET_LENGTH];
        for (out, (c, p)) in plain
            .iter_mut()
            .zip(ciphertext.body.iter().zip(pad.as_bytes()))
        {
            *out = c ^ p;
        }
        Secret::from_bytes(plain)
    }

    fn check_kind(expected: CiphertextKind, ciphertext: &Ciphertext) -> Result<()> {
        if ciphertext.kind != expected {
            return Err(CryptoError::WrongKind {
                expected,
                actual: ciphertext.kind,
            });
        }
        Ok(())
    }

    fn check_key(expected: &[u8; SECRET_LENGTH], actual: &[u8; SECRET_LENGTH]) -> Result<()> {
        if expected != actual {
            return Err(CryptoError::KeyMismatch {
                expected: hex::encode(&expected[..4]),
                actual: hex::encode(&actual[..4]),
            });
        }
        Ok(())
    }
}

impl Default for CountingCrypto {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CryptoPort for CountingCrypto {
    fn random(&mut self) -> Seed {
        self.stats.random += 1;
        let mut bytes = [0u8; SECRET_LENGTH];
        self.rng.fill_bytes(&mut bytes);
        Secret::from_bytes(bytes)
    }

    fn prg(&mut self, seed: &Seed, outputs: usize) -> Result<(Seed, Vec<Secret>)> {
        if outputs == 0 {
            return Err(CryptoError::InvalidPrgLength(outputs));
        }
        self.stats.prg += 1;

        let mut hasher = blake3::Hasher::new_derive_key(PRG_CONTEXT);
        hasher.update(seed.as_bytes());
        let mut reader = hasher.finalize_xof();

        let mut next = [0u8; SECRET_LENGTH];
        reader.fill(&mut next);
        let secrets = (1..outputs)
            .map(|_| {
                let mut bytes = [0u8; SECRET_LENGTH];
                reader.fill(&mut bytes);
                Secret::from_bytes(bytes)
            })
            .collect();
        Ok((Secret::from_bytes(next), secrets))
    }

    fn pke_gen(&mut self, secret: &Secret) -> KeyPair {
        self.stats.pke_gen += 1;
        let secret_key = SecretKey::from_bytes(blake3::derive_key(
            PKE_SECRET_CONTEXT,
            secret.as_bytes(),
        ));
        KeyPair {
            public: Self::public_of(&secret_key),
            secret: secret_key,
        }
    }

    fn pke_enc(&mut self, public: &PublicKey, message: &Secret) -> Result<Ciphertext> {
        self.stats.pke_enc += 1;
        let nonce = self.next_nonce();
        Ok(Self::seal(
            CiphertextKind::Pke,
            *public.as_bytes(),
            public.as_bytes(),
            nonce,
            message,
        ))
    }

    fn pke_dec(&mut self, secret: &SecretKey, ciphertext: &Ciphertext) -> Result<Secret> {
        self.stats.pke_dec += 1;
        Self::check_kind(CiphertextKind::Pke, ciphertext)?;
        let public = Self::public_of(secret);
        Self::check_key(&ciphertext.key_id, public.as_bytes())?;
        Ok(Self::open(public.as_bytes(), ciphertext))
    }

    fn ske_gen(&mut self, secret: &Secret) -> SymmetricKey {
        self.stats.ske_gen += 1;
        SymmetricKey::from_bytes(blake3::derive_key(SKE_CONTEXT, secret.as_bytes()))
    }

    fn ske_enc(&mut self, key: &SymmetricKey, message: &Secret) -> Result<Ciphertext> {
        self.stats.ske_enc += 1;
        let nonce = self.next_nonce();
        Ok(Self::seal(
            CiphertextKind::Ske,
            key.key_id(),
            key.as_bytes(),
            nonce,
            message,
        ))
    }

    fn ske_dec(&mut self, key: &SymmetricKey, ciphertext: &Ciphertext) -> Result<Secret> {
        self.stats.ske_dec += 1;
        Self::check_kind(CiphertextKind::Ske, ciphertext)?;
        Self::check_key(&ciphertext.key_id, &key.key_id())?;
        Ok(Self::open(key.as_bytes(), ciphertext))
    }
}
