//! The capability port consumed by the key-agreement engine

use crate::types::{Ciphertext, KeyPair, PublicKey, Secret, SecretKey, Seed, SymmetricKey};
use crate::Result;

/// Abstract cryptographic capabilities
///
/// Methods take `&mut self` so implementations can keep counters, nonces or
/// RNG state without interior mutability. The engine is single-threaded and
/// owns its port.
pub trait CryptoPort {
    /// Draw a fresh seed
    fn random(&mut self) -> Seed;

    /// Expand `seed` into `outputs` values: the seed for the next level, then
    /// `outputs - 1` independent secrets
    fn prg(&mut self, seed: &Seed, outputs: usize) -> Result<(Seed, Vec<Secret>)>;

    /// Derive a key pair from a secret
    fn pke_gen(&mut self, secret: &Secret) -> KeyPair;

    /// Encrypt a secret to a public key
    fn pke_enc(&mut self, public: &PublicKey, message: &Secret) -> Result<Ciphertext>;

    /// Decrypt a public-key ciphertext
    fn pke_dec(&mut self, secret: &SecretKey, ciphertext: &Ciphertext) -> Result<Secret>;

    /// Derive a symmetric key from a secret
    fn ske_gen(&mut self, secret: &Secret) -> SymmetricKey;

    /// Encrypt a secret under a symmetric key
    fn ske_enc(&mut self, key: &SymmetricKey, message: &Secret) -> Result<Ciphertext>;

    /// Decrypt a symmetric ciphertext
    fn ske_dec(&mut self, key: &SymmetricKey, ciphertext: &Ciphertext) -> Result<Secret>;
}
