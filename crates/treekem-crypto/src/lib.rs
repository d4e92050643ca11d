//! Capability ports for TreeKEM key agreement
//!
//! The key-agreement engine never calls a concrete primitive directly. It is
//! handed a [`CryptoPort`] and only ever asks it for:
//!
//! - `random()`: a fresh seed
//! - `prg(seed, k)`: one seed for the next level plus `k - 1` secrets
//! - `pke_gen` / `pke_enc` / `pke_dec`: public-key encryption of secrets
//! - `ske_gen` / `ske_enc` / `ske_dec`: symmetric encryption of secrets
//!
//! [`CountingCrypto`] is the deterministic double used by tests and
//! benchmarks. It counts every call in [`CryptoStats`] and is functionally
//! correct (a ciphertext only opens under the matching key), but it offers no
//! security whatsoever.

/// Deterministic counting implementation of the ports
pub mod counting;
/// Error type for port failures
pub mod error;
/// The capability port trait
pub mod port;
/// Secrets, keys and ciphertexts
pub mod types;

pub use counting::*;
pub use error::*;
pub use port::*;
pub use types::*;
