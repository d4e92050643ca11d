//! TreeKEM continuous group key agreement
//!
//! A group shares a secret through a tree of key pairs: members sit at the
//! leaves and know every key on their path to the root. Membership changes
//! create a new version of the tree; a commit then re-keys just enough of it
//! that removed members lose access and everyone else can derive the new
//! group secret.
//!
//! ## Layers
//!
//! - [`epoch`]: versions as an ancestor tree with jump pointers, and
//!   [`EpochMap`] for "value as of epoch `e`" lookups
//! - [`tree`]: the persistent, path-copying [`PersistentTree`]
//! - [`strategy`]: where joiners land and how removals reshape the tree
//!   ([`LeftTree`])
//! - [`region`]: which nodes a committer re-keys ([`PathRegion`],
//!   [`FullRegion`], [`DepthRegion`])
//! - [`taint`]: who knows secrets off their own path
//! - [`engine`]: the [`TreeKem`] group state machine and its skeleton commit
//!
//! All cryptography goes through the [`treekem_crypto::CryptoPort`] handed
//! to the engine.
//!
//! ## Example
//!
//! ```
//! use treekem_cgka::{CgkaConfig, MemberId, TreeKem};
//! use treekem_crypto::CountingCrypto;
//!
//! let members: Vec<_> = (0..4).map(MemberId).collect();
//! let mut group = TreeKem::init(CgkaConfig::default(), CountingCrypto::new(7), &members)?;
//! group.fill()?;
//!
//! let report = group.add(MemberId(0), MemberId(4))?.expect("unbatched add commits");
//! assert_eq!(group.member_count(), 5);
//! assert!(!report.deliveries.is_empty());
//! # Ok::<(), treekem_cgka::CgkaError>(())
//! ```

/// Engine configuration and TOML loading
pub mod config;
/// TreeKEM group engine
pub mod engine;
/// Epoch tree and epoch-keyed maps
pub mod epoch;
/// Error types
pub mod error;
/// Regeneration regions
pub mod region;
/// Tree-shape strategies
pub mod strategy;
/// Taint bookkeeping
pub mod taint;
/// Persistent versioned tree
pub mod tree;
/// Shared identifiers
pub mod types;

pub use config::*;
pub use engine::*;
pub use epoch::*;
pub use error::*;
pub use region::*;
pub use strategy::*;
pub use taint::*;
pub use tree::*;
pub use types::*;
