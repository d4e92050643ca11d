//! Error types for group key agreement

use crate::types::MemberId;
use thiserror::Error;
use treekem_crypto::CryptoError;

/// Errors surfaced by [`TreeKem`](crate::TreeKem) and the tree strategies
///
/// Caller preconditions are validated before any state is touched, so an
/// `Err` from a group operation leaves the group exactly as it was.
#[derive(Debug, Error)]
pub enum CgkaError {
    /// The member is not part of the group
    #[error("Member not found: {0}")]
    UnknownMember(MemberId),

    /// The member is already part of the group
    #[error("Member already in group: {0}")]
    DuplicateMember(MemberId),

    /// A removal would leave the group without live members
    #[error("Cannot remove the last member of the group")]
    LastMember,

    /// Members leave by being removed by someone else
    #[error("Member {0} cannot remove itself")]
    SelfRemoval(MemberId),

    /// A group needs at least one initial member
    #[error("Cannot initialize a group with no members")]
    EmptyGroup,

    /// The capability port returned fewer PRG outputs than requested
    #[error("PRG returned {actual} secrets, expected {expected}")]
    PortContract {
        /// Secrets requested
        expected: usize,
        /// Secrets returned
        actual: usize,
    },

    /// Configuration could not be read or parsed
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failure inside the capability port, propagated unchanged
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result alias for group operations
pub type Result<T> = std::result::Result<T, CgkaError>;
