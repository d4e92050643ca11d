//! Engine configuration
//!
//! All knobs have defaults, so an empty TOML document is a valid config:
//!
//! ```toml
//! region = { depth = 1 }
//! batch_proposals = true
//! recompose = true
//! follow_unmerged = true
//! use_ske = false
//! seed = 7
//!
//! [strategy]
//! placement = "greedy"
//! removal = "truncate"
//! ```

use crate::error::CgkaError;
use crate::region::RegionKind;
use crate::strategy::{LeftTree, Placement, Removal};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tree strategy settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StrategyConfig {
    /// Where joiners land
    pub placement: Placement,
    /// Whether trailing tombstones are cut
    pub removal: Removal,
}

/// Behaviour switches for [`TreeKem`](crate::TreeKem)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CgkaConfig {
    /// Which skeleton nodes a committer re-keys
    pub region: RegionKind,
    /// Queue proposals until an explicit commit instead of committing after
    /// every operation
    pub batch_proposals: bool,
    /// Let out-of-region replacement nodes reuse their predecessor's keys,
    /// recording the newly attached subtrees as unmerged
    pub recompose: bool,
    /// Encrypt to a node that carries unmerged entries (plus each unmerged
    /// entry) rather than descending into its children
    pub follow_unmerged: bool,
    /// Derive a symmetric key per node and use it when the committer knows it
    pub use_ske: bool,
    /// Seed for strategy randomness
    pub seed: u64,
    /// Tree shape policy
    pub strategy: StrategyConfig,
}

impl Default for CgkaConfig {
    fn default() -> Self {
        Self {
            region: RegionKind::default(),
            batch_proposals: false,
            recompose: true,
            follow_unmerged: true,
            use_ske: false,
            seed: 0,
            strategy: StrategyConfig::default(),
        }
    }
}

impl CgkaConfig {
    /// Parse a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|e| CgkaError::Config(e.to_string()))
    }

    /// Read and parse a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| CgkaError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string(self).map_err(|e| CgkaError::Config(e.to_string()))
    }

    /// Builder-style region override
    pub fn with_region(mut self, region: RegionKind) -> Self {
        self.region = region;
        self
    }

    /// Builder-style strategy override
    pub fn with_strategy(mut self, placement: Placement, removal: Removal) -> Self {
        self.strategy = StrategyConfig { placement, removal };
        self
    }

    /// Builder-style batching override
    pub fn batched(mut self, batch_proposals: bool) -> Self {
        self.batch_proposals = batch_proposals;
        self
    }

    /// The configured left-balanced strategy
    pub fn left_tree(&self) -> LeftTree {
        LeftTree::new(self.strategy.placement, self.strategy.removal, self.seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(CgkaConfig::from_toml_str("").unwrap(), CgkaConfig::default());
    }

    #[test]
    fn test_full_document() {
        let config = CgkaConfig::from_toml_str(
            r#"
            region = { depth = 3 }
            batch_proposals = true
            use_ske = true
            seed = 11

            [strategy]
            placement = "random"
            removal = "truncate"
            "#,
        )
        .unwrap();
        assert_eq!(config.region, RegionKind::Depth(3));
        assert!(config.batch_proposals);
        assert!(config.recompose);
        assert_eq!(config.strategy.placement, Placement::Random);
        assert_eq!(config.strategy.removal, Removal::Truncate);
        assert_eq!(config.seed, 11);
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert_matches!(
            CgkaConfig::from_toml_str("regions = \"full\""),
            Err(CgkaError::Config(_))
        );
    }

    #[test]
    fn test_toml_round_trip() {
        let config = CgkaConfig::default()
            .with_region(RegionKind::Full)
            .with_strategy(Placement::Append, Removal::Keep)
            .batched(true);
        let text = config.to_toml_string().unwrap();
        assert_eq!(CgkaConfig::from_toml_str(&text).unwrap(), config);
    }
}
