//! Tunable coefficients for hierarchy construction.

use serde::{Deserialize, Serialize};

use crate::error::{ChError, ChResult};

/// Coefficients and limits used by [`crate::contraction::contract_graph`].
///
/// Defaults reproduce the original engine's tuned values (`Ce = 170`,
/// `Cn = 190`, hop limit `1000`) rather than an earlier, looser revision
/// of the same constants (`30`/`20`) that appears in some copies of the
/// original source — the tuned values are what the shipped engine
/// actually used.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChConfig {
    /// Weight of the edge-difference term in the contraction priority
    /// heuristic (higher favors contracting vertices that add fewer
    /// shortcuts relative to removed edges).
    pub edge_difference_coefficient: f64,
    /// Weight of the deleted-neighbors term (higher favors contracting
    /// vertices whose neighbors are mostly already contracted, spreading
    /// contraction evenly across the graph instead of along a frontier).
    pub deleted_neighbors_coefficient: f64,
    /// Maximum number of hops a witness search will explore before
    /// giving up and assuming no witness exists.
    pub witness_hop_limit: u32,
}

impl Default for ChConfig {
    fn default() -> Self {
        Self {
            edge_difference_coefficient: 170.0,
            deleted_neighbors_coefficient: 190.0,
            witness_hop_limit: 1000,
        }
    }
}

impl ChConfig {
    pub fn from_toml_str(s: &str) -> ChResult<Self> {
        toml::from_str(s).map_err(|e| ChError::InvalidInput(format!("invalid config: {e}")))
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> ChResult<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ChError::InvalidInput(format!("failed to read config file: {e}")))?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_tuned_engine_values() {
        let config = ChConfig::default();
        assert_eq!(config.edge_difference_coefficient, 170.0);
        assert_eq!(config.deleted_neighbors_coefficient, 190.0);
        assert_eq!(config.witness_hop_limit, 1000);
    }

    #[test]
    fn loads_partial_overrides_from_toml() {
        let config = ChConfig::from_toml_str(
            "edge_difference_coefficient = 30.0\ndeleted_neighbors_coefficient = 20.0\nwitness_hop_limit = 500\n",
        )
        .unwrap();
        assert_eq!(config.edge_difference_coefficient, 30.0);
        assert_eq!(config.witness_hop_limit, 500);
    }
}
