use serde::{Deserialize, Serialize};

use crate::distance::Distance;
use crate::error::ForestError;

/// What happens to the host arena once the forest is resident on the device.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostRetention {
    /// Drop the host arena after a successful transfer.
    #[default]
    Release,
    /// Keep the host arena for inspection alongside the device copy.
    Retain,
}

/// Construction parameters of a randomized k-d forest index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexParams {
    /// Number of randomized trees, at least one.
    pub trees: usize,
    /// Seed for the shuffles and dimension picks. `None` draws a fresh seed.
    pub seed: Option<u64>,
    pub distance: Distance,
    pub host_retention: HostRetention,
}

impl Default for IndexParams {
    fn default() -> Self {
        IndexParams {
            trees: 1,
            seed: None,
            distance: Distance::L2,
            host_retention: HostRetention::Release,
        }
    }
}

impl IndexParams {
    pub fn with_trees(trees: usize) -> Self {
        IndexParams { trees, ..Default::default() }
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> Result<(), ForestError> {
        if self.trees == 0 {
            return Err(ForestError::InvalidParams("trees must be at least 1".into()));
        }
        Ok(())
    }
}

/// Parameters of a device-side k-nearest-neighbor search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Maximum number of leaves visited per query across all trees.
    pub checks: usize,
    /// Approximation slack: branches are skipped unless they may hold a point
    /// closer than `worst / (1 + eps)`.
    pub eps: f64,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams { checks: 32, eps: 0.0 }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), ForestError> {
        if self.checks == 0 {
            return Err(ForestError::InvalidParams("checks must be at least 1".into()));
        }
        if self.eps.is_nan() || self.eps < 0.0 {
            return Err(ForestError::InvalidParams("eps must be non-negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let params = IndexParams::default();
        assert_eq!(params.trees, 1);
        assert!(params.validate().is_ok());
        assert!(IndexParams::with_trees(0).validate().is_err());
        assert!(SearchParams::default().validate().is_ok());
        assert!(SearchParams { checks: 0, eps: 0.0 }.validate().is_err());
        assert!(SearchParams { checks: 4, eps: f64::NAN }.validate().is_err());
    }
}
