use serde::{Deserialize, Serialize};

/// Distance metrics supported by the search kernel.
///
/// `L2` is the squared Euclidean distance, which orders neighbors the same
/// way as the true Euclidean distance without the square root.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Distance {
    #[default]
    L2,
    L1,
}

impl Distance {
    /// Distance between two points of equal length.
    #[inline]
    pub fn eval(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Distance::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Distance::L1 => a.iter().zip(b).map(|(x, y)| (x - y).abs()).sum(),
        }
    }

    /// Contribution of a single coordinate difference, used to bound the
    /// distance to the far side of a splitting plane.
    #[inline]
    pub fn accum(&self, diff: f64) -> f64 {
        match self {
            Distance::L2 => diff * diff,
            Distance::L1 => diff.abs(),
        }
    }
}
