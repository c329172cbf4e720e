use rand::Rng;

use crate::matrix::PointMatrix;

/// Number of points (plus one) sampled to estimate mean and variance at a node.
/// Around a hundred samples perform as well as using every point.
pub const SAMPLE_MEAN: usize = 100;

/// How many of the highest-variance dimensions compete for the split.
pub const RAND_DIM: usize = 5;

/// Dimensionality at or below which the split dimension is always the one with
/// the highest variance instead of a random pick among the top candidates.
pub const RANDOMIZE_MIN_DIM: usize = 5;

/// Per-dimension accumulators reused by every split of a forest build.
#[derive(Clone, Debug)]
pub struct SplitScratch {
    mean: Vec<f64>,
    var: Vec<f64>,
}

impl SplitScratch {
    pub fn new(dim: usize) -> Self {
        SplitScratch {
            mean: vec![0.0; dim],
            var: vec![0.0; dim],
        }
    }

    /// Number of dimensions the buffers hold.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn variance(&self) -> &[f64] {
        &self.var
    }
}

/// Outcome of splitting one index range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Split {
    /// Length of the left partition, `ind[..index]`.
    pub index: usize,
    pub dim: usize,
    pub value: f64,
}

/// The indices of the `RAND_DIM` largest variances, kept sorted descending.
///
/// Ties keep the earlier dimension first.
#[derive(Clone, Copy, Debug)]
pub struct TopDims {
    ind: [usize; RAND_DIM],
    len: usize,
}

impl TopDims {
    pub fn new() -> Self {
        TopDims { ind: [0; RAND_DIM], len: 0 }
    }

    /// Builds the candidate list for a whole variance vector.
    pub fn from_variance(var: &[f64]) -> Self {
        let mut top = TopDims::new();
        for dim in 0..var.len() {
            top.offer(dim, var);
        }
        top
    }

    /// Considers `dim` for the list, displacing the current minimum if larger.
    pub fn offer(&mut self, dim: usize, var: &[f64]) {
        if self.len < RAND_DIM {
            self.ind[self.len] = dim;
            self.len += 1;
        } else if var[dim] > var[self.ind[self.len - 1]] {
            self.ind[self.len - 1] = dim;
        } else {
            return;
        }

        // Bubble the new entry up to its place.
        let mut j = self.len - 1;
        while j > 0 && var[self.ind[j]] > var[self.ind[j - 1]] {
            self.ind.swap(j, j - 1);
            j -= 1;
        }
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.ind[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for TopDims {
    fn default() -> Self {
        Self::new()
    }
}

/// Chooses the split dimension from the per-dimension variances.
///
/// Above [`RANDOMIZE_MIN_DIM`] dimensions one of the top [`RAND_DIM`] is picked
/// uniformly at random; otherwise the highest variance wins.
pub fn select_division<R: Rng + ?Sized>(var: &[f64], rng: &mut R) -> usize {
    let top = TopDims::from_variance(var);
    let candidates = top.as_slice();
    if var.len() > RANDOMIZE_MIN_DIM {
        candidates[rng.gen_range(0..candidates.len())]
    } else {
        candidates[0]
    }
}

/// Partitions `ind` in place around `value` on dimension `dim`.
///
/// Returns `(lim1, lim2)` such that
/// `ind[..lim1]` holds values `< value`,
/// `ind[lim1..lim2]` holds values `== value` and
/// `ind[lim2..]` holds values `> value`.
pub fn plane_split<T: Copy + Into<f64>>(
    points: &PointMatrix<'_, T>,
    ind: &mut [u32],
    dim: usize,
    value: f64,
) -> (usize, usize) {
    let at = |i: u32| points.get(i as usize, dim);
    let count = ind.len() as isize;

    let mut left: isize = 0;
    let mut right: isize = count - 1;
    loop {
        while left <= right && at(ind[left as usize]) < value {
            left += 1;
        }
        while left <= right && at(ind[right as usize]) >= value {
            right -= 1;
        }
        if left > right {
            break;
        }
        ind.swap(left as usize, right as usize);
        left += 1;
        right -= 1;
    }
    let lim1 = left as usize;

    right = count - 1;
    loop {
        while left <= right && at(ind[left as usize]) <= value {
            left += 1;
        }
        while left <= right && at(ind[right as usize]) > value {
            right -= 1;
        }
        if left > right {
            break;
        }
        ind.swap(left as usize, right as usize);
        left += 1;
        right -= 1;
    }
    let lim2 = left as usize;

    (lim1, lim2)
}

/// Picks a split dimension and threshold for `ind` and partitions it.
///
/// Mean and variance are estimated from the first `SAMPLE_MEAN + 1` entries,
/// which are a random sample because the index list was shuffled. The split
/// index always lies in `1..ind.len()`, so both sides shrink.
///
/// # Panics
///
/// Panics on fewer than two indices or a scratch sized for another dimension.
pub fn mean_split<T, R>(
    points: &PointMatrix<'_, T>,
    ind: &mut [u32],
    scratch: &mut SplitScratch,
    rng: &mut R,
) -> Split
where
    T: Copy + Into<f64>,
    R: Rng + ?Sized,
{
    let count = ind.len();
    assert!(count >= 2, "a split needs at least two points, got {}", count);
    assert_eq!(scratch.dim(), points.cols(), "split scratch does not match the point dimension");

    let SplitScratch { mean, var } = scratch;
    mean.iter_mut().for_each(|m| *m = 0.0);
    var.iter_mut().for_each(|v| *v = 0.0);

    let cnt = (SAMPLE_MEAN + 1).min(count);
    for &i in &ind[..cnt] {
        for (k, m) in mean.iter_mut().enumerate() {
            *m += points.get(i as usize, k);
        }
    }
    let n = cnt as f64;
    mean.iter_mut().for_each(|m| *m /= n);

    // Variance without the 1/n factor; only the ordering matters.
    for &i in &ind[..cnt] {
        for (k, v) in var.iter_mut().enumerate() {
            let d = points.get(i as usize, k) - mean[k];
            *v += d * d;
        }
    }

    let dim = select_division(var, rng);
    let value = mean[dim];

    let (lim1, lim2) = plane_split(points, ind, dim, value);

    let half = count / 2;
    let index = if lim1 == count || lim2 == 0 {
        // Every value on `dim` sits on one side of the mean: the points are
        // identical there. Cut in the middle to keep the tree balanced.
        half
    } else if lim1 > half {
        lim1
    } else if lim2 < half {
        lim2
    } else {
        half
    };

    Split { index, dim, value }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_top_dims_sorted_descending() {
        let var = [3.0, 9.0, 1.0, 7.0, 5.0, 8.0, 2.0];
        let top = TopDims::from_variance(&var);
        assert_eq!(top.as_slice(), &[1, 5, 3, 4, 0]);
    }

    #[test]
    fn test_top_dims_short_and_ties() {
        let var = [2.0, 2.0, 4.0];
        let top = TopDims::from_variance(&var);
        assert_eq!(top.len(), 3);
        assert_eq!(top.as_slice(), &[2, 0, 1]);
    }

    #[test]
    fn test_low_dimension_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(7);
        let var = [1.0, 4.0, 3.0];
        for _ in 0..20 {
            assert_eq!(select_division(&var, &mut rng), 1);
        }
    }

    #[test]
    fn test_high_dimension_picks_among_top() {
        let mut rng = StdRng::seed_from_u64(7);
        let var = [0.0, 9.0, 8.0, 0.0, 7.0, 6.0, 5.0, 0.0];
        let mut seen = [false; 8];
        for _ in 0..200 {
            seen[select_division(&var, &mut rng)] = true;
        }
        assert_eq!(seen, [false, true, true, false, true, true, true, false]);
    }

    #[test]
    fn test_plane_split_three_runs() {
        let data = [3.0, 1.0, 2.0, 2.0, 5.0, 0.0, 2.0, 4.0];
        let points = PointMatrix::new(&data, 8, 1).unwrap();
        let mut ind: Vec<u32> = (0..8).collect();
        let (lim1, lim2) = plane_split(&points, &mut ind, 0, 2.0);
        assert_eq!((lim1, lim2), (2, 5));
        for &i in &ind[..lim1] {
            assert!(data[i as usize] < 2.0);
        }
        for &i in &ind[lim1..lim2] {
            assert_eq!(data[i as usize], 2.0);
        }
        for &i in &ind[lim2..] {
            assert!(data[i as usize] > 2.0);
        }
        let mut sorted = ind.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..8).collect::<Vec<u32>>());
    }

    #[test]
    fn test_identical_points_split_in_middle() {
        let data = [4.0; 10];
        let points = PointMatrix::new(&data, 5, 2).unwrap();
        let mut ind: Vec<u32> = (0..5).collect();
        let mut scratch = SplitScratch::new(2);
        let mut rng = StdRng::seed_from_u64(1);
        let split = mean_split(&points, &mut ind, &mut scratch, &mut rng);
        assert_eq!(split.index, 2);
        assert_eq!(split.value, 4.0);
    }

    #[test]
    #[should_panic(expected = "a split needs at least two points")]
    fn test_split_of_single_point_panics() {
        let data = [1.0];
        let points = PointMatrix::new(&data, 1, 1).unwrap();
        let mut scratch = SplitScratch::new(1);
        let mut rng = StdRng::seed_from_u64(0);
        mean_split(&points, &mut [0], &mut scratch, &mut rng);
    }

    #[test]
    fn test_split_prefers_balance() {
        // Values on dim 0: seven below the mean, one far above.
        let data = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 100.0];
        let points = PointMatrix::new(&data, 8, 1).unwrap();
        let mut ind: Vec<u32> = (0..8).collect();
        let mut scratch = SplitScratch::new(1);
        let mut rng = StdRng::seed_from_u64(3);
        let split = mean_split(&points, &mut ind, &mut scratch, &mut rng);
        assert_eq!(split.dim, 0);
        assert_eq!(split.index, 7);
        assert_eq!(ind[7], 7);
    }
}
