use crate::error::ForestError;

/// A borrowed, row-major point set of `rows` points with `cols` coordinates each.
///
/// The matrix never copies or mutates the underlying slice. Any element type
/// that widens losslessly into `f64` can be indexed; accumulation always
/// happens in `f64`.
#[derive(Clone, Copy, Debug)]
pub struct PointMatrix<'a, T> {
    data: &'a [T],
    rows: usize,
    cols: usize,
}

impl<'a, T: Copy + Into<f64>> PointMatrix<'a, T> {
    /// Wraps `data` as a `rows` x `cols` matrix.
    ///
    /// Fails if the slice length does not equal `rows * cols`.
    pub fn new(data: &'a [T], rows: usize, cols: usize) -> Result<Self, ForestError> {
        let expected = rows * cols;
        if data.len() != expected {
            return Err(ForestError::DimensionMismatch { expected, actual: data.len() });
        }
        Ok(PointMatrix { data, rows, cols })
    }

    /// Wraps a flat slice whose row count is derived from `cols`.
    pub fn from_flat(data: &'a [T], cols: usize) -> Result<Self, ForestError> {
        if cols == 0 {
            return Err(ForestError::EmptyDataset { rows: 0, cols });
        }
        if data.len() % cols != 0 {
            return Err(ForestError::DimensionMismatch {
                expected: (data.len() / cols + 1) * cols,
                actual: data.len(),
            });
        }
        Self::new(data, data.len() / cols, cols)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    #[inline]
    pub fn row(&self, index: usize) -> &'a [T] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col].into()
    }

    /// Copies the whole matrix into a flat `f64` buffer, e.g. for upload.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        self.data.iter().map(|&v| v.into()).collect()
    }
}
