use thiserror::Error;

/// Errors reported by forest construction, transfer and the index facade.
///
/// Arena exhaustion is not listed here; the allocator panics on it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForestError {
    #[error("dataset is empty ({rows} rows x {cols} cols)")]
    EmptyDataset { rows: usize, cols: usize },

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("dimension mismatch: expected {expected} values, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("index has no device-resident copy")]
    NotOnDevice,

    #[error("transfer to device failed: {0}")]
    Transfer(String),

    #[error("invalid packed forest: {0}")]
    InvalidSnapshot(String),
}
