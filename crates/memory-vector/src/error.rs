//! Vector error types.

use thiserror::Error;

/// Errors that can occur during vector operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VectorError {
    /// Vector has no components
    #[error("Vector is empty")]
    EmptyVector,

    /// Every component is zero, so there is no direction to normalize
    #[error("Vector has zero magnitude")]
    ZeroVector,

    /// A component is NaN or infinite
    #[error("Vector has a non-finite component")]
    NonFinite,

    /// Dimension mismatch
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Byte buffer is not a whole number of f32 values
    #[error("Invalid byte length {0}: must be a multiple of 4")]
    InvalidByteLength(usize),
}
