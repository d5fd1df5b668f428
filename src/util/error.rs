//! Error types for hoidet.

use thiserror::Error;

/// Result alias for hoidet operations.
pub type HoiResult<T> = std::result::Result<T, HoiError>;

/// Errors that can occur when computing losses or running inference.
///
/// Every variant describes a caller contract violation. Degenerate inputs
/// such as empty batches or absent dataset priors are not errors.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum HoiError {
    /// Two sequences that must agree in length do not.
    #[error("length mismatch for {what}: expected {expected}, got {got}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },
    /// Per-image row counts do not partition the flat array.
    #[error("per-image counts cover {expected} elements but the flat array holds {total}")]
    SplitMismatch { expected: usize, total: usize },
    /// An index is outside of its container.
    #[error("index {index} out of bounds for {context} (len {len})")]
    IndexOutOfBounds {
        index: usize,
        len: usize,
        context: &'static str,
    },
    /// A configuration value is outside of its valid range.
    #[error("invalid config: {reason}")]
    InvalidConfig { reason: &'static str },
    /// The input data or parameters are invalid.
    #[error("invalid input: {reason}")]
    InvalidInput { reason: &'static str },
    /// A batch mixes images with training and inference annotations.
    #[error("batch mixes training and inference annotations")]
    MixedAnnotations,
    /// An operation needs annotations the batch does not carry.
    #[error("missing annotations: {what}")]
    MissingAnnotations { what: &'static str },
    /// The metrics sink rejected a value.
    #[error("event sink failure: {reason}")]
    Sink { reason: String },
}
