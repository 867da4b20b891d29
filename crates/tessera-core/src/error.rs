use thiserror::Error;

use crate::dtype::DType;

/// Errors produced by tensor and pooling operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TesseraError {
    /// A tensor's shape does not match what the operation requires.
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    /// Two tensors that must share a dtype do not.
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },

    /// The operation has no kernel for this dtype.
    #[error("unsupported dtype: {0}")]
    UnsupportedDType(DType),

    /// An axis argument is out of range for the tensor's rank.
    #[error("axis {axis} out of range for {ndim}D tensor")]
    InvalidAxis { axis: usize, ndim: usize },

    /// The requested reshape does not preserve the element count.
    #[error("cannot reshape tensor of {numel} elements to {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<usize> },

    /// Two shapes cannot be broadcast together.
    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },

    /// The operation is a documented capability gap, not a bug.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// A stateful operator stage was called before its prerequisite stage.
    #[error("invalid call sequence: {0}")]
    InvalidState(&'static str),

    /// Storage-level failure or a miscellaneous operation error ("op: message").
    #[error("{0}")]
    StorageError(String),
}
