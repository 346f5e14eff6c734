//! Error types for kernel dispatch and execution.

use crate::dtype::DataType;
use crate::kernel::KernelState;
use crate::registry::DeviceKind;

/// Broad classification of a [`KernelError`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// The node or kernel was set up incorrectly: bad shapes, attributes,
    /// arity or call order. Fatal to the compile step.
    Config,

    /// No kernel matches the node's signature.
    Dispatch,

    /// A problem detected while a kernel was executing, such as an invalid
    /// input value.
    Runtime,

    /// A data type is not supported for the requested operation.
    Type,
}

/// Errors from typed views of raw addresses.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum AddressError {
    #[error("address {addr:#x} is not aligned to {align} bytes")]
    Misaligned { addr: usize, align: usize },

    #[error("size {size} is not a multiple of element size {elem_size}")]
    SizeMismatch { size: usize, elem_size: usize },

    #[error("buffer of {size} bytes is smaller than the required {required}")]
    TooSmall { size: usize, required: usize },

    #[error("allocation of {size} bytes exceeds the maximum buffer size")]
    TooLarge { size: usize },
}

/// Errors from reducing a sparse gradient.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum SparseGradientError {
    #[error("index {index} is outside the range [0, {first_dim})")]
    IndexOutOfBounds { index: i64, first_dim: usize },

    #[error("expected {expected} values but found {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Errors returned when looking up, configuring or launching a kernel.
///
/// Every variant carries the name of the operator concerned.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum KernelError {
    /// Input shapes are incompatible with each other or with attributes.
    #[error("{op}: invalid shape: {reason}")]
    InvalidShape { op: String, reason: String },

    /// An attribute is missing or has an invalid value.
    #[error("{op}: invalid attribute \"{attr}\": {reason}")]
    InvalidAttr {
        op: String,
        attr: String,
        reason: String,
    },

    /// The node has the wrong number of inputs, outputs or addresses.
    #[error("{op}: expected {expected} {what} but got {actual}")]
    WrongArity {
        op: String,
        what: &'static str,
        expected: String,
        actual: usize,
    },

    /// A kernel method was called in the wrong lifecycle state.
    #[error("{op}: cannot {action} a kernel in state {state:?}")]
    InvalidState {
        op: String,
        action: &'static str,
        state: KernelState,
    },

    /// An address bound at launch could not be used.
    #[error("{op}: {role} {index}: {source}")]
    Address {
        op: String,
        role: &'static str,
        index: usize,
        #[source]
        source: AddressError,
    },

    /// No registered kernel matches the node's signature.
    #[error(
        "no {device} kernel for {op} matches {signature}; supported: [{}]",
        .supported.join(", ")
    )]
    NotFound {
        op: String,
        device: DeviceKind,
        signature: String,
        supported: Vec<String>,
    },

    /// An input contains a value that the kernel cannot process.
    #[error("{op}: invalid value: {reason}")]
    InvalidValue { op: String, reason: String },

    /// The output buffer cannot hold the result produced at launch time.
    #[error("{op}: output needs {required} elements but only {available} are available")]
    OutputTooSmall {
        op: String,
        required: usize,
        available: usize,
    },

    /// Reducing a sparse gradient failed.
    #[error("{op}: {source}")]
    Sparse {
        op: String,
        #[source]
        source: SparseGradientError,
    },

    /// The operation does not support the data type.
    #[error("{op}: unsupported data type {dtype}")]
    UnsupportedType { op: String, dtype: DataType },
}

impl KernelError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            KernelError::InvalidShape { .. }
            | KernelError::InvalidAttr { .. }
            | KernelError::WrongArity { .. }
            | KernelError::InvalidState { .. }
            | KernelError::Address { .. } => ErrorKind::Config,
            KernelError::NotFound { .. } => ErrorKind::Dispatch,
            KernelError::InvalidValue { .. }
            | KernelError::OutputTooSmall { .. }
            | KernelError::Sparse { .. } => ErrorKind::Runtime,
            KernelError::UnsupportedType { .. } => ErrorKind::Type,
        }
    }

    pub(crate) fn invalid_shape(op: &str, reason: impl Into<String>) -> Self {
        KernelError::InvalidShape {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_attr(op: &str, attr: &str, reason: impl Into<String>) -> Self {
        KernelError::InvalidAttr {
            op: op.to_string(),
            attr: attr.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_value(op: &str, reason: impl Into<String>) -> Self {
        KernelError::InvalidValue {
            op: op.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn wrong_arity(
        op: &str,
        what: &'static str,
        expected: impl ToString,
        actual: usize,
    ) -> Self {
        KernelError::WrongArity {
            op: op.to_string(),
            what,
            expected: expected.to_string(),
            actual,
        }
    }

    pub(crate) fn sparse(op: &str, source: SparseGradientError) -> Self {
        KernelError::Sparse {
            op: op.to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressError, ErrorKind, KernelError, SparseGradientError};
    use crate::registry::DeviceKind;

    #[test]
    fn test_error_display() {
        let err = KernelError::NotFound {
            op: "Add".into(),
            device: DeviceKind::Cpu,
            signature: "(f16, f16) -> (f16)".into(),
            supported: vec!["(f32, f32) -> (f32)".into(), "(i32, i32) -> (i32)".into()],
        };
        assert_eq!(
            err.to_string(),
            "no CPU kernel for Add matches (f16, f16) -> (f16); supported: [(f32, f32) -> (f32), (i32, i32) -> (i32)]"
        );
        assert_eq!(err.kind(), ErrorKind::Dispatch);

        let err = KernelError::Address {
            op: "Relu".into(),
            role: "output",
            index: 0,
            source: AddressError::TooSmall {
                size: 8,
                required: 16,
            },
        };
        assert_eq!(
            err.to_string(),
            "Relu: output 0: buffer of 8 bytes is smaller than the required 16"
        );
        assert_eq!(err.kind(), ErrorKind::Config);

        let err = KernelError::sparse(
            "SparseApplyAdagrad",
            SparseGradientError::IndexOutOfBounds {
                index: -1,
                first_dim: 4,
            },
        );
        assert_eq!(
            err.to_string(),
            "SparseApplyAdagrad: index -1 is outside the range [0, 4)"
        );
        assert_eq!(err.kind(), ErrorKind::Runtime);
    }

    #[test]
    fn test_error_source() {
        use std::error::Error;

        let err = KernelError::sparse(
            "SparseApplyAdagrad",
            SparseGradientError::LengthMismatch {
                expected: 6,
                actual: 5,
            },
        );
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("expected 6 values but found 5"));
    }
}
