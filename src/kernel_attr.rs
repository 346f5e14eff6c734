//! Data type signatures of kernels and nodes.

use std::fmt;

use crate::dtype::{DataType, Format};

/// Type and memory format of one kernel input or output.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct TensorAttr {
    pub dtype: DataType,
    pub format: Format,
}

impl TensorAttr {
    pub fn new(dtype: DataType, format: Format) -> Self {
        TensorAttr { dtype, format }
    }

    /// Return true if a tensor with attributes `actual` satisfies this
    /// requirement.
    fn accepts(&self, actual: &TensorAttr) -> bool {
        self.dtype == actual.dtype && self.format.accepts(actual.format)
    }
}

impl From<DataType> for TensorAttr {
    fn from(dtype: DataType) -> Self {
        TensorAttr::new(dtype, Format::Default)
    }
}

impl fmt::Display for TensorAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            Format::Default => write!(f, "{}", self.dtype),
            format => write!(f, "{}@{}", self.dtype, format),
        }
    }
}

fn fmt_signature(
    f: &mut fmt::Formatter<'_>,
    inputs: &[TensorAttr],
    outputs: &[TensorAttr],
    variadic: bool,
) -> fmt::Result {
    let join = |attrs: &[TensorAttr]| {
        let mut parts: Vec<String> = attrs.iter().map(|a| a.to_string()).collect();
        if variadic {
            parts.push("...".to_string());
        }
        parts.join(", ")
    };
    write!(f, "({}) -> ({})", join(inputs), join(outputs))
}

/// Data type signature supported by a kernel.
///
/// Matching against a [`NodeSignature`] is positional: the node must have
/// the same number of inputs and outputs, every data type must be equal and
/// every format must be equal or [`Format::Any`].
///
/// An "all same" attr declares one input and one output pattern which every
/// position of a variadic node must satisfy.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct KernelAttr {
    inputs: Vec<TensorAttr>,
    outputs: Vec<TensorAttr>,
    all_same: bool,
}

impl KernelAttr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an input with the default format.
    pub fn input(self, dtype: DataType) -> Self {
        self.input_with_format(dtype, Format::Default)
    }

    pub fn input_with_format(mut self, dtype: DataType, format: Format) -> Self {
        self.inputs.push(TensorAttr::new(dtype, format));
        self
    }

    /// Append an output with the default format.
    pub fn output(self, dtype: DataType) -> Self {
        self.output_with_format(dtype, Format::Default)
    }

    pub fn output_with_format(mut self, dtype: DataType, format: Format) -> Self {
        self.outputs.push(TensorAttr::new(dtype, format));
        self
    }

    /// Mark this attr as applying to every input and output of a variadic
    /// node. The attr should declare exactly one input and one output.
    pub fn all_same(mut self) -> Self {
        self.all_same = true;
        self
    }

    pub fn inputs(&self) -> &[TensorAttr] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorAttr] {
        &self.outputs
    }

    pub fn is_all_same(&self) -> bool {
        self.all_same
    }

    /// Return true if a node with signature `sig` can be executed by a kernel
    /// supporting this attr.
    pub fn matches(&self, sig: &NodeSignature) -> bool {
        if self.all_same {
            return match_all_same(&self.inputs, &sig.inputs)
                && match_all_same(&self.outputs, &sig.outputs);
        }

        self.inputs.len() == sig.inputs.len()
            && self.outputs.len() == sig.outputs.len()
            && self
                .inputs
                .iter()
                .zip(&sig.inputs)
                .chain(self.outputs.iter().zip(&sig.outputs))
                .all(|(expected, actual)| expected.accepts(actual))
    }
}

fn match_all_same(expected: &[TensorAttr], actual: &[TensorAttr]) -> bool {
    match expected {
        [] => actual.is_empty(),
        [pattern] => !actual.is_empty() && actual.iter().all(|a| pattern.accepts(a)),
        _ => false,
    }
}

impl fmt::Display for KernelAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_signature(f, &self.inputs, &self.outputs, self.all_same)
    }
}

/// Concrete data types and formats of a node's inputs and outputs.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct NodeSignature {
    pub inputs: Vec<TensorAttr>,
    pub outputs: Vec<TensorAttr>,
}

impl NodeSignature {
    pub fn new(inputs: Vec<TensorAttr>, outputs: Vec<TensorAttr>) -> Self {
        NodeSignature { inputs, outputs }
    }

    /// Create a signature where every tensor uses the default format.
    pub fn from_dtypes(inputs: &[DataType], outputs: &[DataType]) -> Self {
        NodeSignature {
            inputs: inputs.iter().copied().map(TensorAttr::from).collect(),
            outputs: outputs.iter().copied().map(TensorAttr::from).collect(),
        }
    }
}

impl fmt::Display for NodeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_signature(f, &self.inputs, &self.outputs, false)
    }
}

#[cfg(test)]
mod tests {
    use kernrt_testing::TestCases;

    use super::{KernelAttr, NodeSignature, TensorAttr};
    use crate::dtype::{DataType, Format};

    #[test]
    fn test_kernel_attr_matches() {
        #[derive(Debug)]
        struct Case {
            attr: KernelAttr,
            sig: NodeSignature,
            expected: bool,
        }

        let f32_add = KernelAttr::new()
            .input(DataType::Float32)
            .input(DataType::Float32)
            .output(DataType::Float32);
        let sig = |inputs: &[DataType], outputs: &[DataType]| {
            NodeSignature::from_dtypes(inputs, outputs)
        };
        let nchw = |dtype| TensorAttr::new(dtype, Format::Nchw);

        let cases = [
            // Exact match
            Case {
                attr: f32_add.clone(),
                sig: sig(
                    &[DataType::Float32, DataType::Float32],
                    &[DataType::Float32],
                ),
                expected: true,
            },
            // Type mismatch
            Case {
                attr: f32_add.clone(),
                sig: sig(&[DataType::Float32, DataType::Int32], &[DataType::Float32]),
                expected: false,
            },
            // Arity mismatch
            Case {
                attr: f32_add.clone(),
                sig: sig(&[DataType::Float32], &[DataType::Float32]),
                expected: false,
            },
            Case {
                attr: f32_add.clone(),
                sig: sig(
                    &[DataType::Float32, DataType::Float32],
                    &[DataType::Float32, DataType::Float32],
                ),
                expected: false,
            },
            // Format mismatch
            Case {
                attr: f32_add.clone(),
                sig: NodeSignature::new(
                    vec![nchw(DataType::Float32), DataType::Float32.into()],
                    vec![DataType::Float32.into()],
                ),
                expected: false,
            },
            // Wildcard format
            Case {
                attr: KernelAttr::new()
                    .input_with_format(DataType::Float32, Format::Any)
                    .output(DataType::Float32),
                sig: NodeSignature::new(
                    vec![nchw(DataType::Float32)],
                    vec![DataType::Float32.into()],
                ),
                expected: true,
            },
            // Empty attr only matches an empty signature
            Case {
                attr: KernelAttr::new(),
                sig: sig(&[], &[]),
                expected: true,
            },
        ];

        cases.test_each(|case| {
            assert_eq!(case.attr.matches(&case.sig), case.expected);
        });
    }

    #[test]
    fn test_all_same_attr() {
        let attr = KernelAttr::new()
            .input(DataType::Int64)
            .output(DataType::Int64)
            .all_same();
        let i64s = |n: usize| vec![DataType::Int64; n];

        assert!(attr.matches(&NodeSignature::from_dtypes(&i64s(1), &i64s(1))));
        assert!(attr.matches(&NodeSignature::from_dtypes(&i64s(5), &i64s(1))));
        assert!(!attr.matches(&NodeSignature::from_dtypes(&i64s(0), &i64s(1))));
        assert!(!attr.matches(&NodeSignature::from_dtypes(
            &[DataType::Int64, DataType::Int32],
            &i64s(1)
        )));
    }

    #[test]
    fn test_signature_display() {
        let attr = KernelAttr::new()
            .input_with_format(DataType::Float32, Format::Nhwc)
            .input(DataType::Int32)
            .output(DataType::Float32);
        assert_eq!(attr.to_string(), "(f32@NHWC, i32) -> (f32)");

        let attr = KernelAttr::new()
            .input(DataType::Float64)
            .output(DataType::Float64)
            .all_same();
        assert_eq!(attr.to_string(), "(f64, ...) -> (f64, ...)");

        let sig = NodeSignature::from_dtypes(&[DataType::UInt8], &[DataType::Bool]);
        assert_eq!(sig.to_string(), "(u8) -> (bool)");
    }
}
