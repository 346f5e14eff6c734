//! The [`Kernel`] trait and the lifecycle wrapper that enforces its call
//! order.

use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::address::{Address, AddressMut, check_size};
use crate::dtype::{DataType, Format};
use crate::error::{AddressError, KernelError};
use crate::kernel_attr::{NodeSignature, TensorAttr};

/// Dimension sizes of a tensor.
pub type Shape = SmallVec<[usize; 4]>;

/// Return the number of elements in a tensor with the given shape.
pub fn num_elements(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Value of a node attribute.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Ints(Vec<i64>),
    Str(String),
}

impl AttrValue {
    fn type_name(&self) -> &'static str {
        match self {
            AttrValue::Int(_) => "int",
            AttrValue::Float(_) => "float",
            AttrValue::Bool(_) => "bool",
            AttrValue::Ints(_) => "ints",
            AttrValue::Str(_) => "string",
        }
    }
}

macro_rules! impl_attr_value_from {
    ($type:ty, $variant:ident) => {
        impl From<$type> for AttrValue {
            fn from(val: $type) -> Self {
                AttrValue::$variant(val.into())
            }
        }
    };
}

impl_attr_value_from!(i64, Int);
impl_attr_value_from!(i32, Int);
impl_attr_value_from!(f64, Float);
impl_attr_value_from!(f32, Float);
impl_attr_value_from!(bool, Bool);
impl_attr_value_from!(Vec<i64>, Ints);
impl_attr_value_from!(String, Str);
impl_attr_value_from!(&str, Str);

/// Static information about a node input or output.
#[derive(Clone, Debug, PartialEq)]
pub struct TensorInfo {
    pub dtype: DataType,
    pub format: Format,
    pub shape: Shape,
}

impl TensorInfo {
    pub fn new(dtype: DataType, shape: &[usize]) -> Self {
        TensorInfo {
            dtype,
            format: Format::Default,
            shape: shape.into(),
        }
    }

    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    fn attr(&self) -> TensorAttr {
        TensorAttr::new(self.dtype, self.format)
    }
}

/// Description of a graph node, passed to [`Kernel::init`].
///
/// This holds everything a kernel needs to know about the node, so kernels
/// never refer back to the graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeInfo {
    /// Operator name, eg. "Add".
    pub op: String,

    /// Name of the node, used in diagnostics.
    pub name: String,

    pub inputs: Vec<TensorInfo>,
    pub outputs: Vec<TensorInfo>,
    pub attrs: FxHashMap<String, AttrValue>,
}

impl NodeInfo {
    pub fn new(op: &str) -> Self {
        NodeInfo {
            op: op.to_string(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Append an input with the default format.
    pub fn input(mut self, dtype: DataType, shape: &[usize]) -> Self {
        self.inputs.push(TensorInfo::new(dtype, shape));
        self
    }

    pub fn input_info(mut self, info: TensorInfo) -> Self {
        self.inputs.push(info);
        self
    }

    /// Append an output with the default format.
    pub fn output(mut self, dtype: DataType, shape: &[usize]) -> Self {
        self.outputs.push(TensorInfo::new(dtype, shape));
        self
    }

    pub fn output_info(mut self, info: TensorInfo) -> Self {
        self.outputs.push(info);
        self
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.to_string(), value.into());
        self
    }

    /// Return the data type signature of this node.
    pub fn signature(&self) -> NodeSignature {
        NodeSignature::new(
            self.inputs.iter().map(TensorInfo::attr).collect(),
            self.outputs.iter().map(TensorInfo::attr).collect(),
        )
    }

    /// Return the shapes of the node's inputs.
    pub fn input_shapes(&self) -> Vec<Shape> {
        self.inputs.iter().map(|info| info.shape.clone()).collect()
    }

    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }

    fn wrong_attr_type(&self, name: &str, expected: &str, actual: &AttrValue) -> KernelError {
        KernelError::invalid_attr(
            &self.op,
            name,
            format!("expected {} but found {}", expected, actual.type_name()),
        )
    }

    /// Return an integer attribute, or `default` if it is not set.
    pub fn int_attr(&self, name: &str, default: i64) -> Result<i64, KernelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(AttrValue::Int(val)) => Ok(*val),
            Some(other) => Err(self.wrong_attr_type(name, "int", other)),
        }
    }

    /// Return a float attribute, or `default` if it is not set. Integer
    /// values are converted.
    pub fn float_attr(&self, name: &str, default: f64) -> Result<f64, KernelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(AttrValue::Float(val)) => Ok(*val),
            Some(AttrValue::Int(val)) => Ok(*val as f64),
            Some(other) => Err(self.wrong_attr_type(name, "float", other)),
        }
    }

    /// Return a boolean attribute, or `default` if it is not set.
    pub fn bool_attr(&self, name: &str, default: bool) -> Result<bool, KernelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(AttrValue::Bool(val)) => Ok(*val),
            Some(AttrValue::Int(val)) => Ok(*val != 0),
            Some(other) => Err(self.wrong_attr_type(name, "bool", other)),
        }
    }

    /// Return an integer list attribute. A single integer is treated as a
    /// list of length one.
    pub fn ints_attr(&self, name: &str) -> Result<Option<Vec<i64>>, KernelError> {
        match self.attr(name) {
            None => Ok(None),
            Some(AttrValue::Ints(vals)) => Ok(Some(vals.clone())),
            Some(AttrValue::Int(val)) => Ok(Some(vec![*val])),
            Some(other) => Err(self.wrong_attr_type(name, "ints", other)),
        }
    }

    /// Return a string attribute, or `default` if it is not set.
    pub fn str_attr<'a>(&'a self, name: &str, default: &'a str) -> Result<&'a str, KernelError> {
        match self.attr(name) {
            None => Ok(default),
            Some(AttrValue::Str(val)) => Ok(val),
            Some(other) => Err(self.wrong_attr_type(name, "string", other)),
        }
    }

    /// Check the node has `inputs` inputs and `outputs` outputs.
    pub fn check_arity(&self, inputs: usize, outputs: usize) -> Result<(), KernelError> {
        if self.inputs.len() != inputs {
            return Err(KernelError::wrong_arity(
                &self.op,
                "inputs",
                inputs,
                self.inputs.len(),
            ));
        }
        if self.outputs.len() != outputs {
            return Err(KernelError::wrong_arity(
                &self.op,
                "outputs",
                outputs,
                self.outputs.len(),
            ));
        }
        Ok(())
    }

    /// Check the node's input and output data types against the ones a
    /// kernel was instantiated for.
    ///
    /// Entries beyond the end of `inputs` or `outputs` are not checked.
    pub fn check_dtypes(
        &self,
        inputs: &[DataType],
        outputs: &[DataType],
    ) -> Result<(), KernelError> {
        let actual = self.inputs.iter().zip(inputs);
        let actual = actual.chain(self.outputs.iter().zip(outputs));
        for (info, &expected) in actual {
            if info.dtype != expected {
                return Err(KernelError::UnsupportedType {
                    op: self.op.clone(),
                    dtype: info.dtype,
                });
            }
        }
        Ok(())
    }
}

/// Byte sizes of the buffers a kernel needs at launch, as computed by
/// [`Kernel::resize`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LaunchSizes {
    /// Minimum size of each input address.
    pub inputs: Vec<usize>,

    /// Minimum size of each output address.
    pub outputs: Vec<usize>,

    /// Size of each scratch buffer.
    pub workspace: Vec<usize>,

    /// Shape of each output. For outputs whose length depends on input
    /// values this is the maximum shape.
    pub output_shapes: Vec<Shape>,
}

impl LaunchSizes {
    /// Compute sizes from input shapes, output shapes and their element
    /// types.
    pub fn from_shapes(
        inputs: &[(&[usize], DataType)],
        outputs: &[(Shape, DataType)],
    ) -> Self {
        LaunchSizes {
            inputs: inputs
                .iter()
                .map(|(shape, dtype)| num_elements(shape) * dtype.size())
                .collect(),
            outputs: outputs
                .iter()
                .map(|(shape, dtype)| num_elements(shape) * dtype.size())
                .collect(),
            workspace: Vec::new(),
            output_shapes: outputs.iter().map(|(shape, _)| shape.clone()).collect(),
        }
    }

    pub fn with_workspace(mut self, workspace: Vec<usize>) -> Self {
        self.workspace = workspace;
        self
    }
}

/// Execution unit for one operator and data type combination.
///
/// Kernels are created by the [`KernelRegistry`](crate::KernelRegistry) and
/// driven through [`KernelInstance`], which enforces the call order
/// `init -> resize -> launch`. `resize` may be called again whenever input
/// shapes change.
pub trait Kernel: fmt::Debug + Send {
    /// Name of the operator this kernel implements.
    fn name(&self) -> &str;

    /// Validate the node and compute values that are fixed at compile time
    /// (eg. normalized axes).
    fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError>;

    /// Compute shape-dependent sizes for the given input shapes. This must
    /// fully replace the result of any previous call.
    fn resize(&mut self, input_shapes: &[Shape]) -> Result<(), KernelError>;

    /// Return the sizes computed by the last successful `resize`.
    fn sizes(&self) -> &LaunchSizes;

    /// Execute the kernel.
    ///
    /// The addresses are only valid for the duration of the call. Each is at
    /// least as large as the corresponding entry of [`sizes`](Kernel::sizes),
    /// except for inputs that alias a [reference output](Kernel::ref_outputs).
    fn launch(
        &mut self,
        inputs: &[Address],
        workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError>;

    /// Return the actual output shapes of the last launch, for kernels whose
    /// output length depends on input values.
    fn realized_output_shapes(&self) -> Option<&[Shape]> {
        None
    }

    /// Return `(input, output)` index pairs for outputs that update an
    /// input's buffer in place.
    ///
    /// The executor binds the state buffer to the output address. The
    /// corresponding input address may be empty and the kernel reads the
    /// current state from the output.
    fn ref_outputs(&self) -> &[(usize, usize)] {
        &[]
    }
}

/// Lifecycle state of a [`KernelInstance`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum KernelState {
    Created,
    Initialized,

    /// Sizes are known. The kernel can be launched.
    Resized,
}

/// A [`Kernel`] together with its lifecycle state.
#[derive(Debug)]
pub struct KernelInstance {
    kernel: Box<dyn Kernel>,
    state: KernelState,
}

impl KernelInstance {
    pub fn new(kernel: Box<dyn Kernel>) -> Self {
        KernelInstance {
            kernel,
            state: KernelState::Created,
        }
    }

    pub fn name(&self) -> &str {
        self.kernel.name()
    }

    pub fn state(&self) -> KernelState {
        self.state
    }

    fn invalid_state(&self, action: &'static str) -> KernelError {
        KernelError::InvalidState {
            op: self.name().to_string(),
            action,
            state: self.state,
        }
    }

    pub fn init(&mut self, node: &NodeInfo) -> Result<(), KernelError> {
        if self.state != KernelState::Created {
            return Err(self.invalid_state("initialize"));
        }
        self.kernel.init(node)?;
        self.state = KernelState::Initialized;
        Ok(())
    }

    /// Size the kernel for new input shapes. On failure the kernel must be
    /// resized again before it can be launched.
    pub fn resize(&mut self, input_shapes: &[Shape]) -> Result<(), KernelError> {
        if self.state == KernelState::Created {
            return Err(self.invalid_state("resize"));
        }
        match self.kernel.resize(input_shapes) {
            Ok(()) => {
                self.state = KernelState::Resized;
                tracing::trace!(op = self.name(), sizes = ?self.kernel.sizes(), "resized kernel");
                Ok(())
            }
            Err(err) => {
                self.state = KernelState::Initialized;
                Err(err)
            }
        }
    }

    /// Return the sizes computed by the last successful resize.
    pub fn sizes(&self) -> Result<&LaunchSizes, KernelError> {
        if self.state != KernelState::Resized {
            return Err(self.invalid_state("query sizes of"));
        }
        Ok(self.kernel.sizes())
    }

    pub fn realized_output_shapes(&self) -> Option<&[Shape]> {
        self.kernel.realized_output_shapes()
    }

    pub fn ref_outputs(&self) -> &[(usize, usize)] {
        self.kernel.ref_outputs()
    }

    /// Validate the bound addresses against the kernel's sizes and execute
    /// it.
    pub fn launch(
        &mut self,
        inputs: &[Address],
        workspace: &mut [AddressMut],
        outputs: &mut [AddressMut],
    ) -> Result<(), KernelError> {
        if self.state != KernelState::Resized {
            return Err(self.invalid_state("launch"));
        }
        self.check_addresses(inputs, workspace, outputs)?;
        self.kernel.launch(inputs, workspace, outputs)
    }

    fn check_addresses(
        &self,
        inputs: &[Address],
        workspace: &[AddressMut],
        outputs: &[AddressMut],
    ) -> Result<(), KernelError> {
        let op = self.name();
        let sizes = self.kernel.sizes();
        let ref_inputs: SmallVec<[usize; 4]> =
            self.ref_outputs().iter().map(|&(input, _)| input).collect();

        let check_count = |what, expected: usize, actual: usize| {
            if expected != actual {
                Err(KernelError::wrong_arity(op, what, expected, actual))
            } else {
                Ok(())
            }
        };
        check_count("input addresses", sizes.inputs.len(), inputs.len())?;
        check_count("workspace addresses", sizes.workspace.len(), workspace.len())?;
        check_count("output addresses", sizes.outputs.len(), outputs.len())?;

        let wrap = |role, index| {
            move |source: AddressError| KernelError::Address {
                op: op.to_string(),
                role,
                index,
                source,
            }
        };

        for (index, (addr, &required)) in inputs.iter().zip(&sizes.inputs).enumerate() {
            if addr.is_empty() && ref_inputs.contains(&index) {
                continue;
            }
            check_size(addr.size(), required).map_err(wrap("input", index))?;
        }
        for (index, (addr, &required)) in workspace.iter().zip(&sizes.workspace).enumerate() {
            check_size(addr.size(), required).map_err(wrap("workspace", index))?;
        }
        for (index, (addr, &required)) in outputs.iter().zip(&sizes.outputs).enumerate() {
            check_size(addr.size(), required).map_err(wrap("output", index))?;
        }
        Ok(())
    }
}
