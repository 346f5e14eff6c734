//! kernrt is the kernel dispatch and execution core of a tensor compiler
//! runtime.
//!
//! Given an operator node of a compiled graph, kernrt selects a kernel whose
//! declared type signature matches the node, sizes it for the node's shapes
//! and executes it against memory addresses supplied by the caller.
//!
//! # Dispatch workflow
//!
//! 1. Build a [`KernelRegistry`], or use the shared registry of built-in CPU
//!    kernels returned by [`kernel_registry`].
//! 2. Describe the node with a [`NodeInfo`]: operator name, input and output
//!    data types and shapes, and attributes.
//! 3. Call [`KernelRegistry::build`] to select a kernel and take it through
//!    `init` and `resize`. This fails with [`KernelError::NotFound`] if no
//!    registered signature matches.
//! 4. Allocate buffers of at least the sizes reported by
//!    [`KernelInstance::sizes`] and call [`KernelInstance::launch`] with
//!    their [`Address`]es.
//!
//! Kernels never refer back to a graph. Everything they need is passed in
//! explicitly.
//!
//! ## Threading
//!
//! CPU kernels split their work across a process-wide Rayon pool provided by
//! the [`kernrt_parallel`] crate. The pool is sized from the
//! `KERNRT_NUM_THREADS` environment variable, falling back to the number of
//! physical cores. Element-wise kernels can tune their block size at runtime
//! using auto-search, which is controlled by `KERNRT_AUTO_SEARCH`.
//!
//! ## Logging
//!
//! kernrt emits [`tracing`] events for kernel selection, registry conflicts
//! and auto-search decisions. It does not install a subscriber.

mod address;
mod dtype;
mod error;
mod kernel;
mod kernel_attr;
mod memory;
mod number;
mod registry;
mod sparse;

/// CPU kernel implementations.
pub mod ops;

pub use address::{Address, AddressMut};
pub use dtype::{DataType, DataTypeOf, Element, Format};
pub use error::{AddressError, ErrorKind, KernelError, SparseGradientError};
pub use kernel::{
    AttrValue, Kernel, KernelInstance, KernelState, LaunchSizes, NodeInfo, Shape, TensorInfo,
    num_elements,
};
pub use kernel_attr::{KernelAttr, NodeSignature, TensorAttr};
pub use memory::{BUFFER_ALIGN, DeviceBuffer, MemoryPool};
pub use number::{CastFrom, Float, Number};
pub use registry::{DeviceKind, KernelEntry, KernelFactory, KernelRegistry, kernel_registry};
pub use sparse::{SparseGradient, SparseIndex, reduce_sparse_gradient, reduce_sparse_gradient_par};

/// Parallel launch primitives used by the CPU kernels.
pub use kernrt_parallel as parallel;
