//! Registry mapping operators and data type signatures to kernel factories.

use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::error::KernelError;
use crate::kernel::{Kernel, KernelInstance, NodeInfo};
use crate::kernel_attr::{KernelAttr, NodeSignature};

/// Kind of device a kernel executes on.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum DeviceKind {
    Cpu,
    Gpu,
    Npu,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::Cpu => "CPU",
            DeviceKind::Gpu => "GPU",
            DeviceKind::Npu => "NPU",
        };
        f.write_str(name)
    }
}

/// Function that creates a new, uninitialized kernel.
pub type KernelFactory = dyn Fn() -> Box<dyn Kernel> + Send + Sync;

/// A registered kernel: the signature it supports and how to create it.
pub struct KernelEntry {
    attr: KernelAttr,
    factory: Box<KernelFactory>,
}

impl KernelEntry {
    pub fn attr(&self) -> &KernelAttr {
        &self.attr
    }

    /// Create a new kernel instance in the `Created` state.
    pub fn create(&self) -> Box<dyn Kernel> {
        (self.factory)()
    }
}

impl fmt::Debug for KernelEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelEntry")
            .field("attr", &self.attr)
            .finish_non_exhaustive()
    }
}

/// Registry of kernels keyed by operator name and device.
///
/// For each operator and device, entries are kept in registration order and
/// [`lookup`](KernelRegistry::lookup) returns the first whose attr matches.
/// Registering an attr that is already present for the same operator and
/// device is rejected with a warning. Use
/// [`replace`](KernelRegistry::replace) to swap an existing implementation.
///
/// New registries are empty. [`KernelRegistry::with_cpu_kernels`] creates a
/// registry with the built-in CPU kernels and [`kernel_registry`] returns a
/// shared instance of it.
#[derive(Debug, Default)]
pub struct KernelRegistry {
    kernels: FxHashMap<(String, DeviceKind), Vec<KernelEntry>>,
}

impl KernelRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with all built-in CPU kernels registered.
    pub fn with_cpu_kernels() -> Self {
        let mut reg = Self::new();
        crate::ops::register_cpu_kernels(&mut reg);
        reg
    }

    /// Register a kernel factory for `op` on `device`.
    ///
    /// Returns false, leaving the existing entry in place, if an equal attr is
    /// already registered for this operator and device.
    pub fn register<F>(
        &mut self,
        op: &str,
        device: DeviceKind,
        attr: KernelAttr,
        factory: F,
    ) -> bool
    where
        F: Fn() -> Box<dyn Kernel> + Send + Sync + 'static,
    {
        let entries = self.kernels.entry((op.to_string(), device)).or_default();
        if entries.iter().any(|entry| entry.attr == attr) {
            tracing::warn!(op, %device, %attr, "ignoring duplicate kernel registration");
            return false;
        }
        entries.push(KernelEntry {
            attr,
            factory: Box::new(factory),
        });
        true
    }

    /// Replace the factory of an existing entry with an equal attr, keeping
    /// its position, or register a new entry if there is none.
    ///
    /// Returns true if an existing entry was replaced.
    pub fn replace<F>(
        &mut self,
        op: &str,
        device: DeviceKind,
        attr: KernelAttr,
        factory: F,
    ) -> bool
    where
        F: Fn() -> Box<dyn Kernel> + Send + Sync + 'static,
    {
        let entries = self.kernels.entry((op.to_string(), device)).or_default();
        if let Some(entry) = entries.iter_mut().find(|entry| entry.attr == attr) {
            entry.factory = Box::new(factory);
            true
        } else {
            entries.push(KernelEntry {
                attr,
                factory: Box::new(factory),
            });
            false
        }
    }

    fn entries(&self, op: &str, device: DeviceKind) -> &[KernelEntry] {
        self.kernels
            .get(&(op.to_string(), device))
            .map(|entries| entries.as_slice())
            .unwrap_or(&[])
    }

    /// Find the first kernel for `op` on `device` that supports `sig`.
    pub fn lookup(
        &self,
        op: &str,
        device: DeviceKind,
        sig: &NodeSignature,
    ) -> Result<&KernelEntry, KernelError> {
        let entries = self.entries(op, device);
        entries
            .iter()
            .find(|entry| entry.attr.matches(sig))
            .ok_or_else(|| KernelError::NotFound {
                op: op.to_string(),
                device,
                signature: sig.to_string(),
                supported: entries.iter().map(|e| e.attr.to_string()).collect(),
            })
    }

    /// Return the attrs registered for `op` on `device`, in lookup order.
    pub fn supported_attrs(&self, op: &str, device: DeviceKind) -> Vec<&KernelAttr> {
        self.entries(op, device).iter().map(|e| &e.attr).collect()
    }

    /// Return the sorted names of operators with kernels for `device`.
    pub fn ops(&self, device: DeviceKind) -> Vec<&str> {
        let mut ops: Vec<&str> = self
            .kernels
            .keys()
            .filter(|(_, dev)| *dev == device)
            .map(|(op, _)| op.as_str())
            .collect();
        ops.sort_unstable();
        ops
    }

    /// Total number of registered kernels.
    pub fn len(&self) -> usize {
        self.kernels.values().map(|entries| entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Select a kernel for `node`, then initialize and size it using the
    /// node's static input shapes.
    pub fn build(&self, device: DeviceKind, node: &NodeInfo) -> Result<KernelInstance, KernelError> {
        let entry = self.lookup(&node.op, device, &node.signature())?;
        tracing::debug!(
            op = node.op.as_str(),
            node = node.name.as_str(),
            %device,
            attr = %entry.attr,
            "selected kernel"
        );

        let mut kernel = KernelInstance::new(entry.create());
        kernel.init(node)?;
        kernel.resize(&node.input_shapes())?;
        Ok(kernel)
    }
}

/// Return the process-wide registry of built-in CPU kernels.
///
/// The registry is built on first use and is read-only afterwards.
pub fn kernel_registry() -> &'static KernelRegistry {
    static REGISTRY: OnceLock<KernelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(KernelRegistry::with_cpu_kernels)
}
