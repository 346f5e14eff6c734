//! Owned host allocations for kernel inputs, outputs and workspaces.
//!
//! The core does not manage device memory itself: executors pass
//! [`Address`]es they obtained from their own memory manager. The types here
//! serve simple host executors and tests.

use std::alloc::Layout;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::address::{Address, AddressMut};
use crate::dtype::Element;
use crate::error::AddressError;

/// Alignment of [`DeviceBuffer`] allocations. This is sufficient for every
/// [`Element`] type and for SIMD loads.
pub const BUFFER_ALIGN: usize = 64;

/// A zero-initialized, 64-byte aligned host allocation.
pub struct DeviceBuffer {
    ptr: NonNull<u8>,

    /// Size visible through addresses and typed views.
    size: usize,

    /// Size of the allocation, which may exceed `size` for buffers recycled
    /// by a [`MemoryPool`].
    capacity: usize,
}

// Safety: `DeviceBuffer` uniquely owns its allocation and only hands out
// access through `&self` / `&mut self`.
unsafe impl Send for DeviceBuffer {}
unsafe impl Sync for DeviceBuffer {}

fn buffer_layout(capacity: usize) -> Result<Layout, AddressError> {
    Layout::from_size_align(capacity, BUFFER_ALIGN)
        .map_err(|_| AddressError::TooLarge { size: capacity })
}

impl DeviceBuffer {
    /// Allocate a zero-filled buffer of `size` bytes.
    ///
    /// Fails if `size` exceeds the largest possible allocation.
    pub fn zeroed(size: usize) -> Result<Self, AddressError> {
        if size == 0 {
            return Ok(Self::empty());
        }

        let layout = buffer_layout(size)?;
        // Safety: `layout` has non-zero size.
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            std::alloc::handle_alloc_error(layout);
        };
        Ok(DeviceBuffer {
            ptr,
            size,
            capacity: size,
        })
    }

    /// Return a buffer of zero size, which owns no allocation.
    pub fn empty() -> Self {
        DeviceBuffer {
            ptr: NonNull::dangling(),
            size: 0,
            capacity: 0,
        }
    }

    /// Allocate a buffer of `len` zeroed elements of type `T`.
    pub fn zeroed_elems<T: Element>(len: usize) -> Result<Self, AddressError> {
        let size = len
            .checked_mul(size_of::<T>())
            .ok_or(AddressError::TooLarge { size: usize::MAX })?;
        Self::zeroed(size)
    }

    /// Allocate a buffer containing a copy of `data`.
    pub fn from_slice<T: Element>(data: &[T]) -> Result<Self, AddressError> {
        let mut buf = Self::zeroed(size_of_val(data))?;
        buf.bytes_mut()
            .copy_from_slice(Address::from_slice(data).as_slice::<u8>()?);
        Ok(buf)
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // Safety: The allocation holds at least `size` initialized bytes.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Return a read-only address for the buffer contents.
    pub fn address(&self) -> Address<'_> {
        // Safety: The allocation is valid for `size` bytes while `self` is
        // borrowed.
        unsafe { Address::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    /// Return a writable address for the buffer contents.
    pub fn address_mut(&mut self) -> AddressMut<'_> {
        // Safety: The allocation is valid for `size` bytes and `self` is
        // exclusively borrowed.
        unsafe { AddressMut::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_slice<T: Element>(&self) -> Result<&[T], AddressError> {
        self.address().as_slice()
    }

    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T], AddressError> {
        self.address_mut().into_mut_slice()
    }

    /// Copy the buffer contents into a `Vec<T>`.
    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, AddressError> {
        self.as_slice().map(|s| s.to_vec())
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        if self.capacity > 0 {
            // Safety: The pointer was allocated in `zeroed` with this layout,
            // which was validated then.
            unsafe {
                let layout = Layout::from_size_align_unchecked(self.capacity, BUFFER_ALIGN);
                std::alloc::dealloc(self.ptr.as_ptr(), layout)
            }
        }
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// A pool of [`DeviceBuffer`]s that can be reused across launches.
///
/// Buffers are only recycled when returned to the pool with
/// [`add`](MemoryPool::add). Allocations reuse the smallest pooled buffer
/// that is large enough, zeroing it first, and otherwise fall back to a new
/// allocation.
#[derive(Default)]
pub struct MemoryPool {
    buffers: Mutex<Vec<DeviceBuffer>>,

    /// Number of allocation requests received.
    alloc_count: AtomicUsize,

    /// Number of allocation requests fulfilled from the pool.
    hit_count: AtomicUsize,
}

impl MemoryPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a zeroed buffer of `size` bytes.
    pub fn alloc(&self, size: usize) -> Result<DeviceBuffer, AddressError> {
        self.alloc_count.fetch_add(1, Ordering::AcqRel);

        let reused = {
            let mut buffers = self.buffers.lock().unwrap_or_else(|err| err.into_inner());
            let best = buffers
                .iter()
                .enumerate()
                .filter(|(_, buf)| buf.capacity >= size)
                .min_by_key(|(_, buf)| buf.capacity)
                .map(|(idx, _)| idx);
            best.map(|idx| buffers.swap_remove(idx))
        };

        match reused {
            Some(mut buf) if size > 0 => {
                self.hit_count.fetch_add(1, Ordering::AcqRel);
                buf.size = size;
                buf.bytes_mut().fill(0);
                Ok(buf)
            }
            // Don't spend a pooled buffer on an empty allocation.
            Some(buf) => {
                self.add(buf);
                Ok(DeviceBuffer::empty())
            }
            None => DeviceBuffer::zeroed(size),
        }
    }

    /// Return a buffer to the pool for future allocations.
    pub fn add(&self, buf: DeviceBuffer) {
        if buf.capacity == 0 {
            return;
        }
        self.buffers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .push(buf);
    }

    /// Number of buffers currently in the pool.
    pub fn len(&self) -> usize {
        self.buffers
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of allocation requests received.
    pub fn alloc_count(&self) -> usize {
        self.alloc_count.load(Ordering::Acquire)
    }

    /// Number of allocation requests satisfied from the pool.
    pub fn hit_count(&self) -> usize {
        self.hit_count.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::{BUFFER_ALIGN, DeviceBuffer, MemoryPool};
    use crate::error::AddressError;

    #[test]
    fn test_device_buffer_zeroed() {
        let buf = DeviceBuffer::zeroed_elems::<f32>(10).unwrap();
        assert_eq!(buf.size(), 40);
        assert_eq!(buf.address().as_ptr() as usize % BUFFER_ALIGN, 0);
        assert_eq!(buf.to_vec::<f32>().unwrap(), vec![0.; 10]);
    }

    #[test]
    fn test_device_buffer_from_slice() {
        let mut buf = DeviceBuffer::from_slice(&[1i32, 2, 3]).unwrap();
        buf.as_mut_slice::<i32>().unwrap()[1] = 5;
        assert_eq!(buf.to_vec::<i32>().unwrap(), [1, 5, 3]);

        let empty = DeviceBuffer::from_slice::<f64>(&[]).unwrap();
        assert!(empty.is_empty());
        assert!(empty.to_vec::<f64>().unwrap().is_empty());
    }

    #[test]
    fn test_memory_pool_reuse() {
        let pool = MemoryPool::new();

        let mut buf = pool.alloc(64).unwrap();
        buf.as_mut_slice::<u8>().unwrap().fill(0xff);
        pool.add(buf);
        assert_eq!(pool.len(), 1);

        // Smaller request reuses the pooled buffer and sees zeroed memory.
        let buf = pool.alloc(16).unwrap();
        assert_eq!(buf.size(), 16);
        assert!(buf.as_slice::<u8>().unwrap().iter().all(|&b| b == 0));
        assert_eq!(pool.hit_count(), 1);
        assert!(pool.is_empty());

        // Larger request can't be satisfied from the pool.
        pool.add(buf);
        let big = pool.alloc(128).unwrap();
        assert_eq!(big.size(), 128);
        assert_eq!(pool.hit_count(), 1);
        assert_eq!(pool.alloc_count(), 3);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_oversized_allocation_fails() {
        let err = DeviceBuffer::zeroed(usize::MAX).unwrap_err();
        assert_eq!(err, AddressError::TooLarge { size: usize::MAX });

        assert!(DeviceBuffer::zeroed_elems::<f64>(usize::MAX / 4).is_err());

        let pool = MemoryPool::new();
        assert!(pool.alloc(isize::MAX as usize).is_err());
        assert_eq!(pool.alloc_count(), 1);
        assert_eq!(pool.hit_count(), 0);
    }
}
