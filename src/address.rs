//! Non-owning views of device memory passed to kernels at launch.

use std::marker::PhantomData;
use std::ptr::NonNull;

use crate::dtype::Element;
use crate::error::AddressError;

/// Validate that `size` bytes at `addr` can be viewed as `[T]` and return the
/// element count.
fn typed_len<T>(addr: usize, size: usize) -> Result<usize, AddressError> {
    let elem_size = size_of::<T>();
    if size % elem_size != 0 {
        return Err(AddressError::SizeMismatch { size, elem_size });
    }
    let align = align_of::<T>();
    if addr % align != 0 {
        return Err(AddressError::Misaligned { addr, align });
    }
    Ok(size / elem_size)
}

/// A read-only region of device memory: a start pointer and a size in bytes.
///
/// Addresses never own or free the memory they refer to. The lifetime ties
/// the address to the allocation it was created from, so typed views cannot
/// outlive it.
#[derive(Copy, Clone, Debug)]
pub struct Address<'a> {
    ptr: NonNull<u8>,
    size: usize,
    _marker: PhantomData<&'a [u8]>,
}

// Safety: An `Address` behaves like `&[u8]`.
unsafe impl Send for Address<'_> {}
unsafe impl Sync for Address<'_> {}

impl<'a> Address<'a> {
    /// Create an address covering the elements of `data`.
    pub fn from_slice<T: Element>(data: &'a [T]) -> Self {
        Address {
            ptr: NonNull::from(data).cast(),
            size: size_of_val(data),
            _marker: PhantomData,
        }
    }

    /// Create an address of zero size.
    pub fn empty() -> Self {
        Address {
            ptr: NonNull::dangling(),
            size: 0,
            _marker: PhantomData,
        }
    }

    /// Create an address from a pointer and size supplied by an external
    /// memory manager.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and valid for reads of `size` bytes for the
    /// lifetime `'a`, and the memory must not be mutated during that time.
    pub unsafe fn from_raw_parts(ptr: *const u8, size: usize) -> Self {
        Address {
            ptr: NonNull::new(ptr as *mut u8).unwrap_or(NonNull::dangling()),
            size,
            _marker: PhantomData,
        }
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_ptr(&self) -> *const u8 {
        self.ptr.as_ptr()
    }

    /// View the region as a slice of `T`.
    ///
    /// Fails if the pointer is not aligned for `T` or the size is not a
    /// multiple of the element size.
    pub fn as_slice<T: Element>(&self) -> Result<&'a [T], AddressError> {
        if self.size == 0 {
            return Ok(&[]);
        }
        let len = typed_len::<T>(self.ptr.as_ptr() as usize, self.size)?;

        // Safety: The constructors guarantee the region is valid for reads of
        // `size` bytes for `'a`, the alignment and length were checked above
        // and `Element` types are valid for any bit pattern.
        Ok(unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const T, len) })
    }
}

/// A writable region of device memory.
///
/// Like [`Address`], but with exclusive access to the region for its
/// lifetime.
#[derive(Debug)]
pub struct AddressMut<'a> {
    ptr: NonNull<u8>,
    size: usize,
    _marker: PhantomData<&'a mut [u8]>,
}

// Safety: An `AddressMut` behaves like `&mut [u8]`.
unsafe impl Send for AddressMut<'_> {}
unsafe impl Sync for AddressMut<'_> {}

impl<'a> AddressMut<'a> {
    /// Create an address covering the elements of `data`.
    pub fn from_slice<T: Element>(data: &'a mut [T]) -> Self {
        AddressMut {
            size: size_of_val(data),
            ptr: NonNull::from(data).cast(),
            _marker: PhantomData,
        }
    }

    /// Create an address of zero size.
    pub fn empty() -> Self {
        AddressMut {
            ptr: NonNull::dangling(),
            size: 0,
            _marker: PhantomData,
        }
    }

    /// Create an address from a pointer and size supplied by an external
    /// memory manager.
    ///
    /// # Safety
    ///
    /// `ptr` must be non-null and valid for reads and writes of `size` bytes
    /// for the lifetime `'a`, and no other reference to the memory may be
    /// used during that time.
    pub unsafe fn from_raw_parts(ptr: *mut u8, size: usize) -> Self {
        AddressMut {
            ptr: NonNull::new(ptr).unwrap_or(NonNull::dangling()),
            size,
            _marker: PhantomData,
        }
    }

    /// Size of the region in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Return a shorter-lived read-only view of this region.
    pub fn as_address(&self) -> Address<'_> {
        Address {
            ptr: self.ptr,
            size: self.size,
            _marker: PhantomData,
        }
    }

    /// Reborrow this address for a shorter lifetime.
    pub fn reborrow(&mut self) -> AddressMut<'_> {
        AddressMut {
            ptr: self.ptr,
            size: self.size,
            _marker: PhantomData,
        }
    }

    /// View the region as a slice of `T`.
    pub fn as_slice<T: Element>(&self) -> Result<&[T], AddressError> {
        self.as_address().as_slice()
    }

    /// View the region as a mutable slice of `T`.
    ///
    /// Fails if the pointer is not aligned for `T` or the size is not a
    /// multiple of the element size.
    pub fn as_mut_slice<T: Element>(&mut self) -> Result<&mut [T], AddressError> {
        self.reborrow().into_mut_slice()
    }

    /// Convert into a mutable slice of `T` that lives as long as the
    /// underlying region.
    pub fn into_mut_slice<T: Element>(self) -> Result<&'a mut [T], AddressError> {
        if self.size == 0 {
            return Ok(&mut []);
        }
        let len = typed_len::<T>(self.ptr.as_ptr() as usize, self.size)?;

        // Safety: The constructors guarantee exclusive access to `size` valid
        // bytes for `'a`, alignment and length were checked above and
        // `Element` types are valid for any bit pattern.
        Ok(unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut T, len) })
    }
}

/// Check that an address is at least `required` bytes long.
pub(crate) fn check_size(size: usize, required: usize) -> Result<(), AddressError> {
    if size < required {
        Err(AddressError::TooSmall { size, required })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Address, AddressMut};
    use crate::error::AddressError;

    #[test]
    fn test_address_typed_view() {
        let data = [1.0f32, 2.0, 3.0];
        let addr = Address::from_slice(&data);
        assert_eq!(addr.size(), 12);
        assert_eq!(addr.as_slice::<f32>().unwrap(), &data);

        // Reinterpreting with a wider type requires a compatible size.
        assert_eq!(
            addr.as_slice::<f64>(),
            Err(AddressError::SizeMismatch {
                size: 12,
                elem_size: 8
            })
        );
        assert_eq!(addr.as_slice::<u16>().unwrap().len(), 6);
    }

    #[test]
    fn test_address_misaligned() {
        let data = [0u32; 4];
        let bytes = Address::from_slice(&data).as_slice::<u8>().unwrap();
        // Safety: `bytes[1..9]` is a valid region within `data`.
        let addr = unsafe { Address::from_raw_parts(bytes[1..].as_ptr(), 8) };
        assert!(matches!(
            addr.as_slice::<u32>(),
            Err(AddressError::Misaligned { align: 4, .. })
        ));
    }

    #[test]
    fn test_address_mut() {
        let mut data = [0i64; 4];
        let mut addr = AddressMut::from_slice(&mut data);
        addr.as_mut_slice::<i64>().unwrap()[2] = 7;
        assert_eq!(addr.as_slice::<i64>().unwrap(), &[0, 0, 7, 0]);
        let slice = addr.into_mut_slice::<i64>().unwrap();
        slice[0] = 1;
        assert_eq!(data, [1, 0, 7, 0]);
    }

    #[test]
    fn test_empty_address() {
        let addr = Address::empty();
        assert!(addr.is_empty());
        assert_eq!(addr.as_slice::<f64>().unwrap().len(), 0);

        let mut addr = AddressMut::empty();
        assert_eq!(addr.as_mut_slice::<u8>().unwrap().len(), 0);
    }
}
