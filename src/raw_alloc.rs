//! Allocator strategies used by [`Storage`](crate::Storage) for its heap buffer.
//!
//! The storage never touches raw memory or runs element constructors/destructors
//! without going through one of the four [`RawAlloc`] operations.

use alloc::alloc::{Layout, alloc, dealloc};
use core::ptr::{self, NonNull};

use crate::StorageError;

/// An allocation strategy for arrays of `T`.
///
/// Carried by value inside a [`Storage`](crate::Storage), swapped together with the
/// buffer it allocated.
///
/// # Safety
///
/// - `allocate::<T>(count)` must return a block valid for `count` values of `T`
///   (a dangling, well aligned pointer is fine when the byte size is zero).
/// - `deallocate` must accept every block returned by `allocate` with the same `count`.
/// - `PLAIN_CONSTRUCT` may only be `true` when `construct` and `destroy` keep their
///   default behavior. The storage then copies `Copy` elements as flat bytes and skips
///   destruction of types without drop glue.
pub unsafe trait RawAlloc {
    /// `true` when `construct`/`destroy` are the plain write/drop defaults.
    const PLAIN_CONSTRUCT: bool = false;

    /// Allocates an uninitialized block for `count` values of `T`.
    fn allocate<T>(&mut self, count: usize) -> Result<NonNull<T>, StorageError>;

    /// Releases a block previously obtained from [`RawAlloc::allocate`].
    ///
    /// # Safety
    /// `ptr` was returned by `allocate::<T>(count)` on this allocator (or one it was
    /// swapped with) and has not been released yet.
    unsafe fn deallocate<T>(&mut self, ptr: NonNull<T>, count: usize);

    /// Constructs `value` into the uninitialized `slot`.
    ///
    /// # Safety
    /// `slot` is valid for writes and holds no live value.
    #[inline(always)]
    unsafe fn construct<T>(&mut self, slot: *mut T, value: T) {
        unsafe { ptr::write(slot, value) }
    }

    /// Destroys the live value in `slot`.
    ///
    /// # Safety
    /// `slot` holds a live value which is not used afterwards.
    #[inline(always)]
    unsafe fn destroy<T>(&mut self, slot: *mut T) {
        unsafe { ptr::drop_in_place(slot) }
    }
}

/// Layout of `count` consecutive values of `T`.
#[inline]
pub fn array_layout<T>(count: usize) -> Result<Layout, StorageError> {
    Layout::array::<T>(count).map_err(|_| StorageError::CapacityOverflow)
}

/// The global allocator of the `alloc` crate.
///
/// This is the default strategy and the only one that enables the flat copy path.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Global;

unsafe impl RawAlloc for Global {
    const PLAIN_CONSTRUCT: bool = true;

    #[inline]
    fn allocate<T>(&mut self, count: usize) -> Result<NonNull<T>, StorageError> {
        let layout = array_layout::<T>(count)?;
        if layout.size() == 0 {
            return Ok(NonNull::dangling());
        }
        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc(layout) };
        NonNull::new(ptr.cast::<T>()).ok_or(StorageError::AllocError { layout })
    }

    #[inline]
    unsafe fn deallocate<T>(&mut self, ptr: NonNull<T>, count: usize) {
        // SAFETY: the same layout was validated by `allocate`.
        let layout = unsafe {
            Layout::from_size_align_unchecked(size_of::<T>() * count, align_of::<T>())
        };
        if layout.size() != 0 {
            unsafe { dealloc(ptr.as_ptr().cast::<u8>(), layout) }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_round_trip() {
        let mut global = Global;
        let ptr = global.allocate::<u64>(16).unwrap();
        unsafe {
            for i in 0..16 {
                global.construct(ptr.as_ptr().add(i), i as u64);
            }
            assert_eq!(*ptr.as_ptr().add(15), 15);
            global.deallocate(ptr, 16);
        }
    }

    #[test]
    fn zero_sized_requests_do_not_allocate() {
        let mut global = Global;
        let ptr = global.allocate::<()>(1000).unwrap();
        assert_eq!(ptr, NonNull::dangling());
        unsafe { global.deallocate(ptr, 1000) };

        let ptr = global.allocate::<u32>(0).unwrap();
        assert_eq!(ptr, NonNull::dangling());
    }

    #[test]
    fn oversized_request_is_overflow() {
        assert_eq!(
            Global.allocate::<u64>(usize::MAX / 2),
            Err(StorageError::CapacityOverflow)
        );
    }
}
