//! Construction and destruction of element runs.
//!
//! All of these operate on raw slots; the callers own the bookkeeping of which
//! slots are live.

use core::{mem, ptr};

use crate::{raw_alloc::RawAlloc, utils::IsZST, value_source::ValueSource};

/// Whether destroying a `T` through `A` has any observable effect.
#[inline(always)]
pub(crate) const fn needs_destroy<T, A: RawAlloc>() -> bool {
    !A::PLAIN_CONSTRUCT || mem::needs_drop::<T>()
}

/// Destroys `count` live elements starting at `first`, highest index first.
///
/// # Safety
/// `first..first + count` are live elements that are not used afterwards.
pub(crate) unsafe fn destroy_range<T, A: RawAlloc>(alloc: &mut A, first: *mut T, count: usize) {
    if first.is_null() || !needs_destroy::<T, A>() {
        return;
    }
    let mut index = count;
    while index != 0 {
        index -= 1;
        unsafe { alloc.destroy(first.add(index)) };
    }
}

/// Constructs `count` values pulled from `values` at `dest`.
///
/// If producing or constructing element `i` panics, the elements `0..i` built by this
/// call are destroyed (in reverse order) before the panic continues, so `dest` is left
/// with no live elements.
///
/// # Safety
/// `dest` is valid for `count` writes and holds no live elements.
pub(crate) unsafe fn construct_range<T, A, V>(alloc: &mut A, dest: *mut T, values: &mut V, count: usize)
where
    A: RawAlloc,
    V: ValueSource<T>,
{
    if A::PLAIN_CONSTRUCT && unsafe { values.copy_flat(dest, count) } {
        return;
    }

    struct Partial<'a, T, A: RawAlloc> {
        alloc: &'a mut A,
        first: *mut T,
        done: usize,
    }

    impl<T, A: RawAlloc> Drop for Partial<'_, T, A> {
        fn drop(&mut self) {
            unsafe { destroy_range(&mut *self.alloc, self.first, self.done) };
        }
    }

    let mut partial = Partial {
        alloc,
        first: dest,
        done: 0,
    };
    while partial.done < count {
        let value = values.next_value();
        unsafe { partial.alloc.construct(dest.add(partial.done), value) };
        partial.done += 1;
    }
    mem::forget(partial);
}

/// Overwrites `count` live elements at `dest` with values pulled from `values`.
///
/// A panic leaves already overwritten slots with their new values.
///
/// # Safety
/// `dest..dest + count` are live elements.
pub(crate) unsafe fn assign_range<T, V: ValueSource<T>>(dest: *mut T, values: &mut V, count: usize) {
    for index in 0..count {
        values.assign_next(unsafe { &mut *dest.add(index) });
    }
}

/// Moves `count` elements from `src` to `dst` bitwise.
///
/// The source slots are logically uninitialized afterwards and must not be destroyed.
///
/// # Safety
/// - `src` holds `count` live elements.
/// - `dst` is valid for `count` writes and does not overlap `src`.
#[inline(always)]
pub(crate) unsafe fn relocate<T>(src: *const T, dst: *mut T, count: usize) {
    if !T::IS_ZST {
        unsafe { ptr::copy_nonoverlapping(src, dst, count) };
    }
}
