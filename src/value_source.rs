//! Sources of values used to populate storage slots.
//!
//! Every populating operation of [`Storage`](crate::Storage) pulls its values from a
//! [`ValueSource`], so the same engine code serves clones of one element, copies or
//! moves out of a range, and default construction.
//!
//! ```
//! use spillvec::{Storage, value_source::{CloneSlice, CopyValue, DefaultValue}};
//!
//! let words = ["a".to_string(), "b".to_string()];
//! let mut vec: Storage<String, 4> = Storage::from_source(CloneSlice::new(&words), 2);
//!
//! let filler = "z".to_string();
//! vec.resize_from(CopyValue::new(&filler), 3);
//! vec.insert_from(0, DefaultValue, 1);
//!
//! assert_eq!(vec, ["", "a", "b", "z"]);
//! ```

use core::{ptr, slice};

/// Yields the next value to construct or assign into a slot.
///
/// The storage asks for exactly as many values as the count passed alongside the
/// source; running out earlier is a caller bug and panics.
pub trait ValueSource<T> {
    /// Produces the next value.
    fn next_value(&mut self) -> T;

    /// Overwrites a live element with the next value.
    #[inline]
    fn assign_next(&mut self, slot: &mut T) {
        *slot = self.next_value();
    }

    /// Copies the next `count` values into `dst` as flat bytes, if this source can.
    ///
    /// Returns `false` (the default) when the source has to go element by element.
    ///
    /// # Safety
    /// `dst` is valid for `count` writes and holds no live values.
    #[inline(always)]
    unsafe fn copy_flat(&mut self, dst: *mut T, count: usize) -> bool {
        let _ = (dst, count);
        false
    }
}

/// Clones of one existing element.
#[derive(Debug)]
pub struct CopyValue<'a, T>(&'a T);

impl<'a, T> CopyValue<'a, T> {
    #[inline]
    pub const fn new(value: &'a T) -> Self {
        Self(value)
    }
}

impl<T: Clone> ValueSource<T> for CopyValue<'_, T> {
    #[inline]
    fn next_value(&mut self) -> T {
        self.0.clone()
    }

    #[inline]
    fn assign_next(&mut self, slot: &mut T) {
        slot.clone_from(self.0);
    }
}

/// Clones taken from a slice, front to back.
#[derive(Debug)]
pub struct CloneSlice<'a, T> {
    iter: slice::Iter<'a, T>,
}

impl<'a, T> CloneSlice<'a, T> {
    #[inline]
    pub fn new(values: &'a [T]) -> Self {
        Self {
            iter: values.iter(),
        }
    }
}

impl<T: Clone> ValueSource<T> for CloneSlice<'_, T> {
    #[inline]
    fn next_value(&mut self) -> T {
        self.iter.next().expect("value source exhausted").clone()
    }

    #[inline]
    fn assign_next(&mut self, slot: &mut T) {
        slot.clone_from(self.iter.next().expect("value source exhausted"));
    }
}

/// Copies taken from a slice of `Copy` elements.
///
/// `Copy` types have no custom clone or drop, so this source offers the flat copy path:
/// with a plain allocator a whole run is copied with one `memcpy`.
#[derive(Debug)]
pub struct CopySlice<'a, T: Copy> {
    rest: &'a [T],
}

impl<'a, T: Copy> CopySlice<'a, T> {
    #[inline]
    pub const fn new(values: &'a [T]) -> Self {
        Self { rest: values }
    }
}

impl<T: Copy> ValueSource<T> for CopySlice<'_, T> {
    #[inline]
    fn next_value(&mut self) -> T {
        let (first, rest) = self.rest.split_first().expect("value source exhausted");
        self.rest = rest;
        *first
    }

    #[inline(always)]
    unsafe fn copy_flat(&mut self, dst: *mut T, count: usize) -> bool {
        assert!(count <= self.rest.len(), "value source exhausted");
        let (head, rest) = self.rest.split_at(count);
        // SAFETY: `dst` is valid for `count` writes and cannot overlap a shared slice.
        unsafe { ptr::copy_nonoverlapping(head.as_ptr(), dst, count) };
        self.rest = rest;
        true
    }
}

/// Values moved out of an iterator.
#[derive(Debug)]
pub struct IterValues<I>(I);

impl<I: Iterator> IterValues<I> {
    #[inline]
    pub fn new<S: IntoIterator<IntoIter = I>>(values: S) -> Self {
        Self(values.into_iter())
    }
}

impl<T, I: Iterator<Item = T>> ValueSource<T> for IterValues<I> {
    #[inline]
    fn next_value(&mut self) -> T {
        self.0.next().expect("value source exhausted")
    }
}

/// Values returned by a closure.
#[derive(Debug)]
pub struct FromFn<F>(F);

impl<F> FromFn<F> {
    #[inline]
    pub const fn new(f: F) -> Self {
        Self(f)
    }
}

impl<T, F: FnMut() -> T> ValueSource<T> for FromFn<F> {
    #[inline]
    fn next_value(&mut self) -> T {
        (self.0)()
    }
}

/// `T::default()` for every slot.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultValue;

impl<T: Default> ValueSource<T> for DefaultValue {
    #[inline]
    fn next_value(&mut self) -> T {
        T::default()
    }
}
