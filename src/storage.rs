//! The [`Storage`] engine and the [`storage!`](crate::storage!) macro.

use core::{
    marker::PhantomData,
    mem::{self, ManuallyDrop, MaybeUninit},
    ops::RangeBounds,
    ptr::{self, NonNull},
    slice,
};

use crate::{
    StorageError,
    elements::{assign_range, construct_range, destroy_range, relocate},
    error::infallible,
    raw_alloc::{Global, RawAlloc},
    transaction::{AllocationTransaction, ConstructionTransaction},
    utils::{_trace, cold_path, split_range_bound},
    value_source::{CloneSlice, CopySlice, CopyValue, DefaultValue, FromFn, IterValues, ValueSource},
};

mod impls;


/// Heap half of the buffer union.
struct HeapBuffer<T> {
    ptr: NonNull<T>,
    cap: usize,
}

impl<T> Clone for HeapBuffer<T> {
    #[inline(always)]
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for HeapBuffer<T> {}

/// The two physical layouts. `Storage::allocated` tells which one is live.
#[repr(C)]
union RawBuffer<T, const N: usize> {
    inline: ManuallyDrop<[MaybeUninit<T>; N]>,
    heap: HeapBuffer<T>,
}

/// Growth policy: at least double, and at least what was asked for.
#[inline(always)]
pub(crate) const fn compute_capacity(current: usize, requested: usize) -> usize {
    let next = current.saturating_mul(2);
    if next > requested { next } else { requested }
}

/// A vector that keeps up to `N` elements inline and spills to a heap buffer
/// obtained from `A` beyond that.
///
/// # Layout
///
/// The value holds either an inline array of `N` slots or a pointer and capacity of a
/// heap block, never both. Growth past the current capacity reallocates to
/// `max(capacity * 2, requested)`; the first spill uses `N` as the current capacity.
/// Once on the heap the storage only moves back inline through
/// [`shrink_to_fit`](Storage::shrink_to_fit).
///
/// ```
/// use spillvec::{Storage, storage};
///
/// let mut vec: Storage<i32, 4> = storage![1, 2, 3, 4];
/// assert!(!vec.is_allocated());
/// assert_eq!(vec.capacity(), 4);
///
/// vec.push(5);
/// assert!(vec.is_allocated());
/// assert_eq!(vec.capacity(), 8);
///
/// vec.erase(1..3);
/// assert_eq!(vec, [1, 4, 5]);
/// assert_eq!(vec.capacity(), 8);
///
/// vec.shrink_to_fit();
/// assert!(!vec.is_allocated());
/// ```
///
/// # Failure
///
/// Operations that populate slots pull their values from a
/// [`ValueSource`](crate::value_source::ValueSource). If producing a value panics, or the
/// allocator refuses memory (reported as [`StorageError`] by the `try_*` variants), the
/// storage is left exactly as it was before the call: same elements, same layout, same
/// capacity, and no leaked block. The one exception is overwriting live elements in
/// [`assign`](Storage::assign), which keeps whatever was already overwritten.
///
/// # ZST support
///
/// Zero sized types never touch memory, but the inline capacity and the growth policy
/// still apply.
pub struct Storage<T, const N: usize, A: RawAlloc = Global> {
    len: usize,
    allocated: bool,
    buf: RawBuffer<T, N>,
    alloc: A,
    _marker: PhantomData<T>,
}

unsafe impl<T: Send, const N: usize, A: RawAlloc + Send> Send for Storage<T, N, A> {}
unsafe impl<T: Sync, const N: usize, A: RawAlloc + Sync> Sync for Storage<T, N, A> {}

impl<T, const N: usize, A: RawAlloc> Drop for Storage<T, N, A> {
    fn drop(&mut self) {
        if self.len == 0 && !self.allocated {
            return;
        }
        let (data, len, _) = self.raw_parts();
        // SAFETY: `0..len` are live and never used again.
        unsafe {
            destroy_range(&mut self.alloc, data, len);
            self.deallocate_if_allocated();
        }
    }
}

/// Creates a [`Storage`] containing the arguments.
///
/// The syntax is similar to [`vec!`](https://doc.rust-lang.org/std/macro.vec.html).
/// The inline capacity comes from the type annotation.
///
/// # Examples
///
/// ```
/// # use spillvec::{storage, Storage};
/// let vec: Storage<String, 4> = storage![];
/// let vec: Storage<i64, 4> = storage![1; 5]; // Need to support Clone.
/// let vec: Storage<_, 4> = storage![1, 2, 3];
/// ```
#[macro_export]
macro_rules! storage {
    [] => { $crate::Storage::new() };
    [$elem:expr; $n:expr] => { $crate::Storage::from_elem($elem, $n) };
    [$($item:expr),+ $(,)?] => { $crate::Storage::from([ $($item),+ ]) };
}

impl<T, const N: usize> Storage<T, N> {
    /// Constructs a new, empty storage using the global allocator.
    ///
    /// No memory is allocated until more than `N` elements are stored.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::Storage;
    /// let vec: Storage<u8, 16> = Storage::new();
    /// assert_eq!(vec.len(), 0);
    /// assert_eq!(vec.capacity(), 16);
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self::new_in(Global)
    }

    /// Constructs an empty storage able to hold `capacity` elements without reallocating.
    ///
    /// # Panics
    /// Panics if the capacity overflows.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut storage = Self::new();
        storage.reserve(capacity);
        storage
    }

    /// Constructs a storage holding `len` values pulled from `values`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, value_source::IterValues};
    /// let vec: Storage<u32, 2> = Storage::from_source(IterValues::new(10..15), 5);
    /// assert_eq!(vec, [10, 11, 12, 13, 14]);
    /// assert_eq!(vec.capacity(), 5);
    /// ```
    #[inline]
    pub fn from_source<V: ValueSource<T>>(values: V, len: usize) -> Self {
        Self::from_source_in(values, len, Global)
    }

    /// Fallible version of [`from_source`](Storage::from_source).
    #[inline]
    pub fn try_from_source<V: ValueSource<T>>(values: V, len: usize) -> Result<Self, StorageError> {
        Self::try_from_source_in(values, len, Global)
    }

    /// Constructs a storage with `len` clones of `elem`.
    #[inline]
    pub fn from_elem(elem: T, len: usize) -> Self
    where
        T: Clone,
    {
        Self::from_source(CopyValue::new(&elem), len)
    }

    /// Constructs a storage with clones of every element of `values`.
    #[inline]
    pub fn from_slice(values: &[T]) -> Self
    where
        T: Clone,
    {
        Self::from_source(CloneSlice::new(values), values.len())
    }

    /// Constructs a storage by flat-copying `values`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::Storage;
    /// let vec: Storage<u8, 4> = Storage::from_copy_slice(b"hello");
    /// assert_eq!(vec, b"hello");
    /// assert!(vec.is_allocated());
    /// ```
    #[inline]
    pub fn from_copy_slice(values: &[T]) -> Self
    where
        T: Copy,
    {
        Self::from_source(CopySlice::new(values), values.len())
    }

    /// Constructs a storage with `len` default values.
    #[inline]
    pub fn with_default(len: usize) -> Self
    where
        T: Default,
    {
        Self::from_source(DefaultValue, len)
    }
}

impl<T, const N: usize, A: RawAlloc> Storage<T, N, A> {
    /// Constructs a new, empty storage that allocates from `alloc`.
    #[inline]
    pub const fn new_in(alloc: A) -> Self {
        Self {
            len: 0,
            allocated: false,
            buf: RawBuffer {
                inline: ManuallyDrop::new([const { MaybeUninit::uninit() }; N]),
            },
            alloc,
            _marker: PhantomData,
        }
    }

    /// Constructs a storage in `alloc` holding `len` values pulled from `values`.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    #[inline]
    pub fn from_source_in<V: ValueSource<T>>(values: V, len: usize, alloc: A) -> Self {
        infallible(Self::try_from_source_in(values, len, alloc))
    }

    /// Fallible version of [`from_source_in`](Storage::from_source_in).
    pub fn try_from_source_in<V: ValueSource<T>>(
        mut values: V,
        len: usize,
        alloc: A,
    ) -> Result<Self, StorageError> {
        let mut storage = Self::new_in(alloc);
        // SAFETY: the storage was just created.
        unsafe { storage.initialize(&mut values, len)? };
        Ok(storage)
    }

    /// Populates an empty, inline storage with `new_len` values.
    ///
    /// On failure nothing is allocated and nothing is live.
    ///
    /// # Safety
    /// The storage is empty and not allocated.
    unsafe fn initialize<V: ValueSource<T>>(
        &mut self,
        values: &mut V,
        new_len: usize,
    ) -> Result<(), StorageError> {
        debug_assert!(!self.allocated && self.len == 0);

        if new_len > N {
            let new_cap = compute_capacity(N, new_len);
            let mut alloc_tx = AllocationTransaction::<T, _>::new(&mut self.alloc);
            let data = alloc_tx.allocate(new_cap)?;
            unsafe { construct_range(alloc_tx.allocator(), data, values, new_len) };
            let (ptr, cap) = alloc_tx.commit();

            _trace!(len = new_len, capacity = cap, "storage initialized on the heap");
            self.buf.heap = HeapBuffer { ptr, cap };
            self.allocated = true;
        } else {
            let data = self.inline_mut_ptr();
            unsafe { construct_range(&mut self.alloc, data, values, new_len) };
        }
        self.len = new_len;
        Ok(())
    }

    #[inline(always)]
    fn inline_ptr(&self) -> *const T {
        (&raw const self.buf).cast::<T>()
    }

    #[inline(always)]
    fn inline_mut_ptr(&mut self) -> *mut T {
        (&raw mut self.buf).cast::<T>()
    }

    #[inline(always)]
    fn heap(&self) -> HeapBuffer<T> {
        debug_assert!(self.allocated);
        // SAFETY: `allocated` says the heap half is live.
        unsafe { self.buf.heap }
    }

    /// Data pointer, length and capacity of the live buffer.
    #[inline(always)]
    fn raw_parts(&mut self) -> (*mut T, usize, usize) {
        if self.allocated {
            let HeapBuffer { ptr, cap } = self.heap();
            (ptr.as_ptr(), self.len, cap)
        } else {
            (self.inline_mut_ptr(), self.len, N)
        }
    }

    /// # Safety
    /// The elements of the heap buffer were destroyed or relocated.
    #[inline]
    unsafe fn deallocate_if_allocated(&mut self) {
        if self.allocated {
            let HeapBuffer { ptr, cap } = self.heap();
            unsafe { self.alloc.deallocate(ptr, cap) };
        }
    }

    /// Releases the current buffer (if on the heap) and switches to `ptr`.
    ///
    /// # Safety
    /// The elements of the current buffer were destroyed or relocated, and `ptr` was
    /// allocated by `self.alloc` for `cap` elements.
    #[inline]
    unsafe fn acquire_heap(&mut self, ptr: NonNull<T>, cap: usize) {
        unsafe { self.deallocate_if_allocated() };
        self.buf.heap = HeapBuffer { ptr, cap };
        self.allocated = true;
    }

    /// Returns the number of elements.
    #[inline(always)]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the storage contains no elements.
    #[inline(always)]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of elements the storage can hold without reallocating.
    ///
    /// This is `N` while the elements are inline.
    #[inline(always)]
    pub fn capacity(&self) -> usize {
        if self.allocated { self.heap().cap } else { N }
    }

    /// Returns `N`, the number of elements that fit without a heap buffer.
    #[inline(always)]
    pub const fn inline_capacity(&self) -> usize {
        N
    }

    /// Returns `true` if the elements live in a heap buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::Storage;
    /// let mut vec: Storage<i32, 2> = Storage::new();
    /// vec.push(1);
    /// vec.push(2);
    /// assert!(!vec.is_allocated());
    ///
    /// vec.push(3);
    /// assert!(vec.is_allocated());
    /// ```
    #[inline(always)]
    pub const fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Returns a reference to the allocator.
    #[inline(always)]
    pub const fn allocator(&self) -> &A {
        &self.alloc
    }

    /// Returns a raw pointer to the live buffer.
    ///
    /// The pointer is invalidated by any reallocation and by moving an inline storage.
    #[inline(always)]
    pub fn as_ptr(&self) -> *const T {
        if self.allocated {
            self.heap().ptr.as_ptr()
        } else {
            self.inline_ptr()
        }
    }

    /// Returns a raw mutable pointer to the live buffer.
    ///
    /// The pointer is invalidated by any reallocation and by moving an inline storage.
    #[inline(always)]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.raw_parts().0
    }

    /// Extracts a slice containing every element.
    #[inline(always)]
    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `0..len` are live.
        unsafe { slice::from_raw_parts(self.as_ptr(), self.len) }
    }

    /// Extracts a mutable slice containing every element.
    #[inline(always)]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        let (data, len, _) = self.raw_parts();
        // SAFETY: `0..len` are live.
        unsafe { slice::from_raw_parts_mut(data, len) }
    }

    /// Forces the length of the storage to `new_len`.
    ///
    /// # Safety
    /// - `new_len` must be less than or equal to `capacity()`.
    /// - If `new_len > old_len`, the elements at `old_len..new_len` must be initialized.
    /// - If `new_len < old_len`, the elements at `new_len..old_len` must be dropped.
    #[inline(always)]
    pub unsafe fn set_len(&mut self, new_len: usize) {
        debug_assert!(new_len <= self.capacity());
        self.len = new_len;
    }

    /// Replaces the content with `new_len` values pulled from `values`.
    ///
    /// Live slots are overwritten, missing ones constructed and extra ones destroyed.
    /// When `new_len` exceeds the capacity, a new buffer is fully populated before the
    /// old elements are destroyed and the old buffer released.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, storage, value_source::CopyValue};
    /// let mut vec: Storage<i32, 4> = storage![1, 2, 3];
    ///
    /// vec.assign(CopyValue::new(&7), 2);
    /// assert_eq!(vec, [7, 7]);
    ///
    /// vec.assign(CopyValue::new(&9), 6);
    /// assert_eq!(vec, [9; 6]);
    /// assert!(vec.is_allocated());
    /// ```
    #[inline]
    pub fn assign<V: ValueSource<T>>(&mut self, values: V, new_len: usize) {
        infallible(self.try_assign(values, new_len))
    }

    /// Fallible version of [`assign`](Storage::assign).
    pub fn try_assign<V: ValueSource<T>>(
        &mut self,
        mut values: V,
        new_len: usize,
    ) -> Result<(), StorageError> {
        let (data, len, cap) = self.raw_parts();

        if new_len > cap {
            cold_path();
            let new_cap = compute_capacity(cap, new_len);
            let mut alloc_tx = AllocationTransaction::<T, _>::new(&mut self.alloc);
            let new_data = alloc_tx.allocate(new_cap)?;

            let mut construction_tx = ConstructionTransaction::new(alloc_tx.allocator());
            unsafe { construction_tx.construct(new_data, &mut values, new_len) };

            // The new run stays guarded until the old one is gone, so a panicking
            // destructor releases the new block and leaves an empty storage.
            self.len = 0;
            unsafe { destroy_range(construction_tx.allocator(), data, len) };
            construction_tx.commit();
            let (ptr, new_cap) = alloc_tx.commit();

            _trace!(from = cap, to = new_cap, "storage reallocated by assign");
            // SAFETY: the old elements were destroyed above.
            unsafe { self.acquire_heap(ptr, new_cap) };
        } else if new_len > len {
            unsafe {
                assign_range(data, &mut values, len);
                construct_range(&mut self.alloc, data.add(len), &mut values, new_len - len);
            }
        } else {
            unsafe { assign_range(data, &mut values, new_len) };
            self.len = new_len;
            unsafe { destroy_range(&mut self.alloc, data.add(new_len), len - new_len) };
        }

        self.len = new_len;
        Ok(())
    }

    /// Resizes to `new_len`, constructing new trailing elements from `values`.
    ///
    /// Shrinking destroys the trailing elements. Growing past the capacity
    /// constructs the new elements in a new buffer first, then moves the old ones over.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    #[inline]
    pub fn resize_from<V: ValueSource<T>>(&mut self, values: V, new_len: usize) {
        infallible(self.try_resize_from(values, new_len))
    }

    /// Fallible version of [`resize_from`](Storage::resize_from).
    pub fn try_resize_from<V: ValueSource<T>>(
        &mut self,
        mut values: V,
        new_len: usize,
    ) -> Result<(), StorageError> {
        let (data, len, cap) = self.raw_parts();

        if new_len <= len {
            self.len = new_len;
            unsafe { destroy_range(&mut self.alloc, data.add(new_len), len - new_len) };
        } else if new_len <= cap {
            unsafe { construct_range(&mut self.alloc, data.add(len), &mut values, new_len - len) };
            self.len = new_len;
        } else {
            cold_path();
            let new_cap = compute_capacity(cap, new_len);
            let mut alloc_tx = AllocationTransaction::<T, _>::new(&mut self.alloc);
            let new_data = alloc_tx.allocate(new_cap)?;

            let mut construction_tx = ConstructionTransaction::new(alloc_tx.allocator());
            unsafe {
                construction_tx.construct(new_data.add(len), &mut values, new_len - len);
                relocate(data, new_data, len);
            }
            construction_tx.commit();
            let (ptr, new_cap) = alloc_tx.commit();

            _trace!(from = cap, to = new_cap, "storage reallocated by resize");
            // SAFETY: the old elements were relocated.
            unsafe { self.acquire_heap(ptr, new_cap) };
            self.len = new_len;
        }
        Ok(())
    }

    /// Resizes to `new_len`, filling new slots with clones of `value`.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, storage};
    /// let mut vec: Storage<&str, 2> = storage!["hello"];
    /// vec.resize(3, "world");
    /// assert_eq!(vec, ["hello", "world", "world"]);
    ///
    /// vec.resize(1, "unused");
    /// assert_eq!(vec, ["hello"]);
    /// ```
    #[inline]
    pub fn resize(&mut self, new_len: usize, value: T)
    where
        T: Clone,
    {
        self.resize_from(CopyValue::new(&value), new_len);
    }

    /// Resizes to `new_len`, filling new slots with the results of `f`.
    #[inline]
    pub fn resize_with<F: FnMut() -> T>(&mut self, new_len: usize, f: F) {
        self.resize_from(FromFn::new(f), new_len);
    }

    /// Resizes to `new_len`, filling new slots with `T::default()`.
    #[inline]
    pub fn resize_default(&mut self, new_len: usize)
    where
        T: Default,
    {
        self.resize_from(DefaultValue, new_len);
    }

    /// Inserts `count` values pulled from `values` at `index`, shifting the tail right.
    ///
    /// Returns `index`, the position of the first inserted element.
    ///
    /// # Panics
    /// - Panics if `index > len`.
    /// - Panics if the capacity overflows or the allocator fails.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, storage, value_source::CopySlice};
    /// let mut vec: Storage<char, 4> = storage!['a', 'e'];
    ///
    /// vec.insert_from(1, CopySlice::new(&['b', 'c', 'd']), 3);
    /// assert_eq!(vec, ['a', 'b', 'c', 'd', 'e']);
    /// ```
    #[inline]
    pub fn insert_from<V: ValueSource<T>>(&mut self, index: usize, values: V, count: usize) -> usize {
        infallible(self.try_insert_from(index, values, count))
    }

    /// Fallible version of [`insert_from`](Storage::insert_from).
    ///
    /// # Panics
    /// Panics if `index > len`.
    pub fn try_insert_from<V: ValueSource<T>>(
        &mut self,
        index: usize,
        mut values: V,
        count: usize,
    ) -> Result<usize, StorageError> {
        let (data, len, cap) = self.raw_parts();
        assert!(index <= len, "insertion index (is {index}) should be <= len (is {len})");
        let new_len = len.checked_add(count).ok_or(StorageError::CapacityOverflow)?;

        if new_len > cap {
            cold_path();
            let new_cap = compute_capacity(cap, new_len);
            let mut alloc_tx = AllocationTransaction::<T, _>::new(&mut self.alloc);
            let new_data = alloc_tx.allocate(new_cap)?;

            let mut construction_tx = ConstructionTransaction::new(alloc_tx.allocator());
            unsafe {
                construction_tx.construct(new_data.add(index), &mut values, count);
                relocate(data, new_data, index);
                relocate(data.add(index), new_data.add(index + count), len - index);
            }
            construction_tx.commit();
            let (ptr, new_cap) = alloc_tx.commit();

            _trace!(from = cap, to = new_cap, "storage reallocated by insert");
            // SAFETY: the old elements were relocated.
            unsafe { self.acquire_heap(ptr, new_cap) };
        } else if count != 0 {
            // The tail is moved up to open a gap. Until the gap is filled the tail belongs
            // to the guard, which moves it back if filling panics.
            struct OpenGap<'a, T> {
                gap: *mut T,
                tail: usize,
                count: usize,
                len: &'a mut usize,
                old_len: usize,
            }

            impl<T> Drop for OpenGap<'_, T> {
                fn drop(&mut self) {
                    unsafe { ptr::copy(self.gap.add(self.count), self.gap, self.tail) };
                    *self.len = self.old_len;
                }
            }

            let gap = unsafe { data.add(index) };
            let tail = len - index;
            unsafe { ptr::copy(gap, gap.add(count), tail) };
            self.len = index;
            let guard = OpenGap {
                gap,
                tail,
                count,
                len: &mut self.len,
                old_len: len,
            };

            unsafe { construct_range(&mut self.alloc, gap, &mut values, count) };
            mem::forget(guard);
        }

        self.len = new_len;
        Ok(index)
    }

    /// Inserts `element` at `index`, shifting the tail right.
    ///
    /// # Panics
    /// - Panics if `index > len`.
    /// - Panics if the capacity overflows or the allocator fails.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, storage};
    /// let mut vec: Storage<char, 3> = storage!['a', 'b', 'c'];
    ///
    /// vec.insert(1, 'd');
    /// assert_eq!(vec, ['a', 'd', 'b', 'c']);
    /// assert!(vec.is_allocated());
    /// ```
    #[inline]
    pub fn insert(&mut self, index: usize, element: T) {
        self.insert_from(index, IterValues::new(Some(element)), 1);
    }

    /// Removes the elements in `range`, shifting the tail left.
    ///
    /// Returns the start of the range, the new position of the first element after it.
    /// The capacity is left unchanged.
    ///
    /// # Panics
    /// Panics if the range is out of bounds or decreasing.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, storage};
    /// let mut vec: Storage<i32, 8> = storage![1, 2, 3, 4, 5];
    ///
    /// assert_eq!(vec.erase(1..3), 1);
    /// assert_eq!(vec, [1, 4, 5]);
    ///
    /// vec.erase(..);
    /// assert!(vec.is_empty());
    /// ```
    pub fn erase<R: RangeBounds<usize>>(&mut self, range: R) -> usize {
        let (data, len, _) = self.raw_parts();
        let (from, to) = split_range_bound(&range, len);
        assert!(from <= to, "erase range starts at {from} but ends at {to}");
        assert!(to <= len, "erase range end (is {to}) should be <= len (is {len})");

        let count = to - from;
        if count == 0 {
            return from;
        }

        // Closes the gap even when a destructor panics.
        struct CloseGap<'a, T> {
            dst: *mut T,
            src: *const T,
            tail: usize,
            len: &'a mut usize,
            new_len: usize,
        }

        impl<T> Drop for CloseGap<'_, T> {
            fn drop(&mut self) {
                unsafe { ptr::copy(self.src, self.dst, self.tail) };
                *self.len = self.new_len;
            }
        }

        self.len = from;
        let _guard = unsafe {
            CloseGap {
                dst: data.add(from),
                src: data.add(to),
                tail: len - to,
                len: &mut self.len,
                new_len: len - count,
            }
        };
        unsafe { destroy_range(&mut self.alloc, data.add(from), count) };
        from
    }

    /// Removes and returns the element at `index`, shifting the tail left.
    ///
    /// # Panics
    /// Panics if `index >= len`.
    pub fn remove(&mut self, index: usize) -> T {
        let (data, len, _) = self.raw_parts();
        assert!(index < len, "removal index (is {index}) should be < len (is {len})");
        unsafe {
            let value = ptr::read(data.add(index));
            ptr::copy(data.add(index + 1), data.add(index), len - index - 1);
            self.len = len - 1;
            value
        }
    }

    /// Shortens the storage to `len` elements, destroying the rest.
    ///
    /// Has no effect when `len >= self.len()`, and never changes the capacity.
    #[inline]
    pub fn truncate(&mut self, len: usize) {
        let (data, old_len, _) = self.raw_parts();
        if len < old_len {
            self.len = len;
            unsafe { destroy_range(&mut self.alloc, data.add(len), old_len - len) };
        }
    }

    /// Destroys every element. The capacity and layout are kept.
    #[inline]
    pub fn clear(&mut self) {
        self.truncate(0);
    }

    /// Removes the last element and returns it, or `None` if empty.
    #[inline]
    pub fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let (data, len, _) = self.raw_parts();
        self.len = len - 1;
        Some(unsafe { ptr::read(data.add(len - 1)) })
    }

    /// Appends the value returned by `f` and returns a reference to it.
    ///
    /// When the storage is full, `f` runs after the new buffer is allocated and its
    /// result is constructed there before any existing element moves, so a panic in
    /// `f` leaves the storage untouched.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::Storage;
    /// let mut vec: Storage<String, 1> = Storage::new();
    /// vec.emplace_back_with(|| "a".to_string());
    /// vec.emplace_back_with(|| "b".to_string()).push('!');
    /// assert_eq!(vec, ["a", "b!"]);
    /// ```
    #[inline]
    pub fn emplace_back_with<F: FnOnce() -> T>(&mut self, f: F) -> &mut T {
        infallible(self.try_emplace_back_with(f))
    }

    /// Fallible version of [`emplace_back_with`](Storage::emplace_back_with).
    #[inline]
    pub fn try_emplace_back_with<F: FnOnce() -> T>(&mut self, f: F) -> Result<&mut T, StorageError> {
        let (data, len, cap) = self.raw_parts();
        if len != cap {
            unsafe {
                let slot = data.add(len);
                self.alloc.construct(slot, f());
                self.len = len + 1;
                Ok(&mut *slot)
            }
        } else {
            self.emplace_back_slow(f)
        }
    }

    #[inline(never)]
    fn emplace_back_slow<F: FnOnce() -> T>(&mut self, f: F) -> Result<&mut T, StorageError> {
        let (data, len, cap) = self.raw_parts();
        let new_len = len.checked_add(1).ok_or(StorageError::CapacityOverflow)?;
        let new_cap = compute_capacity(cap, new_len);

        let mut alloc_tx = AllocationTransaction::<T, _>::new(&mut self.alloc);
        let new_data = alloc_tx.allocate(new_cap)?;
        let slot = unsafe { new_data.add(len) };
        unsafe {
            alloc_tx.allocator().construct(slot, f());
            relocate(data, new_data, len);
        }
        let (ptr, new_cap) = alloc_tx.commit();

        _trace!(from = cap, to = new_cap, "storage reallocated by push");
        // SAFETY: the old elements were relocated.
        unsafe { self.acquire_heap(ptr, new_cap) };
        self.len = new_len;
        Ok(unsafe { &mut *slot })
    }

    /// Appends an element to the back.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    #[inline]
    pub fn push(&mut self, value: T) {
        self.emplace_back_with(|| value);
    }

    /// Fallible version of [`push`](Storage::push).
    ///
    /// On error the value is dropped and the storage is unchanged.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), StorageError> {
        self.try_emplace_back_with(|| value).map(|_| ())
    }

    /// Ensures the capacity is at least `requested_capacity`.
    ///
    /// Does nothing, and moves nothing, if the capacity already suffices. Otherwise the
    /// new capacity is `max(capacity * 2, requested_capacity)`.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::Storage;
    /// let mut vec: Storage<i32, 8> = Storage::new();
    ///
    /// vec.reserve(5); // do nothing
    /// assert!(!vec.is_allocated());
    /// assert_eq!(vec.capacity(), 8);
    ///
    /// vec.reserve(10);
    /// assert!(vec.is_allocated());
    /// assert_eq!(vec.capacity(), 16);
    /// ```
    #[inline]
    pub fn reserve(&mut self, requested_capacity: usize) {
        infallible(self.try_reserve(requested_capacity))
    }

    /// Fallible version of [`reserve`](Storage::reserve).
    pub fn try_reserve(&mut self, requested_capacity: usize) -> Result<(), StorageError> {
        let cap = self.capacity();
        if requested_capacity <= cap {
            return Ok(());
        }
        self.reallocate(compute_capacity(cap, requested_capacity))
    }

    /// Moves every element into a new heap buffer of exactly `new_cap` slots.
    ///
    /// `new_cap` must be at least the length.
    fn reallocate(&mut self, new_cap: usize) -> Result<(), StorageError> {
        let (data, len, _old_cap) = self.raw_parts();
        debug_assert!(new_cap >= len);

        let mut alloc_tx = AllocationTransaction::<T, _>::new(&mut self.alloc);
        let new_data = alloc_tx.allocate(new_cap)?;
        unsafe { relocate(data, new_data, len) };
        let (ptr, new_cap) = alloc_tx.commit();

        _trace!(from = _old_cap, to = new_cap, "storage reallocated");
        // SAFETY: the old elements were relocated.
        unsafe { self.acquire_heap(ptr, new_cap) };
        Ok(())
    }

    /// Releases unused capacity.
    ///
    /// If the elements fit inline they move back into the inline buffer and the heap
    /// buffer is freed; otherwise they move to a heap buffer of exactly `len` slots.
    /// An inline storage is left as is.
    ///
    /// # Panics
    /// Panics if the allocator fails.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::Storage;
    /// let mut vec: Storage<i32, 4> = Storage::with_capacity(20);
    /// vec.extend([1, 2, 3]);
    /// assert!(vec.is_allocated());
    ///
    /// vec.shrink_to_fit();
    /// assert!(!vec.is_allocated());
    /// assert_eq!(vec.capacity(), 4);
    /// assert_eq!(vec, [1, 2, 3]);
    /// ```
    #[inline]
    pub fn shrink_to_fit(&mut self) {
        infallible(self.try_shrink_to_fit())
    }

    /// Fallible version of [`shrink_to_fit`](Storage::shrink_to_fit).
    pub fn try_shrink_to_fit(&mut self) -> Result<(), StorageError> {
        if !self.allocated {
            return Ok(());
        }
        let HeapBuffer { ptr, cap } = self.heap();
        let len = self.len;
        if len == cap {
            return Ok(());
        }

        if len <= N {
            _trace!(len, capacity = cap, "storage moved back inline");
            let inline = self.inline_mut_ptr();
            // SAFETY: the heap half was saved above, so the inline half may overwrite it.
            unsafe {
                relocate(ptr.as_ptr(), inline, len);
                self.alloc.deallocate(ptr, cap);
            }
            self.allocated = false;
            Ok(())
        } else {
            self.reallocate(len)
        }
    }

    /// Swaps the contents, layouts and allocators of two storages.
    ///
    /// Two heap buffers are exchanged by pointer. Two inline buffers exchange their
    /// common prefix element by element and move the excess of the longer one over.
    /// With one of each, the inline elements move into the allocated side's inline
    /// buffer and the heap buffer is handed to the other side.
    ///
    /// # Examples
    ///
    /// ```
    /// # use spillvec::{Storage, storage};
    /// let mut a: Storage<i32, 2> = storage![1];
    /// let mut b: Storage<i32, 2> = storage![2, 3, 4];
    ///
    /// a.swap(&mut b);
    /// assert_eq!(a, [2, 3, 4]);
    /// assert!(a.is_allocated());
    /// assert_eq!(b, [1]);
    /// assert!(!b.is_allocated());
    /// ```
    pub fn swap(&mut self, other: &mut Self) {
        match (self.allocated, other.allocated) {
            (true, true) => {
                let mine = self.heap();
                self.buf.heap = other.heap();
                other.buf.heap = mine;
            }
            (false, false) => {
                let (small, large) = if self.len <= other.len {
                    (&mut *self, &mut *other)
                } else {
                    (&mut *other, &mut *self)
                };
                let common = small.len;
                let excess = large.len - common;
                // SAFETY: both prefixes are live; the excess moves into free inline slots.
                unsafe {
                    ptr::swap_nonoverlapping(small.inline_mut_ptr(), large.inline_mut_ptr(), common);
                    relocate(
                        large.inline_ptr().add(common),
                        small.inline_mut_ptr().add(common),
                        excess,
                    );
                }
            }
            _ => {
                let (heap_side, inline_side) = if self.allocated {
                    (&mut *self, &mut *other)
                } else {
                    (&mut *other, &mut *self)
                };
                let donor = heap_side.heap();
                // SAFETY: `donor` keeps the heap half while the inline half is overwritten;
                // `inline_side.len <= N` so the elements fit.
                unsafe {
                    relocate(
                        inline_side.inline_ptr(),
                        heap_side.inline_mut_ptr(),
                        inline_side.len,
                    );
                }
                inline_side.buf.heap = donor;
            }
        }

        mem::swap(&mut self.len, &mut other.len);
        mem::swap(&mut self.allocated, &mut other.allocated);
        mem::swap(&mut self.alloc, &mut other.alloc);
    }
}

impl<T: Clone, const N: usize, A: RawAlloc> Storage<T, N, A> {
    /// Clones and appends every element of `other`.
    ///
    /// # Panics
    /// Panics if the capacity overflows or the allocator fails.
    #[inline]
    pub fn extend_from_slice(&mut self, other: &[T]) {
        self.insert_from(self.len, CloneSlice::new(other), other.len());
    }
}

impl<T: Clone, const N: usize, A: RawAlloc + Clone> Clone for Storage<T, N, A> {
    fn clone(&self) -> Self {
        Self::from_source_in(CloneSlice::new(self.as_slice()), self.len, self.alloc.clone())
    }

    fn clone_from(&mut self, source: &Self) {
        self.assign(CloneSlice::new(source.as_slice()), source.len);
    }
}

impl<T, const N: usize> Default for Storage<T, N> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize, const P: usize> From<[T; P]> for Storage<T, N> {
    #[inline]
    fn from(value: [T; P]) -> Self {
        Self::from_source(IterValues::new(value), P)
    }
}

impl<T: Clone, const N: usize> From<&[T]> for Storage<T, N> {
    #[inline]
    fn from(value: &[T]) -> Self {
        Self::from_slice(value)
    }
}

impl<T, const N: usize> FromIterator<T> for Storage<T, N> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut storage = Self::new();
        storage.extend(iter);
        storage
    }
}

impl<T, const N: usize, A: RawAlloc> Extend<T> for Storage<T, N, A> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        self.reserve(self.len.saturating_add(lower));
        for item in iter {
            self.push(item);
        }
    }
}

impl<'a, T: 'a + Clone, const N: usize, A: RawAlloc> Extend<&'a T> for Storage<T, N, A> {
    fn extend<I: IntoIterator<Item = &'a T>>(&mut self, iter: I) {
        self.extend(iter.into_iter().cloned());
    }
}
