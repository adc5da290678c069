//! Rollback guards for multi-step mutations.
//!
//! A mutation does its risky step through a guard, records what succeeded, and only
//! disarms the guard with `commit` once the whole operation can no longer fail.
//! Guards are declared allocation first, construction second, so that unwinding
//! destroys new elements before it frees the block that holds them.

use core::{mem::ManuallyDrop, ptr::NonNull};

use crate::{
    StorageError,
    elements::{construct_range, destroy_range},
    raw_alloc::RawAlloc,
    value_source::ValueSource,
};

/// Owns a freshly allocated block until it is committed.
pub(crate) struct AllocationTransaction<'a, T, A: RawAlloc> {
    alloc: &'a mut A,
    data: Option<NonNull<T>>,
    capacity: usize,
}

impl<'a, T, A: RawAlloc> AllocationTransaction<'a, T, A> {
    #[inline]
    pub(crate) fn new(alloc: &'a mut A) -> Self {
        Self {
            alloc,
            data: None,
            capacity: 0,
        }
    }

    /// Allocates a block for `capacity` elements.
    ///
    /// A transaction holds at most one block.
    #[inline]
    pub(crate) fn allocate(&mut self, capacity: usize) -> Result<*mut T, StorageError> {
        debug_assert!(!self.did_allocate(), "transaction already holds a block");
        let data = self.alloc.allocate::<T>(capacity)?;
        self.data = Some(data);
        self.capacity = capacity;
        Ok(data.as_ptr())
    }

    #[inline(always)]
    pub(crate) fn did_allocate(&self) -> bool {
        self.data.is_some()
    }

    /// The allocator, for constructing into the new block.
    #[inline(always)]
    pub(crate) fn allocator(&mut self) -> &mut A {
        &mut *self.alloc
    }

    /// Disarms the guard and hands the block over to the caller.
    ///
    /// # Panics
    /// Panics if nothing was allocated.
    #[inline]
    pub(crate) fn commit(self) -> (NonNull<T>, usize) {
        let this = ManuallyDrop::new(self);
        let data = this.data.expect("committed an empty allocation transaction");
        (data, this.capacity)
    }
}

impl<T, A: RawAlloc> Drop for AllocationTransaction<'_, T, A> {
    fn drop(&mut self) {
        if let Some(data) = self.data {
            // SAFETY: `data` came from `allocate(self.capacity)` and was never handed out.
            unsafe { self.alloc.deallocate(data, self.capacity) };
        }
    }
}

/// Owns a run of freshly constructed elements until it is committed.
pub(crate) struct ConstructionTransaction<'a, T, A: RawAlloc> {
    alloc: &'a mut A,
    data: *mut T,
    len: usize,
}

impl<'a, T, A: RawAlloc> ConstructionTransaction<'a, T, A> {
    #[inline]
    pub(crate) fn new(alloc: &'a mut A) -> Self {
        Self {
            alloc,
            data: core::ptr::null_mut(),
            len: 0,
        }
    }

    /// Constructs `count` elements at `data` and records them.
    ///
    /// A panic while constructing leaves nothing recorded and nothing live.
    ///
    /// # Safety
    /// `data` is valid for `count` writes and holds no live elements.
    #[inline]
    pub(crate) unsafe fn construct<V: ValueSource<T>>(&mut self, data: *mut T, values: &mut V, count: usize) {
        debug_assert!(!self.did_construct(), "transaction already holds elements");
        unsafe { construct_range(&mut *self.alloc, data, values, count) };
        self.data = data;
        self.len = count;
    }

    #[inline(always)]
    pub(crate) fn did_construct(&self) -> bool {
        !self.data.is_null()
    }

    /// The allocator, for work that must finish before the elements are committed.
    #[inline(always)]
    pub(crate) fn allocator(&mut self) -> &mut A {
        &mut *self.alloc
    }

    /// Disarms the guard; the recorded elements now belong to the caller.
    #[inline]
    pub(crate) fn commit(self) {
        let _ = ManuallyDrop::new(self);
    }
}

impl<T, A: RawAlloc> Drop for ConstructionTransaction<'_, T, A> {
    fn drop(&mut self) {
        // SAFETY: the recorded run was constructed by `construct` and never handed out.
        unsafe { destroy_range(&mut *self.alloc, self.data, self.len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test_utils::{CountingAlloc, Ledger},
        value_source::{CloneSlice, IterValues},
    };
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn uncommitted_allocation_is_released() {
        let mut alloc = CountingAlloc::default();
        {
            let mut tx = AllocationTransaction::<u64, _>::new(&mut alloc);
            assert!(!tx.did_allocate());
            tx.allocate(8).unwrap();
            assert!(tx.did_allocate());
        }
        assert_eq!(alloc.stats.allocations(), 1);
        assert_eq!(alloc.stats.outstanding(), 0);
    }

    #[test]
    fn committed_allocation_is_kept() {
        let mut alloc = CountingAlloc::default();
        let mut tx = AllocationTransaction::<u64, _>::new(&mut alloc);
        tx.allocate(8).unwrap();
        let (data, capacity) = tx.commit();
        assert_eq!(capacity, 8);
        assert_eq!(alloc.stats.outstanding(), 1);
        unsafe { alloc.deallocate(data, capacity) };
        assert_eq!(alloc.stats.outstanding(), 0);
    }

    #[test]
    fn failed_allocation_holds_nothing() {
        let mut alloc = CountingAlloc::default();
        alloc.stats.fail_next_allocation();
        let mut tx = AllocationTransaction::<u64, _>::new(&mut alloc);
        assert!(matches!(tx.allocate(4), Err(StorageError::AllocError { .. })));
        assert!(!tx.did_allocate());
    }

    #[test]
    fn uncommitted_construction_is_destroyed() {
        let ledger = Ledger::new();
        let source = [ledger.witness(1), ledger.witness(2)];
        let mut alloc = CountingAlloc::default();
        {
            let mut alloc_tx = AllocationTransaction::new(&mut alloc);
            let data = alloc_tx.allocate(2).unwrap();
            let mut construction_tx = ConstructionTransaction::new(alloc_tx.allocator());
            unsafe { construction_tx.construct(data, &mut CloneSlice::new(&source), 2) };
            assert!(construction_tx.did_construct());
            assert_eq!(ledger.live(), 4);
        }
        assert_eq!(ledger.live(), 2);
        assert_eq!(alloc.stats.destroys(), 2);
        assert_eq!(alloc.stats.outstanding(), 0);
    }

    #[test]
    fn panic_inside_construction_unwinds_both_guards() {
        let mut alloc = CountingAlloc::default();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut alloc_tx = AllocationTransaction::<u32, _>::new(&mut alloc);
            let data = alloc_tx.allocate(3).unwrap();
            let mut construction_tx = ConstructionTransaction::new(alloc_tx.allocator());
            let mut values = IterValues::new([1u32, 2]);
            unsafe { construction_tx.construct(data, &mut values, 3) };
        }));
        assert!(result.is_err());
        assert_eq!(alloc.stats.constructs(), 2);
        assert_eq!(alloc.stats.destroys(), 2);
        assert_eq!(alloc.stats.outstanding(), 0);
    }
}
