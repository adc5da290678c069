//! Instrumented allocator and element types shared by the unit tests.

use alloc::rc::Rc;
use core::{cell::Cell, fmt, ptr::NonNull};

use crate::{
    StorageError,
    raw_alloc::{Global, RawAlloc, array_layout},
};

#[derive(Debug, Default)]
pub(crate) struct AllocStats {
    allocations: Cell<usize>,
    deallocations: Cell<usize>,
    constructs: Cell<usize>,
    destroys: Cell<usize>,
    fail_next: Cell<bool>,
}

impl AllocStats {
    pub(crate) fn allocations(&self) -> usize {
        self.allocations.get()
    }

    pub(crate) fn deallocations(&self) -> usize {
        self.deallocations.get()
    }

    /// Blocks allocated and not yet released.
    pub(crate) fn outstanding(&self) -> usize {
        self.allocations.get() - self.deallocations.get()
    }

    pub(crate) fn constructs(&self) -> usize {
        self.constructs.get()
    }

    pub(crate) fn destroys(&self) -> usize {
        self.destroys.get()
    }

    pub(crate) fn fail_next_allocation(&self) {
        self.fail_next.set(true);
    }
}

/// Delegates to [`Global`] and records every call.
///
/// Not plain, so it always takes the element-by-element paths.
#[derive(Clone, Debug, Default)]
pub(crate) struct CountingAlloc {
    pub(crate) stats: Rc<AllocStats>,
}

unsafe impl RawAlloc for CountingAlloc {
    fn allocate<T>(&mut self, count: usize) -> Result<NonNull<T>, StorageError> {
        let layout = array_layout::<T>(count)?;
        if self.stats.fail_next.replace(false) {
            return Err(StorageError::AllocError { layout });
        }
        let data = Global.allocate::<T>(count)?;
        self.stats.allocations.set(self.stats.allocations.get() + 1);
        Ok(data)
    }

    unsafe fn deallocate<T>(&mut self, ptr: NonNull<T>, count: usize) {
        self.stats.deallocations.set(self.stats.deallocations.get() + 1);
        unsafe { Global.deallocate(ptr, count) }
    }

    unsafe fn construct<T>(&mut self, slot: *mut T, value: T) {
        self.stats.constructs.set(self.stats.constructs.get() + 1);
        unsafe { slot.write(value) }
    }

    unsafe fn destroy<T>(&mut self, slot: *mut T) {
        self.stats.destroys.set(self.stats.destroys.get() + 1);
        unsafe { slot.drop_in_place() }
    }
}

/// Tracks live [`Witness`]s and injects clone failures.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    live: Cell<isize>,
    clones: Cell<usize>,
    fail_at: Cell<Option<usize>>,
}

impl Ledger {
    pub(crate) fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub(crate) fn witness(self: &Rc<Self>, value: u32) -> Witness {
        self.live.set(self.live.get() + 1);
        Witness {
            value,
            ledger: self.clone(),
        }
    }

    pub(crate) fn live(&self) -> isize {
        self.live.get()
    }

    /// The `nth` clone from now on panics (1-based).
    pub(crate) fn fail_on_clone(&self, nth: usize) {
        self.fail_at.set(Some(self.clones.get() + nth));
    }
}

/// An element with observable construction and destruction.
pub(crate) struct Witness {
    pub(crate) value: u32,
    ledger: Rc<Ledger>,
}

impl Clone for Witness {
    fn clone(&self) -> Self {
        let clones = self.ledger.clones.get() + 1;
        self.ledger.clones.set(clones);
        if self.ledger.fail_at.get() == Some(clones) {
            self.ledger.fail_at.set(None);
            panic!("injected clone failure");
        }
        self.ledger.witness(self.value)
    }
}

impl Drop for Witness {
    fn drop(&mut self) {
        self.ledger.live.set(self.ledger.live.get() - 1);
    }
}

impl PartialEq for Witness {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq<u32> for Witness {
    fn eq(&self, other: &u32) -> bool {
        self.value == *other
    }
}

impl fmt::Debug for Witness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Witness({})", self.value)
    }
}
