use core::{
    alloc::Layout,
    fmt::{self, Display, Formatter},
};

/// Errors of the fallible (`try_*`) operations of [`Storage`](crate::Storage).
///
/// Whenever one of these is returned the storage is left exactly as it was before the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// The requested capacity exceeds `isize::MAX` bytes or overflows `usize`.
    CapacityOverflow,
    /// The allocator could not provide a block for `layout`.
    AllocError {
        /// Layout of the refused request.
        layout: Layout,
    },
}

impl StorageError {
    /// Hands the error to the standard allocation failure handling.
    ///
    /// Used by the infallible twins of the `try_*` operations.
    #[cold]
    #[inline(never)]
    pub(crate) fn handle(self) -> ! {
        match self {
            Self::CapacityOverflow => panic!("capacity overflow"),
            Self::AllocError { layout } => alloc::alloc::handle_alloc_error(layout),
        }
    }
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::CapacityOverflow => f.write_str("storage capacity overflow"),
            Self::AllocError { layout } => write!(
                f,
                "memory allocation of {} bytes (align {}) failed",
                layout.size(),
                layout.align()
            ),
        }
    }
}

impl core::error::Error for StorageError {}

#[inline(always)]
pub(crate) fn infallible<R>(result: Result<R, StorageError>) -> R {
    match result {
        Ok(value) => value,
        Err(err) => err.handle(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn display_messages() {
        assert_eq!(
            StorageError::CapacityOverflow.to_string(),
            "storage capacity overflow"
        );
        let layout = Layout::array::<u32>(4).unwrap();
        assert_eq!(
            StorageError::AllocError { layout }.to_string(),
            "memory allocation of 16 bytes (align 4) failed"
        );
    }

    #[test]
    #[should_panic(expected = "capacity overflow")]
    fn infallible_panics_on_overflow() {
        infallible::<()>(Err(StorageError::CapacityOverflow));
    }
}
