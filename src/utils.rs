/// Compile-time check for zero sized types.
///
/// The branches guarded by `T::IS_ZST` are constant and removed by the compiler.
pub(crate) trait IsZST {
    const IS_ZST: bool;
}

impl<T> IsZST for T {
    const IS_ZST: bool = core::mem::size_of::<T>() == 0;
}

/// Marks the enclosing branch as unlikely.
#[cold]
#[inline(always)]
pub(crate) const fn cold_path() {}

#[inline(always)]
pub(crate) fn split_range_bound(
    src: &impl core::ops::RangeBounds<usize>,
    len: usize,
) -> (usize, usize) {
    let start = match src.start_bound() {
        core::ops::Bound::Included(&i) => i,
        core::ops::Bound::Excluded(&i) => i.checked_add(1).expect("range start overflows usize"),
        core::ops::Bound::Unbounded => 0,
    };

    let end = match src.end_bound() {
        core::ops::Bound::Included(&i) => i.checked_add(1).expect("range end overflows usize"),
        core::ops::Bound::Excluded(&i) => i,
        core::ops::Bound::Unbounded => len,
    };
    (start, end)
}

/// `tracing::trace!` when the `tracing` feature is enabled, nothing otherwise.
macro_rules! _trace {
    ($($tt:tt)+) => {
        #[cfg(feature = "tracing")]
        tracing::trace!($($tt)+);
    };
}

pub(crate) use _trace;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_normalized() {
        assert_eq!(split_range_bound(&(1..3), 10), (1, 3));
        assert_eq!(split_range_bound(&(1..=3), 10), (1, 4));
        assert_eq!(split_range_bound(&(..), 10), (0, 10));
        assert_eq!(split_range_bound(&(4..), 10), (4, 10));
        assert_eq!(split_range_bound(&(..2), 10), (0, 2));
    }

    #[test]
    #[should_panic(expected = "range start overflows usize")]
    fn excluded_start_at_max() {
        use core::ops::Bound;
        split_range_bound(&(Bound::Excluded(usize::MAX), Bound::Unbounded), 10);
    }

    #[test]
    #[should_panic(expected = "range end overflows usize")]
    fn included_end_at_max() {
        split_range_bound(&(0..=usize::MAX), 10);
    }

    #[test]
    fn zst_detection() {
        assert!(<()>::IS_ZST);
        assert!(<[u64; 0]>::IS_ZST);
        assert!(!u8::IS_ZST);
    }
}
