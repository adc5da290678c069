use std::io::{self, IoSlice, Write};

use crate::{RawAlloc, Storage, StorageError, value_source::CopySlice};

impl From<StorageError> for io::Error {
    fn from(err: StorageError) -> Self {
        io::Error::new(io::ErrorKind::OutOfMemory, err)
    }
}

/// Write is implemented for `Storage<u8, N, A>` by appending to the storage.
/// The storage will grow as needed.
///
/// A refused allocation is reported as [`io::ErrorKind::OutOfMemory`] and
/// leaves the storage unchanged.
impl<const N: usize, A: RawAlloc> Write for Storage<u8, N, A> {
    #[inline]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.try_insert_from(self.len(), CopySlice::new(buf), buf.len())?;
        Ok(buf.len())
    }

    #[inline(always)]
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    #[inline]
    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        let num = bufs.iter().map(|b| b.len()).sum::<usize>();
        let total = self.len().checked_add(num).ok_or(StorageError::CapacityOverflow)?;

        self.try_reserve(total)?;
        for buf in bufs {
            self.try_insert_from(self.len(), CopySlice::new(buf), buf.len())?;
        }

        Ok(num)
    }

    #[inline]
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        Write::write(self, buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::CountingAlloc;

    #[test]
    fn write_and_vectored() {
        let mut v: Storage<u8, 4> = Storage::new();

        let n = v.write(b"hello").unwrap();
        assert_eq!(n, 5);
        assert_eq!(v.len(), 5);
        assert_eq!(v, b"hello");

        let bufs = [IoSlice::new(b" "), IoSlice::new(b"world")];
        let n = v.write_vectored(&bufs).unwrap();
        assert_eq!(n, 6);
        assert_eq!(v, b"hello world");
    }

    #[test]
    fn write_all_grows() {
        let mut v: Storage<u8, 3> = Storage::new();
        let data = [b'x'; 257];
        v.write_all(&data).unwrap();
        assert_eq!(v.len(), 257);
        assert!(v.as_slice().iter().all(|&c| c == b'x'));
    }

    #[test]
    fn refused_allocation_is_out_of_memory() {
        let alloc = CountingAlloc::default();
        let mut v: Storage<u8, 2, CountingAlloc> = Storage::new_in(alloc.clone());
        v.write_all(b"ab").unwrap();

        alloc.stats.fail_next_allocation();
        let err = v.write(b"cde").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::OutOfMemory);
        assert_eq!(v, b"ab");
        assert_eq!(alloc.stats.outstanding(), 0);
    }
}
