//! Slice-like trait impls for [`Storage`].

use alloc::borrow::{Borrow, BorrowMut};
use core::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    ops::{Deref, DerefMut, Index, IndexMut},
    slice::{self, SliceIndex},
};

use super::Storage;
use crate::raw_alloc::RawAlloc;

impl<T, const N: usize, A: RawAlloc> Deref for Storage<T, N, A> {
    type Target = [T];
    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_slice()
    }
}

impl<T, const N: usize, A: RawAlloc> DerefMut for Storage<T, N, A> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.as_mut_slice()
    }
}

impl<T: fmt::Debug, const N: usize, A: RawAlloc> fmt::Debug for Storage<T, N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_slice(), f)
    }
}

impl<T, const N: usize, A: RawAlloc> AsRef<[T]> for Storage<T, N, A> {
    #[inline]
    fn as_ref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize, A: RawAlloc> AsMut<[T]> for Storage<T, N, A> {
    #[inline]
    fn as_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T, const N: usize, A: RawAlloc> Borrow<[T]> for Storage<T, N, A> {
    #[inline]
    fn borrow(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T, const N: usize, A: RawAlloc> BorrowMut<[T]> for Storage<T, N, A> {
    #[inline]
    fn borrow_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

impl<T: Hash, const N: usize, A: RawAlloc> Hash for Storage<T, N, A> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        Hash::hash(self.as_slice(), state);
    }
}

impl<T, I: SliceIndex<[T]>, const N: usize, A: RawAlloc> Index<I> for Storage<T, N, A> {
    type Output = I::Output;
    #[inline]
    fn index(&self, index: I) -> &Self::Output {
        Index::index(self.as_slice(), index)
    }
}

impl<T, I: SliceIndex<[T]>, const N: usize, A: RawAlloc> IndexMut<I> for Storage<T, N, A> {
    #[inline]
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        IndexMut::index_mut(self.as_mut_slice(), index)
    }
}

impl<'a, T, const N: usize, A: RawAlloc> IntoIterator for &'a Storage<T, N, A> {
    type Item = &'a T;
    type IntoIter = slice::Iter<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.as_slice().iter()
    }
}

impl<'a, T, const N: usize, A: RawAlloc> IntoIterator for &'a mut Storage<T, N, A> {
    type Item = &'a mut T;
    type IntoIter = slice::IterMut<'a, T>;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.as_mut_slice().iter_mut()
    }
}

impl<T: Ord, const N: usize, A: RawAlloc> Ord for Storage<T, N, A> {
    #[inline]
    fn cmp(&self, other: &Self) -> Ordering {
        Ord::cmp(self.as_slice(), other.as_slice())
    }
}

impl<T: PartialOrd, const N: usize, A: RawAlloc> PartialOrd for Storage<T, N, A> {
    #[inline]
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        PartialOrd::partial_cmp(self.as_slice(), other.as_slice())
    }
}

impl<T: Eq, const N: usize, A: RawAlloc> Eq for Storage<T, N, A> {}

// Equality ignores layout and inline capacity.
impl<T, U, const N: usize, const M: usize, A: RawAlloc, B: RawAlloc> PartialEq<Storage<U, M, B>>
    for Storage<T, N, A>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, other: &Storage<U, M, B>) -> bool {
        PartialEq::eq(self.as_slice(), other.as_slice())
    }
}

impl<T, U, const N: usize, A: RawAlloc> PartialEq<[U]> for Storage<T, N, A>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, other: &[U]) -> bool {
        PartialEq::eq(self.as_slice(), other)
    }
}

impl<T, U, const N: usize, A: RawAlloc> PartialEq<&[U]> for Storage<T, N, A>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, other: &&[U]) -> bool {
        PartialEq::eq(self.as_slice(), *other)
    }
}

impl<T, U, const N: usize, const P: usize, A: RawAlloc> PartialEq<[U; P]> for Storage<T, N, A>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, other: &[U; P]) -> bool {
        PartialEq::eq(self.as_slice(), other.as_slice())
    }
}

impl<T, U, const N: usize, const P: usize, A: RawAlloc> PartialEq<&[U; P]> for Storage<T, N, A>
where
    T: PartialEq<U>,
{
    #[inline]
    fn eq(&self, other: &&[U; P]) -> bool {
        PartialEq::eq(self.as_slice(), other.as_slice())
    }
}
