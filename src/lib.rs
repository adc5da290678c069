//! ## Intro
//!
//! An inline-first vector storage engine: up to `N` elements live inside the value
//! itself, and the storage spills to a heap buffer from a pluggable allocator when it
//! grows past that.
//!
//! Similar to [`SmallVec`], but every populating operation is transactional:
//! if producing an element panics, or the allocator refuses memory, the storage is
//! left exactly as it was before the call.
//!
//! ```
//! # use spillvec::{Storage, storage};
//! let mut vec: Storage<i32, 4> = storage![1, 2, 3];
//! assert!(!vec.is_allocated()); // Still inline
//!
//! vec.extend(&[4, 5, 6, 7, 8]);
//! assert!(vec.is_allocated()); // Now on the heap
//! assert_eq!(vec.capacity(), 8);
//!
//! vec.truncate(2);
//! vec.shrink_to_fit();
//! assert!(!vec.is_allocated()); // Back inline
//! ```
//!
//! ## Populating from a value source
//!
//! [`assign`](Storage::assign), [`resize_from`](Storage::resize_from),
//! [`insert_from`](Storage::insert_from) and the constructors take a
//! [`ValueSource`](value_source::ValueSource) plus a count. The sources in
//! [`value_source`] cover clones of one element, clones or flat copies of a slice,
//! values moved out of an iterator, closures and `T::default()`.
//!
//! ## Allocators
//!
//! Heap buffers come from a [`RawAlloc`]. The default, [`Global`], uses the global
//! allocator and lets trivially copyable runs be copied with a single `memcpy`.
//!
//! ## Fallible operations
//!
//! Every operation that may allocate has a `try_*` twin returning [`StorageError`].
//! The plain versions panic on capacity overflow and call
//! [`handle_alloc_error`](alloc::alloc::handle_alloc_error) when the allocator fails.
//!
//! ## `no_std` support
//!
//! This crate requires only `core` and `alloc`.
//!
//! ## Optional features
//!
//! ### `serde`
//!
//! [`Storage`] implements the [`serde::Serialize`] and [`serde::Deserialize`] traits.
//!
//! ### `std`
//!
//! `Storage<u8, N, A>` implements [`std::io::Write`].
//!
//! ### `tracing`
//!
//! Spills, reallocations and moves back inline are reported at `TRACE` level.
//!
//! [`serde::Serialize`]: https://docs.rs/serde/latest/serde/trait.Serialize.html
//! [`serde::Deserialize`]: https://docs.rs/serde/latest/serde/trait.Deserialize.html
//! [`std::io::Write`]: https://doc.rust-lang.org/std/io/trait.Write.html
//! [`SmallVec`]: https://docs.rs/smallvec/latest/smallvec
#![no_std]

extern crate alloc;

#[cfg(any(test, feature = "std"))]
extern crate std;

mod utils;

mod elements;
mod error;
mod transaction;

pub mod raw_alloc;
pub mod value_source;

pub mod storage;

#[cfg(feature = "serde")]
mod serde;

#[cfg(feature = "std")]
mod std_io;

#[cfg(test)]
mod test_utils;

#[doc(inline)]
pub use error::StorageError;

#[doc(inline)]
pub use raw_alloc::{Global, RawAlloc};

#[doc(inline)]
pub use storage::Storage;
