use core::{fmt, marker::PhantomData, mem};
use serde_core::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, SeqAccess, Visitor},
    ser::SerializeSeq,
};

use crate::{RawAlloc, Storage};

/// Most memory a size hint alone may reserve up front.
const MAX_PREALLOC_BYTES: usize = 1024 * 1024;

/// Clamps a length announced by the input, which may be untrusted.
#[inline]
fn cautious_capacity<T>(hint: usize) -> usize {
    hint.min(MAX_PREALLOC_BYTES / mem::size_of::<T>().max(1))
}

impl<T: Serialize, const N: usize, A: RawAlloc> Serialize for Storage<T, N, A> {
    /// Serialize a `Storage` as a sequence.
    ///
    /// The format is identical whether the elements are inline or on the heap.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for element in self {
            seq.serialize_element(element)?;
        }
        seq.end()
    }
}

impl<'de, T: Deserialize<'de>, const N: usize, A: RawAlloc + Default> Deserialize<'de>
    for Storage<T, N, A>
{
    /// Deserialize a `Storage` from a sequence.
    ///
    /// If the sequence is longer than `N`, the elements are stored on the heap.
    /// An allocation failure is reported as a deserialization error.
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StorageVisitor<T, const N: usize, A> {
            _marker: PhantomData<(T, A)>,
        }

        impl<'de, T: Deserialize<'de>, const N: usize, A: RawAlloc + Default> Visitor<'de>
            for StorageVisitor<T, N, A>
        {
            type Value = Storage<T, N, A>;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a sequence")
            }

            fn visit_seq<S>(self, mut seq: S) -> Result<Self::Value, S::Error>
            where
                S: SeqAccess<'de>,
            {
                let mut vec: Storage<T, N, A> = Storage::new_in(A::default());
                if let Some(hint) = seq.size_hint() {
                    vec.try_reserve(cautious_capacity::<T>(hint))
                        .map_err(de::Error::custom)?;
                }

                while let Some(element) = seq.next_element()? {
                    vec.try_push(element).map_err(de::Error::custom)?;
                }

                Ok(vec)
            }
        }

        deserializer.deserialize_seq(StorageVisitor {
            _marker: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::cautious_capacity;
    use crate::{Storage, storage};
    use alloc::string::{String, ToString};

    #[test]
    fn inline_json() {
        let v: Storage<_, 5> = storage![1, 2, 3];
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, "[1,2,3]");
        let r: Storage<i32, 5> = serde_json::from_str(&s).unwrap();
        assert_eq!(r, [1, 2, 3]);
        assert!(!r.is_allocated());
    }

    #[test]
    fn spilled_json() {
        let v: Storage<String, 2> = (0..4).map(|i| i.to_string()).collect();
        let s = serde_json::to_string(&v).unwrap();
        assert_eq!(s, r#"["0","1","2","3"]"#);
        let r: Storage<String, 2> = serde_json::from_str(&s).unwrap();
        assert_eq!(r, v);
        assert!(r.is_allocated());
    }

    #[test]
    fn not_a_sequence() {
        assert!(serde_json::from_str::<Storage<i32, 2>>("{}").is_err());
    }

    #[test]
    fn size_hint_is_capped() {
        assert_eq!(cautious_capacity::<u8>(10), 10);
        assert_eq!(cautious_capacity::<u64>(usize::MAX), 128 * 1024);
        assert_eq!(cautious_capacity::<[u8; 3]>(1 << 20), (1 << 20) / 3);
        assert_eq!(cautious_capacity::<()>(usize::MAX), 1024 * 1024);
    }
}
