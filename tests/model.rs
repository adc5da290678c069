//! Random operation sequences checked against `Vec`.

use proptest::prelude::*;
use spillvec::{Storage, value_source::{CopySlice, CopyValue}};

const INLINE: usize = 4;

#[derive(Clone, Debug)]
enum Op {
    Push(i32),
    Pop,
    Insert(usize, Vec<i32>),
    Erase(usize, usize),
    Resize(usize, i32),
    Assign(usize, i32),
    Reserve(usize),
    Truncate(usize),
    Shrink,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<i32>().prop_map(Op::Push),
        Just(Op::Pop),
        (any::<usize>(), proptest::collection::vec(any::<i32>(), 0..6))
            .prop_map(|(at, values)| Op::Insert(at, values)),
        (any::<usize>(), any::<usize>()).prop_map(|(at, count)| Op::Erase(at, count)),
        (0usize..40, any::<i32>()).prop_map(|(len, value)| Op::Resize(len, value)),
        (0usize..40, any::<i32>()).prop_map(|(len, value)| Op::Assign(len, value)),
        (0usize..64).prop_map(Op::Reserve),
        (0usize..40).prop_map(Op::Truncate),
        Just(Op::Shrink),
    ]
}

fn apply(storage: &mut Storage<i32, INLINE>, model: &mut Vec<i32>, op: &Op) {
    match op {
        Op::Push(value) => {
            storage.push(*value);
            model.push(*value);
        }
        Op::Pop => assert_eq!(storage.pop(), model.pop()),
        Op::Insert(at, values) => {
            let at = at % (model.len() + 1);
            let returned = storage.insert_from(at, CopySlice::new(values), values.len());
            assert_eq!(returned, at);
            model.splice(at..at, values.iter().copied());
        }
        Op::Erase(at, count) => {
            let from = at % (model.len() + 1);
            let to = from + count % (model.len() - from + 1);
            assert_eq!(storage.erase(from..to), from);
            model.drain(from..to);
        }
        Op::Resize(len, value) => {
            storage.resize(*len, *value);
            model.resize(*len, *value);
        }
        Op::Assign(len, value) => {
            storage.assign(CopyValue::new(value), *len);
            model.clear();
            model.resize(*len, *value);
        }
        Op::Reserve(capacity) => storage.reserve(*capacity),
        Op::Truncate(len) => {
            storage.truncate(*len);
            model.truncate(*len);
        }
        Op::Shrink => storage.shrink_to_fit(),
    }
}

proptest! {
    #[test]
    fn behaves_like_vec(ops in proptest::collection::vec(op(), 1..60)) {
        let mut storage: Storage<i32, INLINE> = Storage::new();
        let mut model = Vec::new();
        let mut last_capacity = storage.capacity();

        for op in &ops {
            apply(&mut storage, &mut model, op);

            prop_assert_eq!(storage.as_slice(), model.as_slice());
            prop_assert!(storage.capacity() >= storage.len());
            if !storage.is_allocated() {
                prop_assert_eq!(storage.capacity(), INLINE);
            }
            if !matches!(op, Op::Shrink) {
                prop_assert!(storage.capacity() >= last_capacity);
            }
            last_capacity = storage.capacity();
        }
    }

    #[test]
    fn swap_is_symmetric(
        left in proptest::collection::vec(any::<i32>(), 0..10),
        right in proptest::collection::vec(any::<i32>(), 0..10),
    ) {
        let mut a: Storage<i32, INLINE> = Storage::from_copy_slice(&left);
        let mut b: Storage<i32, INLINE> = Storage::from_copy_slice(&right);
        let (a_heap, b_heap) = (a.is_allocated(), b.is_allocated());

        a.swap(&mut b);
        prop_assert_eq!(a.as_slice(), right.as_slice());
        prop_assert_eq!(b.as_slice(), left.as_slice());
        prop_assert_eq!(a.is_allocated(), b_heap);
        prop_assert_eq!(b.is_allocated(), a_heap);

        b.swap(&mut a);
        prop_assert_eq!(a.as_slice(), left.as_slice());
        prop_assert_eq!(b.as_slice(), right.as_slice());
    }

    #[test]
    fn insert_then_erase_restores(
        base in proptest::collection::vec(any::<i32>(), 0..12),
        extra in proptest::collection::vec(any::<i32>(), 0..12),
        at in any::<usize>(),
    ) {
        let mut storage: Storage<i32, INLINE> = Storage::from_copy_slice(&base);
        let at = at % (base.len() + 1);
        let first = storage.insert_from(at, CopySlice::new(&extra), extra.len());
        prop_assert_eq!(&storage[first..first + extra.len()], extra.as_slice());

        storage.erase(first..first + extra.len());
        prop_assert_eq!(storage.as_slice(), base.as_slice());
    }
}
