use crate::allocator::{words_for_bytes, Word, BITS_PER_WORD, HEADER_WORDS, WORD_BYTES};
use crate::descriptor::Signature;
use crate::error::AllocError;
use crate::object::{Gc, Object};
use std::cell::Cell;
use std::marker::PhantomData;
use std::mem::{align_of, size_of};

/// Collects the pointer words of a payload while its fields describe
/// themselves.
pub struct ShapeBuilder {
    size: usize,
    pointers: Vec<Word>,
}

impl ShapeBuilder {
    pub fn new(payload_bytes: usize) -> Self {
        let size = HEADER_WORDS + words_for_bytes(payload_bytes);

        Self {
            size,
            pointers: vec![0; size.div_ceil(BITS_PER_WORD)],
        }
    }

    /// Declares the word at byte `offset` of the payload a reference.
    pub fn pointer_at(&mut self, offset: usize) {
        debug_assert_eq!(offset % WORD_BYTES, 0);

        let index = HEADER_WORDS + offset / WORD_BYTES;

        debug_assert!(index < self.size);
        self.pointers[index / BITS_PER_WORD] |= 1 << (index % BITS_PER_WORD);
    }

    pub fn finish(self) -> Result<Signature, AllocError> {
        Signature::record(self.size, &self.pointers)
    }
}

/// A value that may live in the payload of a heap object.
///
/// # Safety
///
/// An all zero bit pattern must be a valid value of the type, since objects
/// are handed out zeroed, and `describe` must report every word holding an
/// object reference.
pub unsafe trait Field {
    fn describe(builder: &mut ShapeBuilder, offset: usize);
}

/// A type that [`crate::Heap::alloc`] can allocate. Derive it with
/// `#[derive(Shape)]`.
///
/// # Safety
///
/// The type must not need dropping, the heap never runs destructors.
pub unsafe trait Shape: Field + Sized + 'static {
    fn signature() -> Result<Signature, AllocError> {
        // Payloads start one word into the object.
        if align_of::<Self>() > WORD_BYTES {
            return Err(AllocError::BadRequest);
        }

        let mut builder = ShapeBuilder::new(size_of::<Self>());

        Self::describe(&mut builder, 0);
        builder.finish()
    }
}

macro_rules! impl_leaf_field {
    ($($t:ty),*) => {
        $(
            unsafe impl Field for $t {
                fn describe(_: &mut ShapeBuilder, _: usize) {}
            }
        )*
    };
}

impl_leaf_field!(
    (), bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64
);

unsafe impl<T> Field for PhantomData<T> {
    fn describe(_: &mut ShapeBuilder, _: usize) {}
}

unsafe impl<T> Field for Option<Gc<T>> {
    fn describe(builder: &mut ShapeBuilder, offset: usize) {
        builder.pointer_at(offset);
    }
}

unsafe impl Field for Option<Object> {
    fn describe(builder: &mut ShapeBuilder, offset: usize) {
        builder.pointer_at(offset);
    }
}

unsafe impl<F: Field> Field for Cell<F> {
    fn describe(builder: &mut ShapeBuilder, offset: usize) {
        F::describe(builder, offset);
    }
}

unsafe impl<F: Field, const N: usize> Field for [F; N] {
    fn describe(builder: &mut ShapeBuilder, offset: usize) {
        for i in 0..N {
            F::describe(builder, offset + i * size_of::<F>());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Shape;

    #[derive(Shape)]
    struct Leaf {
        a: u64,
        b: u32,
    }

    #[derive(Shape)]
    struct Node {
        value: u64,
        left: Cell<Option<Gc<Node>>>,
        right: Cell<Option<Gc<Node>>>,
    }

    #[derive(Shape)]
    struct Wide {
        slots: [Option<Object>; 70],
    }

    #[derive(Shape)]
    struct Pair(Option<Object>, Option<Object>);

    #[derive(Shape)]
    struct Empty;

    #[repr(align(16))]
    struct Aligned(u64);

    unsafe impl Field for Aligned {
        fn describe(_: &mut ShapeBuilder, _: usize) {}
    }

    unsafe impl Shape for Aligned {}

    #[test]
    fn leaf_records_only_trace_the_header() {
        let sig = Leaf::signature().unwrap();

        assert_eq!(sig.size(), 3);
        assert_eq!(sig.pointers(), &[0b1]);
    }

    #[test]
    fn reference_fields_are_found_by_offset() {
        let sig = Node::signature().unwrap();

        assert_eq!(sig.size(), 4);
        assert_eq!(sig.pointers().iter().map(|w| w.count_ones()).sum::<u32>(), 3);
        assert!(sig.is_pointer(0));
        assert!((1..4).filter(|&i| sig.is_pointer(i)).count() == 2);
    }

    #[test]
    fn tuple_structs_and_unit_structs() {
        assert_eq!(Pair::signature().unwrap().pointers(), &[0b111]);
        assert_eq!(Empty::signature().unwrap().size(), 1);
    }

    #[test]
    fn large_records_need_several_bitmap_words() {
        let sig = Wide::signature().unwrap();

        assert_eq!(sig.size(), 71);
        assert_eq!(sig.pointers().len(), 2);
        assert!((0..71).all(|i| sig.is_pointer(i)));
    }

    #[test]
    fn over_aligned_types_are_rejected() {
        assert_eq!(Aligned::signature(), Err(AllocError::BadRequest));
    }
}
