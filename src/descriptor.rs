use crate::allocator::{
    bitmap_words_for, words_for_bytes, Word, ARRAY_HEADER_WORDS, ARRAY_LENGTH_WORD,
    BITS_PER_WORD, DESCRIPTOR_FIXED_WORDS, DESCRIPTOR_SIZE_WORD, HEADER_WORDS, STORAGE_WORDS,
};
use crate::error::AllocError;
use crate::object::Object;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::ptr::NonNull;

// Bit 0 of the first bitmap word: the header word is a traceable reference.
const HEADER_BIT: Word = 1;

/// The layout of an object shape: its size in words and which of its words
/// hold references.
///
/// Signatures are normalized on construction so that equal shapes compare
/// equal, which is what lets the heap intern one descriptor per shape.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    size: usize,
    pointers: Box<[Word]>,
}

impl Signature {
    /// A record of `size` words, header included, whose bit `i` in `pointers`
    /// marks word `i` as a reference.
    ///
    /// Bit 0 is always set since the header references the descriptor. Bits
    /// past `size` are ignored.
    pub fn record(size: usize, pointers: &[Word]) -> Result<Self, AllocError> {
        Self::check_size(size)?;

        let mut bitmap = vec![0; bitmap_words_for(size)];

        for (dst, src) in bitmap.iter_mut().zip(pointers) {
            *dst = *src;
        }

        bitmap[0] |= HEADER_BIT;
        clear_past(&mut bitmap, size);

        Ok(Self {
            size,
            pointers: bitmap.into_boxed_slice(),
        })
    }

    /// A record of `size` words with no traceable words at all.
    pub fn opaque(size: usize) -> Result<Self, AllocError> {
        Self::check_size(size)?;

        Ok(Self {
            size,
            pointers: Box::new([0]),
        })
    }

    /// A pointer array of `length` elements: every word after the length
    /// word is a reference.
    pub fn pointer_array(length: usize) -> Result<Self, AllocError> {
        let size = length
            .checked_add(ARRAY_HEADER_WORDS)
            .ok_or(AllocError::BadRequest)?;

        Self::check_size(size)?;

        let mut bitmap = vec![Word::MAX; bitmap_words_for(size)];

        bitmap[0] &= !(1 << ARRAY_LENGTH_WORD);
        clear_past(&mut bitmap, size);

        Ok(Self {
            size,
            pointers: bitmap.into_boxed_slice(),
        })
    }

    /// A data array of `count` elements of `element_size` bytes each.
    pub fn data_array(count: usize, element_size: usize) -> Result<Self, AllocError> {
        let bytes = count
            .checked_mul(element_size)
            .ok_or(AllocError::BadRequest)?;
        let size = words_for_bytes(bytes)
            .checked_add(ARRAY_HEADER_WORDS)
            .ok_or(AllocError::BadRequest)?;

        Self::opaque(size)
    }

    /// The signature of descriptors that describe `descriptor_size` word
    /// descriptors: only their header is a reference.
    pub(crate) fn describing(descriptor_size: usize) -> Self {
        let mut bitmap = vec![0; bitmap_words_for(descriptor_size)];

        bitmap[0] = HEADER_BIT;

        Self {
            size: descriptor_size,
            pointers: bitmap.into_boxed_slice(),
        }
    }

    fn check_size(size: usize) -> Result<(), AllocError> {
        if size < HEADER_WORDS || size > STORAGE_WORDS {
            Err(AllocError::BadRequest)
        } else {
            Ok(())
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pointers(&self) -> &[Word] {
        &self.pointers
    }

    pub fn has_pointers(&self) -> bool {
        self.pointers[0] & HEADER_BIT != 0
    }

    pub fn is_pointer(&self, index: usize) -> bool {
        self.has_pointers()
            && index < self.size
            && self.pointers[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    /// Size in words of the descriptor object for this signature.
    pub fn descriptor_size(&self) -> usize {
        DESCRIPTOR_FIXED_WORDS + self.pointers.len()
    }

    /// Whether the descriptor for this signature is its own descriptor, the
    /// fixed point every chain of descriptor-descriptors ends in.
    pub(crate) fn is_self_describing(&self) -> bool {
        self.descriptor_size() == self.size && *self == Self::describing(self.size)
    }
}

fn clear_past(bitmap: &mut [Word], size: usize) {
    for (i, word) in bitmap.iter_mut().enumerate() {
        let first = i * BITS_PER_WORD;

        if first >= size {
            *word = 0;
        } else if size - first < BITS_PER_WORD {
            *word &= (1 << (size - first)) - 1;
        }
    }
}

/// A heap resident object shape.
///
/// Descriptors are objects themselves, laid out as a header, the size of the
/// objects they describe, and the pointer bitmap. Once created they are
/// permanent roots, so a descriptor stays valid for the lifetime `'h` of its
/// heap.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Descriptor<'h> {
    object: Object,
    _heap: PhantomData<&'h ()>,
}

impl<'h> Descriptor<'h> {
    /// # Safety
    ///
    /// `ptr` must point at a descriptor laid out as described above, valid
    /// for `'h`.
    pub(crate) unsafe fn from_raw(ptr: *mut Word) -> Self {
        Self {
            object: Object::from_nonnull(NonNull::new_unchecked(ptr)),
            _heap: PhantomData,
        }
    }

    pub(crate) unsafe fn from_object(object: Object) -> Self {
        Self::from_raw(object.as_ptr())
    }

    pub fn object(self) -> Object {
        self.object
    }

    /// Size in words of the objects this descriptor describes.
    pub fn size(self) -> usize {
        unsafe { self.object.word(DESCRIPTOR_SIZE_WORD) }
    }

    pub fn pointer_word(self, index: usize) -> Word {
        debug_assert!(index < self.bitmap_len());

        unsafe { self.object.word(DESCRIPTOR_FIXED_WORDS + index) }
    }

    /// Whether any word, the header included, of the described objects is
    /// traceable. Data arrays and opaque records have none.
    pub fn has_pointers(self) -> bool {
        self.pointer_word(0) & HEADER_BIT != 0
    }

    pub fn bitmap_len(self) -> usize {
        // Opaque descriptors only ever store a single, zero, bitmap word.
        let first = unsafe { self.object.word(DESCRIPTOR_FIXED_WORDS) };

        if first & HEADER_BIT != 0 {
            bitmap_words_for(self.size())
        } else {
            1
        }
    }

    pub fn is_pointer(self, index: usize) -> bool {
        self.has_pointers()
            && index < self.size()
            && self.pointer_word(index / BITS_PER_WORD) & (1 << (index % BITS_PER_WORD)) != 0
    }

    /// Calls `f` with the index of every traceable word, header included.
    pub fn for_each_pointer(self, mut f: impl FnMut(usize)) {
        if !self.has_pointers() {
            return;
        }

        let size = self.size();

        for i in 0..self.bitmap_len() {
            let mut bits = self.pointer_word(i);

            while bits != 0 {
                let index = i * BITS_PER_WORD + bits.trailing_zeros() as usize;

                if index >= size {
                    return;
                }

                f(index);
                bits &= bits - 1;
            }
        }
    }

    pub fn signature(self) -> Signature {
        let pointers = (0..self.bitmap_len()).map(|i| self.pointer_word(i)).collect();

        Signature {
            size: self.size(),
            pointers,
        }
    }
}

/// Interning table for descriptors, keyed by signature and, for typed
/// allocation, by Rust type.
#[derive(Default)]
pub struct DescriptorTable {
    by_signature: HashMap<Signature, Object>,
    by_type: HashMap<TypeId, Object>,
    objects: HashSet<Object>,
}

impl DescriptorTable {
    pub fn get(&self, signature: &Signature) -> Option<Object> {
        self.by_signature.get(signature).copied()
    }

    pub fn insert(&mut self, signature: Signature, descriptor: Object) {
        self.by_signature.insert(signature, descriptor);
        self.objects.insert(descriptor);
    }

    /// Whether `object` is one of this table's descriptors.
    pub fn contains(&self, object: Object) -> bool {
        self.objects.contains(&object)
    }

    pub fn get_type(&self, id: TypeId) -> Option<Object> {
        self.by_type.get(&id).copied()
    }

    pub fn insert_type(&mut self, id: TypeId, descriptor: Object) {
        self.by_type.insert(id, descriptor);
    }

    pub fn len(&self) -> usize {
        self.by_signature.len()
    }
}
