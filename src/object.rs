use crate::allocator::{Word, ARRAY_HEADER_WORDS, ARRAY_LENGTH_WORD, HEADER_WORDS, WORD_BYTES};
use crate::descriptor::Descriptor;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

/// An untyped reference to an object in a [`crate::Heap`].
///
/// An object is a header word holding the address of its [`Descriptor`],
/// followed by its payload words. Objects never move, so the address stays
/// valid for as long as the object is reachable from a registered root.
/// Nothing about an `Object` keeps it alive, it must be stored in a rooted
/// slot to survive a collection.
#[repr(transparent)]
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Object {
    ptr: NonNull<Word>,
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object({:p})", self.ptr)
    }
}

impl Object {
    pub(crate) fn from_nonnull(ptr: NonNull<Word>) -> Self {
        Self { ptr }
    }

    /// # Safety
    ///
    /// `ptr` must be null or point at the header of a live object.
    pub unsafe fn from_raw(ptr: *mut Word) -> Option<Object> {
        NonNull::new(ptr).map(Self::from_nonnull)
    }

    pub fn as_ptr(self) -> *mut Word {
        self.ptr.as_ptr()
    }

    pub fn addr(self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// # Safety
    ///
    /// The object must be live.
    pub unsafe fn descriptor<'h>(self) -> Descriptor<'h> {
        Descriptor::from_raw(self.word(0) as *mut Word)
    }

    /// Size of the object in words, header included.
    ///
    /// # Safety
    ///
    /// The object must be live.
    pub unsafe fn size(self) -> usize {
        self.descriptor().size()
    }

    /// # Safety
    ///
    /// The object must be live and `index` inside it.
    pub unsafe fn word(self, index: usize) -> Word {
        self.as_ptr().add(index).read()
    }

    /// # Safety
    ///
    /// The object must be live and `index` inside it. Writing a pointer word
    /// this way is only sound when `value` is the address of a live object
    /// or zero.
    pub unsafe fn set_word(self, index: usize, value: Word) {
        self.as_ptr().add(index).write(value)
    }

    /// Reads the pointer field at word `index`.
    ///
    /// # Safety
    ///
    /// The object must be live and word `index` must be a pointer word.
    pub unsafe fn pointer(self, index: usize) -> Option<Object> {
        Object::from_raw(self.word(index) as *mut Word)
    }

    /// # Safety
    ///
    /// The object must be live, word `index` must be a pointer word and
    /// `value` must be live.
    pub unsafe fn set_pointer(self, index: usize, value: Option<Object>) {
        self.set_word(index, value.map_or(0, Object::addr))
    }

    /// Element count of a pointer or data array.
    ///
    /// # Safety
    ///
    /// The object must be a live array.
    pub unsafe fn len(self) -> usize {
        self.word(ARRAY_LENGTH_WORD)
    }

    /// # Safety
    ///
    /// The object must be a live pointer array and `index < len`.
    pub unsafe fn element(self, index: usize) -> Option<Object> {
        debug_assert!(index < self.len());

        self.pointer(ARRAY_HEADER_WORDS + index)
    }

    /// # Safety
    ///
    /// The object must be a live pointer array, `index < len` and `value`
    /// must be live.
    pub unsafe fn set_element(self, index: usize, value: Option<Object>) {
        debug_assert!(index < self.len());

        self.set_pointer(ARRAY_HEADER_WORDS + index, value)
    }

    /// The payload of a data array, rounded up to whole words.
    ///
    /// # Safety
    ///
    /// The object must be a live data array and the slice must not outlive
    /// it or alias another reference to the same payload.
    pub unsafe fn data_bytes<'a>(self) -> &'a mut [u8] {
        let words = self.size() - ARRAY_HEADER_WORDS;
        let data = self.as_ptr().add(ARRAY_HEADER_WORDS).cast::<u8>();

        std::slice::from_raw_parts_mut(data, words * WORD_BYTES)
    }

    pub(crate) fn payload(self) -> *mut Word {
        unsafe { self.as_ptr().add(HEADER_WORDS) }
    }
}

/// A typed reference to an object allocated with [`crate::Heap::alloc`].
///
/// Like [`Object`] this is a plain address, it has to be rooted to survive a
/// collection.
#[repr(transparent)]
pub struct Gc<T> {
    object: Object,
    _marker: PhantomData<*const T>,
}

impl<T> Copy for Gc<T> {}

impl<T> Clone for Gc<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Gc<T> {
    fn eq(&self, other: &Self) -> bool {
        self.object == other.object
    }
}

impl<T> Eq for Gc<T> {}

impl<T> fmt::Debug for Gc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Gc<{}>({:p})", std::any::type_name::<T>(), self.object.ptr)
    }
}

impl<T> From<Gc<T>> for Object {
    fn from(gc: Gc<T>) -> Object {
        gc.object
    }
}

impl<T> Gc<T> {
    /// # Safety
    ///
    /// `object` must have been allocated with the shape of `T`.
    pub unsafe fn from_object(object: Object) -> Self {
        Self {
            object,
            _marker: PhantomData,
        }
    }

    pub fn object(self) -> Object {
        self.object
    }

    pub fn as_ptr(self) -> *mut T {
        self.object.payload().cast()
    }

    /// # Safety
    ///
    /// The object must be live for all of `'a`, meaning it stays reachable
    /// from a root across every allocation made while the reference is held.
    pub unsafe fn get<'a>(self) -> &'a T {
        &*self.as_ptr()
    }

    /// # Safety
    ///
    /// Same as [`Gc::get`], and no other reference to the value may exist.
    pub unsafe fn get_mut<'a>(self) -> &'a mut T {
        &mut *self.as_ptr()
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::Object {}
    impl<T> Sealed for super::Gc<T> {}
}

/// Types that are a single non-null object address.
///
/// # Safety
///
/// Implementors must have the layout of a `NonNull<Word>` so that an
/// `Option` of them has the layout of an `Option<Object>`.
pub unsafe trait Reference: Copy + sealed::Sealed {
    fn to_object(self) -> Object;
}

unsafe impl Reference for Object {
    fn to_object(self) -> Object {
        self
    }
}

unsafe impl<T> Reference for Gc<T> {
    fn to_object(self) -> Object {
        self.object
    }
}
