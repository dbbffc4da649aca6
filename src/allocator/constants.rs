use std::mem::size_of;

/// The unit of allocation. Every object is a whole number of words.
pub type Word = usize;

pub const WORD_BYTES: usize = size_of::<Word>();
pub const BITS_PER_WORD: usize = Word::BITS as usize;

// Pools are POOL_BYTES large and POOL_BYTES aligned, so masking any interior
// pointer with POOL_MASK yields the pool that owns it.
pub const POOL_SIZE_BITS: usize = 17;
pub const POOL_BYTES: usize = 1 << POOL_SIZE_BITS;
pub const POOL_MASK: usize = !(POOL_BYTES - 1);
pub const POOL_WORDS: usize = POOL_BYTES / WORD_BYTES;

// One occupancy bit per word of the pool. The bits covering the pool's own
// metadata are never used, which keeps the bit index equal to the storage
// word index.
pub const BITMAP_WORDS: usize = POOL_WORDS / BITS_PER_WORD;

// Every object starts with a single header word holding its descriptor.
pub const HEADER_WORDS: usize = 1;

// Arrays store their element count right after the header.
pub const ARRAY_LENGTH_WORD: usize = HEADER_WORDS;
pub const ARRAY_HEADER_WORDS: usize = HEADER_WORDS + 1;

// A descriptor is a header, a size word, then its pointer bitmap.
pub const DESCRIPTOR_SIZE_WORD: usize = HEADER_WORDS;
pub const DESCRIPTOR_FIXED_WORDS: usize = HEADER_WORDS + 1;

/// Number of bitmap words needed to describe an object of `size` words.
pub const fn bitmap_words_for(size: usize) -> usize {
    size.div_ceil(BITS_PER_WORD)
}

/// Rounds a byte count up to whole words.
pub const fn words_for_bytes(bytes: usize) -> usize {
    bytes.div_ceil(WORD_BYTES)
}
