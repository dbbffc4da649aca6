use super::block::Block;
use super::constants::{
    words_for_bytes, Word, BITMAP_WORDS, BITS_PER_WORD, POOL_BYTES, POOL_MASK, POOL_WORDS,
    WORD_BYTES,
};
use std::mem::size_of;
use std::ptr::NonNull;

/// Cached knowledge about the largest run of free words in a pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FreeMax {
    /// Nothing has been freed since the pool was handed out, only the bump
    /// cursor can satisfy requests.
    Fresh,
    /// Words may have been freed, any request is worth a scan.
    Unknown,
    /// A scan for this many words failed, only smaller requests may succeed.
    Below(usize),
}

/// Metadata stored at the very start of every pool.
///
/// Word indices are relative to the pool base, so the occupancy bit of a
/// word is simply its index. The bits that cover the metadata itself are
/// never set.
#[repr(C)]
pub struct PoolMeta {
    free: usize,
    first_free: usize,
    free_max: FreeMax,
    survivors: usize,
    bits: [Word; BITMAP_WORDS],
}

/// Index of the first storage word of every pool.
pub const STORAGE_START: usize = words_for_bytes(size_of::<PoolMeta>());

/// Number of words a single pool can hand out, which is also the largest
/// object a heap can allocate.
pub const STORAGE_WORDS: usize = POOL_WORDS - STORAGE_START;

impl PoolMeta {
    /// Finds the metadata of the pool owning `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must point into a live pool and no other reference to that
    /// pool's metadata may be active while the returned one is used.
    pub unsafe fn from_ptr<'a>(ptr: *const Word) -> &'a mut PoolMeta {
        &mut *(((ptr as usize) & POOL_MASK) as *mut PoolMeta)
    }

    pub fn index_of(ptr: *const Word) -> usize {
        ((ptr as usize) & !POOL_MASK) / WORD_BYTES
    }

    pub fn is_set(&self, index: usize) -> bool {
        debug_assert!(index < POOL_WORDS);

        self.bits[index / BITS_PER_WORD] & (1 << (index % BITS_PER_WORD)) != 0
    }

    pub fn set_range(&mut self, start: usize, len: usize) {
        for_each_mask(start, len, |word, mask| self.bits[word] |= mask);
    }

    pub fn clear_range(&mut self, start: usize, len: usize) {
        for_each_mask(start, len, |word, mask| self.bits[word] &= !mask);
    }

    fn count_set(&self) -> usize {
        self.bits.iter().map(|word| word.count_ones() as usize).sum()
    }
}

// Calls `f` with every bitmap word touched by the range, along with the mask
// of the bits inside the range.
fn for_each_mask(start: usize, len: usize, mut f: impl FnMut(usize, Word)) {
    let end = start + len;
    let mut index = start;

    debug_assert!(end <= POOL_WORDS);

    while index < end {
        let bit = index % BITS_PER_WORD;
        let span = (BITS_PER_WORD - bit).min(end - index);
        let mask = if span == BITS_PER_WORD {
            Word::MAX
        } else {
            ((1 << span) - 1) << bit
        };

        f(index / BITS_PER_WORD, mask);
        index += span;
    }
}

/// A pool-sized, pool-aligned block with its occupancy bitmap and bump
/// cursor.
pub struct Pool {
    block: Block,
}

impl Pool {
    pub fn new(block: Block) -> Pool {
        debug_assert_eq!(block.get_size(), POOL_BYTES);
        debug_assert_eq!(block.as_ptr() as usize % POOL_BYTES, 0);

        let mut pool = Pool { block };

        pool.reset();
        pool
    }

    pub fn into_block(self) -> Block {
        self.block
    }

    /// Returns the pool to the state of a freshly acquired one.
    pub fn reset(&mut self) {
        let meta = PoolMeta {
            free: STORAGE_START,
            first_free: STORAGE_START,
            free_max: FreeMax::Fresh,
            survivors: 0,
            bits: [0; BITMAP_WORDS],
        };

        // The block may be uninitialized memory, so write without reading.
        unsafe { self.block.as_ptr().cast::<PoolMeta>().write(meta) }
    }

    fn meta(&self) -> &PoolMeta {
        unsafe { &*(self.block.as_ptr() as *const PoolMeta) }
    }

    fn meta_mut(&mut self) -> &mut PoolMeta {
        unsafe { &mut *(self.block.as_ptr() as *mut PoolMeta) }
    }

    pub fn base(&self) -> *mut Word {
        self.block.as_ptr().cast()
    }

    pub fn word_ptr(&self, index: usize) -> NonNull<Word> {
        debug_assert!((STORAGE_START..POOL_WORDS).contains(&index));

        unsafe { NonNull::new_unchecked(self.base().add(index)) }
    }

    pub fn contains(&self, ptr: *const Word) -> bool {
        (ptr as usize) & POOL_MASK == self.base() as usize
            && PoolMeta::index_of(ptr) >= STORAGE_START
    }

    pub fn capacity(&self) -> usize {
        STORAGE_WORDS
    }

    pub fn bump_cursor(&self) -> usize {
        self.meta().free
    }

    pub fn first_free(&self) -> usize {
        self.meta().first_free
    }

    pub fn free_max(&self) -> FreeMax {
        self.meta().free_max
    }

    pub fn survivors(&self) -> usize {
        self.meta().survivors
    }

    pub fn take_survivors(&mut self) -> usize {
        std::mem::take(&mut self.meta_mut().survivors)
    }

    pub fn is_occupied(&self, index: usize) -> bool {
        self.meta().is_set(index)
    }

    pub fn occupied_words(&self) -> usize {
        self.meta().count_set()
    }

    pub fn bitmap(&self) -> &[Word] {
        &self.meta().bits
    }

    /// Whether a reuse scan for `size` words could possibly succeed.
    pub fn should_search(&self, size: usize) -> bool {
        match self.meta().free_max {
            FreeMax::Fresh => false,
            FreeMax::Unknown => true,
            FreeMax::Below(max) => size < max,
        }
    }

    /// First-fit scan for `size` contiguous free words below the bump cursor.
    ///
    /// Moves `first_free` up to the first free word seen, every word before
    /// it is known to be occupied.
    pub fn find_free(&mut self, size: usize) -> Option<usize> {
        let meta = self.meta_mut();
        let limit = meta.free;
        let mut index = meta.first_free;
        let mut run_start = index;
        let mut streak = 0;
        let mut seen_free = false;

        while index < limit {
            if meta.is_set(index) {
                streak = 0;

                let word = index / BITS_PER_WORD;
                if index % BITS_PER_WORD == 0 && meta.bits[word] == Word::MAX {
                    index += BITS_PER_WORD;
                } else {
                    index += 1;
                }

                continue;
            }

            if !seen_free {
                meta.first_free = index;
                seen_free = true;
            }

            if streak == 0 {
                run_start = index;
            }

            streak += 1;

            if streak == size {
                return Some(run_start);
            }

            index += 1;
        }

        if !seen_free {
            meta.first_free = limit;
        }

        None
    }

    /// Records a failed scan so that requests of `size` words or more skip
    /// straight to the bump cursor until the next mark.
    pub fn search_failed(&mut self, size: usize) {
        self.meta_mut().free_max = FreeMax::Below(size);
    }

    pub fn bump(&mut self, size: usize) -> Option<usize> {
        let meta = self.meta_mut();
        let index = meta.free;

        if index + size > POOL_WORDS {
            return None;
        }

        meta.free += size;
        meta.set_range(index, size);

        Some(index)
    }

    pub fn occupy(&mut self, index: usize, size: usize) {
        self.meta_mut().set_range(index, size);
    }

    /// Returns `size` words at `index` to the free bitmap.
    pub fn release(&mut self, index: usize, size: usize) {
        let meta = self.meta_mut();

        meta.clear_range(index, size);
        meta.first_free = meta.first_free.min(index);
        meta.free_max = FreeMax::Unknown;
    }

    /// Forgets every occupied word, marking rebuilds the set from the roots.
    pub fn reset_marks(&mut self) {
        let meta = self.meta_mut();

        meta.bits = [0; BITMAP_WORDS];
        meta.first_free = STORAGE_START;
        meta.free_max = FreeMax::Unknown;
    }

    pub fn count_survivors(&mut self) -> usize {
        let meta = self.meta_mut();

        meta.survivors = meta.count_set();
        meta.survivors
    }
}
