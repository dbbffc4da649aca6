use super::constants::POOL_BYTES;
use crate::error::AllocError;
use std::alloc::{alloc, dealloc, Layout};
use std::ptr::NonNull;

/// An owned, aligned chunk of raw memory obtained from a [`PageSource`].
///
/// The memory is released back to the global allocator when the block is
/// dropped.
pub struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

// A block is plain memory exclusively owned by whoever holds the Block.
unsafe impl Send for Block {}

impl Block {
    pub fn new(layout: Layout) -> Result<Block, AllocError> {
        Ok(Block {
            ptr: Self::alloc_block(layout)?,
            layout,
        })
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    pub fn get_size(&self) -> usize {
        self.layout.size()
    }

    pub fn get_align(&self) -> usize {
        self.layout.align()
    }

    fn alloc_block(layout: Layout) -> Result<NonNull<u8>, AllocError> {
        if layout.size() == 0 {
            return Err(AllocError::BadRequest);
        }

        unsafe {
            let ptr = alloc(layout);

            NonNull::new(ptr).ok_or(AllocError::OOM)
        }
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
    }
}

/// The backend a heap obtains its pools from.
///
/// Implementations must return a block whose size and alignment are exactly
/// those of the requested layout, the heap relies on pool alignment to find
/// the pool owning any object pointer.
pub trait PageSource {
    fn acquire_block(&self, layout: Layout) -> Result<Block, AllocError>;
}

/// Pages from the global allocator.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemPages;

impl PageSource for SystemPages {
    fn acquire_block(&self, layout: Layout) -> Result<Block, AllocError> {
        Block::new(layout)
    }
}

pub fn pool_layout() -> Layout {
    // SAFETY: POOL_BYTES is a non-zero power of two.
    unsafe { Layout::from_size_align_unchecked(POOL_BYTES, POOL_BYTES) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_blocks_are_self_aligned() {
        let block = SystemPages.acquire_block(pool_layout()).unwrap();

        assert_eq!(block.get_size(), POOL_BYTES);
        assert_eq!(block.get_align(), POOL_BYTES);
        assert_eq!(block.as_ptr() as usize % POOL_BYTES, 0);
    }

    #[test]
    fn zero_sized_block_is_rejected() {
        let layout = Layout::from_size_align(0, 8).unwrap();

        assert_eq!(Block::new(layout).err(), Some(AllocError::BadRequest));
    }
}
