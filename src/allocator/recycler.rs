use super::block::Block;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// A list of free pools that can be shared between heaps.
///
/// When a heap is dropped its whole generation is handed to its recycler,
/// and any heap using the same recycler takes pools from it before asking
/// its page backend for new memory. Clones share the same list, and the
/// recycler may be sent to other threads so that a heap per thread can
/// reuse the pools of finished threads.
#[derive(Clone)]
pub struct PoolRecycler {
    sender: Sender<Block>,
    receiver: Receiver<Block>,
}

impl PoolRecycler {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded();

        Self { sender, receiver }
    }

    pub(crate) fn take(&self) -> Option<Block> {
        self.receiver.try_recv().ok()
    }

    pub(crate) fn give(&self, block: Block) {
        // Sending only fails once every receiver is gone, and we hold one.
        let _ = self.sender.send(block);
    }

    /// Number of pools waiting to be reused.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Releases every waiting pool back to the platform.
    pub fn clear(&self) {
        while let Ok(block) = self.receiver.try_recv() {
            drop(block);
        }
    }
}

impl Default for PoolRecycler {
    fn default() -> Self {
        Self::new()
    }
}
