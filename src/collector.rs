use crate::allocator::{Generation, PoolMeta};
use crate::object::Object;
use crate::roots::RootSet;
use log::{debug, trace, warn};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GcState {
    Idle,
    Marking,
}

/// Full mark of the live set, driven from a heap's root lists.
pub struct Collector {
    state: GcState,
    collect_needed: bool,
    work: Vec<Object>,
}

impl Collector {
    pub fn new() -> Self {
        Self {
            state: GcState::Idle,
            collect_needed: false,
            work: vec![],
        }
    }

    pub fn state(&self) -> GcState {
        self.state
    }

    /// Raises the sticky flag that the next yield point collects on.
    pub fn request_collection(&mut self) {
        if !self.collect_needed {
            debug!("collection requested");
        }

        self.collect_needed = true;
    }

    pub fn collection_pending(&self) -> bool {
        self.collect_needed
    }

    /// Clears the flag and reports whether it was set.
    pub fn take_request(&mut self) -> bool {
        std::mem::take(&mut self.collect_needed)
    }

    /// Rebuilds the occupancy bitmaps of `generation` from the objects
    /// reachable through `roots`. Returns the number of live words.
    ///
    /// Roots holding objects outside `generation` are skipped. Every object
    /// reachable from the remaining roots must carry a valid descriptor.
    pub fn mark(&mut self, generation: &mut Generation, roots: &RootSet) -> usize {
        self.state = GcState::Marking;
        self.collect_needed = false;

        generation.reset_marks();

        let mut work = std::mem::take(&mut self.work);

        roots.for_each(|root| {
            if generation.pool_of(root.as_ptr()).is_none() {
                warn!("ignoring root {:?}, it is not in this heap", root);
                return;
            }

            if !is_marked(root) {
                work.push(root);
                drain(&mut work);
            }
        });

        // Keep the allocation, a collection reuses it.
        self.work = work;

        let live = generation.finish_marks();

        self.state = GcState::Idle;

        live
    }
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_marked(object: Object) -> bool {
    let ptr = object.as_ptr();

    unsafe { PoolMeta::from_ptr(ptr).is_set(PoolMeta::index_of(ptr)) }
}

fn drain(work: &mut Vec<Object>) {
    while let Some(object) = work.pop() {
        if is_marked(object) {
            continue;
        }

        let ptr = object.as_ptr();
        let descriptor = unsafe { object.descriptor() };
        let size = descriptor.size();

        trace!("marking {:?}, {} words", ptr, size);
        unsafe { PoolMeta::from_ptr(ptr).set_range(PoolMeta::index_of(ptr), size) };

        if descriptor.has_pointers() {
            // Bit 0 covers the header, which pushes the descriptor itself.
            descriptor.for_each_pointer(|index| {
                if let Some(child) = unsafe { object.pointer(index) } {
                    if !is_marked(child) {
                        work.push(child);
                    }
                }
            });
        } else {
            work.push(descriptor.object());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_sticky_until_taken() {
        let mut collector = Collector::new();

        assert!(!collector.take_request());

        collector.request_collection();
        collector.request_collection();

        assert!(collector.collection_pending());
        assert!(collector.take_request());
        assert!(!collector.collection_pending());
        assert!(!collector.take_request());
        assert_eq!(collector.state(), GcState::Idle);
    }
}
