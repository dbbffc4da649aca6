use crate::allocator::{
    Generation, PageSource, PoolMeta, PoolRecycler, SystemPages, Word, ARRAY_LENGTH_WORD,
    DESCRIPTOR_FIXED_WORDS, DESCRIPTOR_SIZE_WORD,
};
use crate::collector::{Collector, GcState};
use crate::config::Config;
use crate::descriptor::{Descriptor, DescriptorTable, Signature};
use crate::error::AllocError;
use crate::metrics::Metrics;
use crate::object::{Gc, Object, Reference};
use crate::roots::{AsRoot, Root, RootSet, RootSlot};
use crate::shape::Shape;
use log::{debug, trace, warn};
use scopeguard::defer;
use std::any::TypeId;
use std::cell::RefCell;
use std::ptr;
use std::time::Instant;

/// A single threaded, non-moving, mark collected heap.
///
/// Objects are described by heap resident [`Descriptor`]s that say which of
/// their words are references. A collection starts from the registered
/// roots, follows those references, and rebuilds the occupancy bitmaps of
/// every pool from what it reaches. Everything else becomes free space.
///
/// Collections only ever start inside an allocation, at the yield point that
/// every allocation goes through, or through an explicit [`Heap::collect`].
/// Any reference held across an allocation must therefore be stored in a
/// registered [`Root`].
///
/// ```rust
/// use sandpool::{Heap, Object, Root};
///
/// let heap = Heap::new();
/// let list = Root::<Object>::empty();
///
/// heap.with_roots(&[&list], || {
///     list.set(Some(heap.allocate_pointer_array(2).unwrap()));
///
///     // May collect, `list` survives because it is registered.
///     let data = heap.allocate_data_array(16, 1).unwrap();
///
///     unsafe { list.get().unwrap().set_element(0, Some(data)) };
/// });
/// ```
pub struct Heap {
    inner: RefCell<HeapInner>,
    roots: RootSet,
}

struct HeapInner {
    generation: Generation,
    collector: Collector,
    descriptors: DescriptorTable,
    metrics: Metrics,
    config: Config,
}

impl Heap {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self::build(config, SystemPages, PoolRecycler::new())
    }

    /// Creates a heap that acquires its pools from `pages`, after first
    /// trying `recycler`. Dropping the heap hands all of its pools to
    /// `recycler`.
    pub fn build(config: Config, pages: impl PageSource + 'static, recycler: PoolRecycler) -> Self {
        Self {
            inner: RefCell::new(HeapInner {
                generation: Generation::new(Box::new(pages), recycler),
                collector: Collector::new(),
                descriptors: DescriptorTable::default(),
                metrics: Metrics::default(),
                config,
            }),
            roots: RootSet::default(),
        }
    }

    pub fn config(&self) -> Config {
        self.inner.borrow().config
    }

    /// Replaces the configuration, it applies from the next collection on.
    pub fn set_config(&self, config: Config) {
        self.inner.borrow_mut().config = config;
    }

    pub fn recycler(&self) -> PoolRecycler {
        self.inner.borrow().generation.recycler().clone()
    }

    /// Returns the canonical descriptor for records of `size` words, header
    /// included, whose references are the set bits of `pointers`.
    ///
    /// The first request for a shape allocates its descriptor and registers
    /// it as a permanent root, later requests for an equal shape return the
    /// same descriptor.
    pub fn get_or_create_descriptor(
        &self,
        size: usize,
        pointers: &[Word],
    ) -> Result<Descriptor<'_>, AllocError> {
        self.descriptor_for_signature(Signature::record(size, pointers)?)
    }

    pub fn descriptor_for_signature(
        &self,
        signature: Signature,
    ) -> Result<Descriptor<'_>, AllocError> {
        let object = self.intern(signature)?;

        Ok(unsafe { Descriptor::from_object(object) })
    }

    pub fn descriptor_for_pointer_array(&self, length: usize) -> Result<Descriptor<'_>, AllocError> {
        self.descriptor_for_signature(Signature::pointer_array(length)?)
    }

    pub fn descriptor_for_data_array(
        &self,
        element_count: usize,
        element_size: usize,
    ) -> Result<Descriptor<'_>, AllocError> {
        self.descriptor_for_signature(Signature::data_array(element_count, element_size)?)
    }

    /// The descriptor of a [`Shape`] type, cached per type.
    pub fn descriptor_for<T: Shape>(&self) -> Result<Descriptor<'_>, AllocError> {
        let id = TypeId::of::<T>();

        if let Some(object) = self.inner.borrow().descriptors.get_type(id) {
            return Ok(unsafe { Descriptor::from_object(object) });
        }

        let descriptor = self.descriptor_for_signature(T::signature()?)?;

        self.inner
            .borrow_mut()
            .descriptors
            .insert_type(id, descriptor.object());

        Ok(descriptor)
    }

    fn intern(&self, signature: Signature) -> Result<Object, AllocError> {
        if let Some(object) = self.inner.borrow().descriptors.get(&signature) {
            return Ok(object);
        }

        let object = if signature.is_self_describing() {
            self.bootstrap_descriptor(&signature)?
        } else {
            // The parent is a permanent root before the child's allocation
            // gets a chance to collect.
            let parent = self.intern(Signature::describing(signature.descriptor_size()))?;

            self.allocate_with(unsafe { Descriptor::from_object(parent) })?
        };

        unsafe {
            object.set_word(DESCRIPTOR_SIZE_WORD, signature.size());

            for (i, word) in signature.pointers().iter().enumerate() {
                object.set_word(DESCRIPTOR_FIXED_WORDS + i, *word);
            }
        }

        self.roots.own_global(Some(object));

        trace!(
            "new descriptor {:?}: size = {}, pointers = {:x?}",
            object,
            signature.size(),
            signature.pointers()
        );

        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;

        inner.descriptors.insert(signature, object);
        inner.metrics.descriptors = inner.descriptors.len();

        Ok(object)
    }

    // The descriptor of descriptors of its own size describes itself. Until
    // it exists a stack copy stands in for it.
    fn bootstrap_descriptor(&self, signature: &Signature) -> Result<Object, AllocError> {
        let mut seed: [Word; 3] = [0, signature.size(), signature.pointers()[0]];
        let object = self.allocate_with(unsafe { Descriptor::from_raw(seed.as_mut_ptr()) })?;

        // Nothing can collect between the allocation and this store.
        unsafe { object.set_word(0, object.addr()) };

        Ok(object)
    }

    /// Allocates a zeroed object described by `descriptor`.
    ///
    /// Fails with [`AllocError::BadRequest`] if `descriptor` belongs to a
    /// different heap.
    pub fn allocate_object(&self, descriptor: Descriptor<'_>) -> Result<Object, AllocError> {
        if !self.inner.borrow().descriptors.contains(descriptor.object()) {
            return Err(AllocError::BadRequest);
        }

        self.allocate_with(descriptor)
    }

    /// Allocates a pointer array of `length` null elements.
    pub fn allocate_pointer_array(&self, length: usize) -> Result<Object, AllocError> {
        let descriptor = self.descriptor_for_pointer_array(length)?;
        let object = self.allocate_with(descriptor)?;

        unsafe { object.set_word(ARRAY_LENGTH_WORD, length) };

        Ok(object)
    }

    /// Allocates a zeroed data array of `element_count` elements of
    /// `element_size` bytes.
    pub fn allocate_data_array(
        &self,
        element_count: usize,
        element_size: usize,
    ) -> Result<Object, AllocError> {
        let descriptor = self.descriptor_for_data_array(element_count, element_size)?;
        let object = self.allocate_with(descriptor)?;

        unsafe { object.set_word(ARRAY_LENGTH_WORD, element_count) };

        Ok(object)
    }

    /// Allocates a zeroed `T`.
    pub fn alloc<T: Shape>(&self) -> Result<Gc<T>, AllocError> {
        let descriptor = self.descriptor_for::<T>()?;
        let object = self.allocate_with(descriptor)?;

        Ok(unsafe { Gc::from_object(object) })
    }

    fn allocate_with(&self, descriptor: Descriptor<'_>) -> Result<Object, AllocError> {
        let size = descriptor.size();

        self.gc_yield();

        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        let allocation = inner.generation.alloc(size)?;

        if allocation.new_pool && inner.config.collect_on_grow {
            inner.collector.request_collection();
        }

        inner.metrics.allocations += 1;
        inner.metrics.record_pools(
            inner.generation.pool_count(),
            inner.generation.pools_recycled(),
        );

        let object = Object::from_nonnull(allocation.ptr);

        unsafe {
            ptr::write_bytes(object.as_ptr(), 0, size);
            object.set_word(0, descriptor.object().addr());
        }

        Ok(object)
    }

    /// Returns the words of `object` to its pool right away.
    ///
    /// Freeing a descriptor is ignored, descriptors live as long as the heap.
    ///
    /// # Safety
    ///
    /// `object` must be a live object of this heap that is not reachable
    /// from any root or object, and must not be used afterwards.
    pub unsafe fn free(&self, object: Object) {
        let mut inner = self.inner.borrow_mut();

        if inner.descriptors.contains(object) {
            warn!("ignoring attempt to free descriptor {:?}", object);
            return;
        }

        let size = object.size();

        match inner.generation.pool_of_mut(object.as_ptr()) {
            Some(pool) => pool.release(PoolMeta::index_of(object.as_ptr()), size),
            None => debug_assert!(false, "freed {:?} which is not in this heap", object),
        }
    }

    /// Collects if a collection has been requested since the last one.
    /// Returns whether it collected.
    pub fn gc_yield(&self) -> bool {
        let pending = self.inner.borrow_mut().collector.take_request();

        if pending {
            self.collect();
        }

        pending
    }

    /// Runs a full collection, then grows the generation if configured to.
    pub fn collect(&self) {
        let start_time = Instant::now();
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;

        debug!(
            "collection {} started: {} pools",
            inner.metrics.collections + 1,
            inner.generation.pool_count()
        );

        let live = inner.collector.mark(&mut inner.generation, &self.roots);
        let elapsed = start_time.elapsed();

        inner.metrics.record_collection(elapsed, live);

        debug!(
            "collection finished in {:?}: live words = {}, capacity = {}",
            elapsed,
            live,
            inner.generation.capacity()
        );

        if inner.config.auto_expand {
            inner.generation.expand(inner.config.survivor_ratio_trigger);
        }

        inner.metrics.record_pools(
            inner.generation.pool_count(),
            inner.generation.pools_recycled(),
        );
    }

    /// Grows the generation if the last collection left it too dense.
    /// Returns the number of pools added.
    pub fn expand_generation(&self) -> usize {
        let mut inner = self.inner.borrow_mut();
        let inner = &mut *inner;
        let added = inner.generation.expand(inner.config.survivor_ratio_trigger);

        inner.metrics.record_pools(
            inner.generation.pool_count(),
            inner.generation.pools_recycled(),
        );

        added
    }

    pub fn collection_pending(&self) -> bool {
        self.inner.borrow().collector.collection_pending()
    }

    pub fn state(&self) -> GcState {
        self.inner.borrow().collector.state()
    }

    /// Registers `roots` for the duration of `f`. They are unregistered when
    /// `f` returns or unwinds.
    pub fn with_roots<T>(&self, roots: &[&dyn AsRoot], f: impl FnOnce() -> T) -> T {
        let depth = self.roots.depth();

        for root in roots {
            // The slots are borrowed for longer than they stay registered.
            unsafe { self.roots.push(root.slot()) };
        }

        defer! { self.roots.truncate(depth); }

        f()
    }

    /// # Safety
    ///
    /// `slot` must stay valid until popped with [`Heap::pop_roots`], and
    /// only ever hold null or live objects of this heap.
    pub unsafe fn push_root(&self, slot: RootSlot) {
        self.roots.push(slot);
    }

    /// Unregisters the `count` most recently pushed roots.
    pub fn pop_roots(&self, count: usize) {
        self.roots.pop(count);
    }

    pub fn root_depth(&self) -> usize {
        self.roots.depth()
    }

    /// # Safety
    ///
    /// `slot` must stay valid for the lifetime of the heap, and only ever
    /// hold null or live objects of this heap.
    pub unsafe fn push_global(&self, slot: RootSlot) {
        self.roots.push_global(slot);
    }

    /// Registers `root` as a permanent root.
    pub fn add_global<R: Reference>(&self, root: &'static Root<R>) {
        unsafe { self.roots.push_global(root.slot()) };
    }

    /// Creates a permanent root owned by the heap.
    pub fn global<R: Reference>(&self, value: Option<R>) -> &Root<R> {
        let root = self.roots.own_global(value.map(Reference::to_object));

        // `Root<R>` has the layout of `Root<Object>`.
        unsafe { root.cast::<Root<R>>().as_ref() }
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.borrow().metrics
    }

    /// Words marked occupied across the generation.
    pub fn occupied_words(&self) -> usize {
        self.inner.borrow().generation.occupied_words()
    }

    /// Whether the word at `ptr` is occupied. False for addresses outside
    /// the heap.
    pub fn is_occupied(&self, ptr: *const Word) -> bool {
        self.inner
            .borrow()
            .generation
            .pool_of(ptr)
            .is_some_and(|pool| pool.is_occupied(PoolMeta::index_of(ptr)))
    }

    pub fn pool_count(&self) -> usize {
        self.inner.borrow().generation.pool_count()
    }

    pub fn capacity_words(&self) -> usize {
        self.inner.borrow().generation.capacity()
    }

    /// Copy of every pool's occupancy bitmap, in generation order.
    pub fn occupancy_snapshot(&self) -> Vec<Word> {
        self.inner.borrow().generation.occupancy_snapshot()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}
