use crate::object::{Object, Reference};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

/// A reference slot the collector can read while it is registered.
///
/// Store every reference that has to survive an allocation in a `Root` and
/// register it, either for a scope with [`crate::Heap::with_roots`] or for
/// good with [`crate::Heap::add_global`].
#[repr(transparent)]
pub struct Root<R: Reference> {
    slot: Cell<Option<R>>,
}

impl<R: Reference> Root<R> {
    pub const fn new(value: Option<R>) -> Self {
        Self {
            slot: Cell::new(value),
        }
    }

    pub const fn empty() -> Self {
        Self::new(None)
    }

    pub fn get(&self) -> Option<R> {
        self.slot.get()
    }

    pub fn set(&self, value: Option<R>) {
        self.slot.set(value)
    }

    pub fn take(&self) -> Option<R> {
        self.slot.take()
    }
}

impl<R: Reference> Default for Root<R> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<R: Reference + fmt::Debug> fmt::Debug for Root<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Root").field(&self.get()).finish()
    }
}

/// The address of a registered root slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RootSlot(NonNull<Cell<Option<Object>>>);

impl RootSlot {
    /// # Safety
    ///
    /// `slot` must stay valid, and only ever hold null or live objects of the
    /// heap it is registered with, until it is unregistered.
    pub unsafe fn new(slot: NonNull<Cell<Option<Object>>>) -> Self {
        Self(slot)
    }

    /// # Safety
    ///
    /// The slot must still be valid.
    pub unsafe fn get(self) -> Option<Object> {
        self.0.as_ref().get()
    }
}

/// Anything that can be registered as a root.
pub trait AsRoot {
    fn slot(&self) -> RootSlot;
}

impl<R: Reference> AsRoot for Root<R> {
    fn slot(&self) -> RootSlot {
        // `Option<R>` has the layout of `Option<Object>`.
        RootSlot(NonNull::from(&self.slot).cast())
    }
}

/// The transient and permanent root lists of a heap.
#[derive(Default)]
pub struct RootSet {
    stack: RefCell<Vec<RootSlot>>,
    globals: RefCell<Vec<RootSlot>>,
    owned: RefCell<Vec<Box<Root<Object>>>>,
}

impl RootSet {
    pub fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    pub fn global_count(&self) -> usize {
        self.globals.borrow().len()
    }

    /// # Safety
    ///
    /// See [`RootSlot::new`], the slot must outlive its registration.
    pub unsafe fn push(&self, slot: RootSlot) {
        self.stack.borrow_mut().push(slot);
    }

    /// Unregisters the `count` most recently pushed transient roots.
    pub fn pop(&self, count: usize) {
        let mut stack = self.stack.borrow_mut();
        let depth = stack.len().saturating_sub(count);

        debug_assert!(count <= stack.len(), "popped more roots than pushed");
        stack.truncate(depth);
    }

    pub fn truncate(&self, depth: usize) {
        self.stack.borrow_mut().truncate(depth);
    }

    /// # Safety
    ///
    /// See [`RootSlot::new`], the slot must outlive the heap.
    pub unsafe fn push_global(&self, slot: RootSlot) {
        self.globals.borrow_mut().push(slot);
    }

    /// Registers a new heap owned permanent slot holding `value`.
    pub fn own_global(&self, value: Option<Object>) -> NonNull<Root<Object>> {
        let root = Box::new(Root::new(value));
        let ptr = NonNull::from(&*root);

        unsafe { self.push_global(root.slot()) };
        self.owned.borrow_mut().push(root);

        ptr
    }

    /// Calls `f` with every non-null root, transient roots first.
    pub fn for_each(&self, mut f: impl FnMut(Object)) {
        let stack = self.stack.borrow();
        let globals = self.globals.borrow();

        for slot in stack.iter().chain(globals.iter()) {
            if let Some(object) = unsafe { slot.get() } {
                f(object);
            }
        }
    }
}
