//! A precise, non-moving, mark collected heap for hosts that register their
//! own roots.
//!
//! Every object starts with a header word pointing at its [`Descriptor`], a
//! heap resident record of the object's size and of which of its words are
//! references. Descriptors are objects too, described by descriptors of
//! their own, so the collector can trace anything in the heap knowing
//! nothing but the roots. Objects never move: a collection only rebuilds the
//! per-pool occupancy bitmaps, and unreachable words become free by not
//! being marked again.
//!
//! Types allocated through the typed API derive [`Shape`], which computes
//! their descriptor from their fields. Like the objects of any collected
//! heap they must not implement Drop.
//! ```rust
//! use sandpool::{Gc, Heap, Root, Shape};
//! use std::cell::Cell;
//!
//! #[derive(Shape)]
//! struct Node {
//!     value: Cell<u64>,
//!     next: Cell<Option<Gc<Node>>>,
//! }
//!
//! let heap = Heap::new();
//! let head = Root::<Gc<Node>>::empty();
//!
//! heap.with_roots(&[&head], || {
//!     for i in 0..100 {
//!         let node = heap.alloc::<Node>().unwrap();
//!
//!         unsafe {
//!             node.get().value.set(i);
//!             node.get().next.set(head.get());
//!         }
//!
//!         head.set(Some(node));
//!     }
//!
//!     heap.collect();
//!
//!     let first = unsafe { head.get().unwrap().get() };
//!     assert_eq!(first.value.get(), 99);
//! });
//! ```
extern crate self as sandpool;

mod allocator;
mod collector;
mod config;
mod descriptor;
mod error;
mod heap;
mod metrics;
mod object;
mod roots;
mod shape;

pub use allocator::{
    Block, PageSource, PoolRecycler, SystemPages, Word, POOL_BYTES, STORAGE_WORDS,
};
pub use collector::GcState;
pub use config::Config;
pub use descriptor::{Descriptor, Signature};
pub use error::AllocError;
pub use heap::Heap;
pub use metrics::Metrics;
pub use object::{Gc, Object, Reference};
pub use roots::{AsRoot, Root, RootSlot};
pub use sandpool_derive::Shape;
pub use shape::{Field, Shape, ShapeBuilder};

#[doc(hidden)]
pub trait __MustNotDrop {}

#[allow(drop_bounds)]
impl<T: Drop> __MustNotDrop for T {}

#[cfg(test)]
mod test;
