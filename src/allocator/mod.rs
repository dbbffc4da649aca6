mod block;
mod constants;
mod generation;
mod pool;
mod recycler;


pub use block::{Block, PageSource, SystemPages};
pub use constants::*;
pub use generation::Generation;
pub use pool::{PoolMeta, STORAGE_WORDS};
pub use recycler::PoolRecycler;
