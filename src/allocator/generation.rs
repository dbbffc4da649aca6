use super::block::{pool_layout, PageSource};
use super::constants::{Word, POOL_BYTES};
use super::pool::{Pool, STORAGE_WORDS};
use super::recycler::PoolRecycler;
use crate::error::AllocError;
use log::{debug, warn};
use std::ptr::NonNull;

/// Storage handed out by [`Generation::alloc`].
pub struct Allocation {
    pub ptr: NonNull<Word>,
    /// Set when the request could only be satisfied by linking a new pool.
    pub new_pool: bool,
}

/// A chain of pools that are allocated into and collected as one unit.
pub struct Generation {
    pools: Vec<Pool>,
    current: usize,
    pages: Box<dyn PageSource>,
    recycler: PoolRecycler,
    recycled: usize,
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.free_generation();
    }
}

impl Generation {
    pub fn new(pages: Box<dyn PageSource>, recycler: PoolRecycler) -> Self {
        Self {
            pools: vec![],
            current: 0,
            pages,
            recycler,
            recycled: 0,
        }
    }

    pub fn recycler(&self) -> &PoolRecycler {
        &self.recycler
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn pools_recycled(&self) -> usize {
        self.recycled
    }

    pub fn capacity(&self) -> usize {
        self.pools.iter().map(Pool::capacity).sum()
    }

    pub fn occupied_words(&self) -> usize {
        self.pools.iter().map(Pool::occupied_words).sum()
    }

    pub fn pools(&self) -> &[Pool] {
        &self.pools
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn pool_of(&self, ptr: *const Word) -> Option<&Pool> {
        self.pools.iter().find(|pool| pool.contains(ptr))
    }

    pub fn pool_of_mut(&mut self, ptr: *const Word) -> Option<&mut Pool> {
        self.pools.iter_mut().find(|pool| pool.contains(ptr))
    }

    /// Finds `size` words: first by reusing freed words of the current pool,
    /// then from its bump cursor, then by moving on to the next pool, and
    /// finally by linking a new pool at the end of the chain.
    pub fn alloc(&mut self, size: usize) -> Result<Allocation, AllocError> {
        if size == 0 || size > STORAGE_WORDS {
            return Err(AllocError::BadRequest);
        }

        let mut new_pool = false;

        if self.pools.is_empty() {
            let pool = self.must_acquire()?;

            self.pools.push(pool);
            self.current = 0;
        }

        loop {
            let pool = &mut self.pools[self.current];

            if pool.should_search(size) {
                match pool.find_free(size) {
                    Some(index) => {
                        pool.occupy(index, size);

                        return Ok(Allocation {
                            ptr: pool.word_ptr(index),
                            new_pool,
                        });
                    }
                    None => pool.search_failed(size),
                }
            }

            if let Some(index) = pool.bump(size) {
                return Ok(Allocation {
                    ptr: pool.word_ptr(index),
                    new_pool,
                });
            }

            if self.current + 1 < self.pools.len() {
                self.current += 1;
                continue;
            }

            let pool = self.must_acquire()?;

            self.pools.push(pool);
            self.current = self.pools.len() - 1;
            new_pool = true;
        }
    }

    fn must_acquire(&mut self) -> Result<Pool, AllocError> {
        match self.acquire_pool(true)? {
            Some(pool) => Ok(pool),
            None => Err(AllocError::OOM),
        }
    }

    /// Takes a pool from the recycler, or failing that from the page backend.
    ///
    /// A backend failure is an error when `must_succeed` is set, otherwise it
    /// is reported as `Ok(None)`.
    pub fn acquire_pool(&mut self, must_succeed: bool) -> Result<Option<Pool>, AllocError> {
        if let Some(block) = self.recycler.take() {
            self.recycled += 1;
            debug!("reusing recycled pool at {:?}", block.as_ptr());

            return Ok(Some(Pool::new(block)));
        }

        let result = self
            .pages
            .acquire_block(pool_layout())
            .and_then(|block| {
                let aligned = block.get_size() == POOL_BYTES
                    && block.as_ptr() as usize % POOL_BYTES == 0;

                if aligned {
                    Ok(block)
                } else {
                    warn!("page backend returned a misaligned block, discarding it");
                    Err(AllocError::OOM)
                }
            });

        match result {
            Ok(block) => {
                debug!("acquired new pool at {:?}", block.as_ptr());

                Ok(Some(Pool::new(block)))
            }
            Err(error) if must_succeed => Err(error),
            Err(error) => {
                debug!("optional pool acquisition failed: {}", error);

                Ok(None)
            }
        }
    }

    /// Grows the generation when the last collection left it too dense.
    ///
    /// When more than `survivor_ratio` of the capacity survived, one new pool
    /// is appended for every pool already in the chain. Acquisition failures
    /// only cut the growth short. Survivor counts are consumed, so a second
    /// call without an intervening collection does nothing. Returns the
    /// number of pools added.
    pub fn expand(&mut self, survivor_ratio: f32) -> usize {
        if self.pools.is_empty() {
            return 0;
        }

        let capacity = self.capacity();
        let survivors: usize = self.pools.iter_mut().map(Pool::take_survivors).sum();

        if survivors as f64 <= capacity as f64 * survivor_ratio as f64 {
            return 0;
        }

        let wanted = self.pools.len();
        let mut added = 0;

        for _ in 0..wanted {
            match self.acquire_pool(false) {
                Ok(Some(pool)) => {
                    self.pools.push(pool);
                    added += 1;
                }
                _ => {
                    warn!("generation growth stopped early: {} of {} pools added", added, wanted);
                    break;
                }
            }
        }

        debug!(
            "expanded generation: survivors = {}, capacity = {}, pools = {}",
            survivors,
            capacity,
            self.pools.len()
        );

        added
    }

    pub fn reset_marks(&mut self) {
        for pool in self.pools.iter_mut() {
            pool.reset_marks();
        }
    }

    /// Records per-pool survivors and rewinds allocation to the first pool.
    /// Returns the total number of live words.
    pub fn finish_marks(&mut self) -> usize {
        self.current = 0;
        self.pools.iter_mut().map(Pool::count_survivors).sum()
    }

    pub fn occupancy_snapshot(&self) -> Vec<Word> {
        self.pools
            .iter()
            .flat_map(|pool| pool.bitmap().iter().copied())
            .collect()
    }

    /// Hands every pool of this generation to the recycler.
    pub fn free_generation(&mut self) {
        let count = self.pools.len();

        for pool in self.pools.drain(..) {
            self.recycler.give(pool.into_block());
        }

        self.current = 0;

        if count > 0 {
            debug!("released {} pools to the recycler", count);
        }
    }
}
