use std::fmt;

/// Errors returned by the allocation paths of a [`crate::Heap`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The request can never be satisfied: a zero sized object, an object
    /// larger than a single pool, or an array size that overflows.
    BadRequest,
    /// The page backend could not provide a pool that the heap needed to
    /// complete an allocation. The heap is still consistent, but the
    /// allocation did not happen.
    OOM,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::BadRequest => write!(f, "allocation request can never be satisfied"),
            AllocError::OOM => write!(f, "out of memory: failed to acquire a pool"),
        }
    }
}

impl std::error::Error for AllocError {}
