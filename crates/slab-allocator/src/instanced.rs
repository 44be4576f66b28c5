//! Allocators that are ordinary values, each with its own slab quota.

use core::fmt;

use crate::{
    flavor::Flavor,
    object::{Instanced, SlabObject},
    pool::{Pool, PoolStats},
};

/// An independent slab allocator for objects of type `O`.
///
/// Every allocator has its own slabs and quota; exhausting one never affects
/// another, even for the same object type. Objects remember the allocator
/// they came from and are returned to it when released.
///
/// Managed handles ([`SlabBox`](crate::SlabBox), [`SlabArc`](crate::SlabArc))
/// borrow the allocator, so it cannot be moved or dropped while they are
/// alive. [`SlabPtr`](crate::SlabPtr)s do not; the allocator must neither
/// move nor drop until every raw object has been deleted. Dropping an
/// allocator with live objects panics.
pub struct SlabAllocator<O>
where
    O: SlabObject<Mode = Instanced>,
{
    pool: Pool<O>,
}

impl<O> fmt::Debug for SlabAllocator<O>
where
    O: SlabObject<Mode = Instanced>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlabAllocator")
            .field("object", &core::any::type_name::<O>())
            .field("stats", &self.pool.stats())
            .finish()
    }
}

impl<O> SlabAllocator<O>
where
    O: SlabObject<Mode = Instanced>,
{
    /// Number of objects carved out of one slab.
    pub const ALLOCS_PER_SLAB: usize = Pool::<O>::ALLOCS_PER_SLAB;

    /// Creates an allocator that may acquire up to `max_slabs` slabs.
    ///
    /// With `preallocate`, the first slab is acquired immediately.
    #[must_use]
    pub fn new(max_slabs: usize, preallocate: bool) -> Self
    where
        O::Source: Default,
    {
        Self::with_source(max_slabs, preallocate, O::Source::default())
    }

    /// Creates an allocator acquiring its slabs from `source`.
    #[must_use]
    pub fn with_source(max_slabs: usize, preallocate: bool, source: O::Source) -> Self {
        Self {
            pool: Pool::new(max_slabs, preallocate, source),
        }
    }

    /// Moves `value` into the allocator.
    ///
    /// Returns `None` if the quota is reached and no unit is free, or if the
    /// memory source cannot provide a new slab. `value` is dropped in that
    /// case.
    pub fn alloc(&self, value: O) -> Option<<O::Flavor as Flavor>::Ptr<'_, O>> {
        self.pool.alloc_with(|| value)
    }

    /// Constructs an object in place with `f`.
    ///
    /// `f` runs only once storage has been reserved. If it panics, the
    /// storage is returned to the allocator.
    pub fn alloc_with<F>(&self, f: F) -> Option<<O::Flavor as Flavor>::Ptr<'_, O>>
    where
        F: FnOnce() -> O,
    {
        self.pool.alloc_with(f)
    }

    /// Maximum number of slabs this allocator may acquire.
    #[must_use]
    pub fn max_slabs(&self) -> usize {
        self.pool.max_slabs()
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }
}
