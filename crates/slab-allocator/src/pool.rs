//! The pool engine shared by instanced and static allocators.
//!
//! A [`Pool`] owns a list of slabs, a free list and an immutable slab quota,
//! all behind one lock. Units are handed out from, in order of preference:
//!
//! 1. the free list (most recently released first),
//! 2. the active slab (bump allocation),
//! 3. a freshly acquired slab, while fewer than `max_slabs` slabs exist.
//!
//! When none of these apply the pool is exhausted and allocation reports
//! `None`; a failing [`SlabSource`] is reported the same way. The lock is
//! held while a new slab is acquired, so at most one caller ever installs a
//! new active slab.
//!
//! Slabs are never returned to the source while the pool is in use. They are
//! all released together by [`Pool::drain`], which refuses to do so while any
//! object is still live.

use core::{alloc::Layout, fmt, marker::PhantomData, mem, ptr::NonNull};

use snafu::ensure;

use crate::{
    error::{self, LeakError, LeakSnafu},
    flavor::Flavor,
    lock::Locked,
    object::{SlabObject, Slot},
    slab::{FreeList, SlabGeometry, SlabList},
    source::SlabSource,
};

#[derive(Debug)]
struct PoolState {
    slabs: SlabList,
    free: FreeList,
}

// Lists only point into slabs the pool owns exclusively.
unsafe impl Send for PoolState {}

/// Where an allocated unit came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::IsVariant)]
pub(crate) enum Carve {
    #[display("free list")]
    Recycled,
    #[display("active slab")]
    Bumped,
    #[display("new slab")]
    FreshSlab,
}

/// Snapshot of a pool's bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Slab quota.
    pub max_slabs: usize,
    /// Slabs acquired so far.
    pub slab_count: usize,
    /// Units ever carved out of those slabs.
    pub carved: usize,
    /// Units currently on the free list.
    pub free: usize,
}

impl PoolStats {
    /// Number of live objects.
    #[must_use]
    pub fn live(&self) -> usize {
        self.carved.saturating_sub(self.free)
    }
}

/// Slab pool serving objects of type `O`.
pub struct Pool<O>
where
    O: SlabObject,
{
    state: Locked<O::Lock, PoolState>,
    max_slabs: usize,
    source: O::Source,
    _marker: PhantomData<fn() -> O>,
}

impl<O> fmt::Debug for Pool<O>
where
    O: SlabObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("state", &self.state)
            .field("max_slabs", &self.max_slabs)
            .finish_non_exhaustive()
    }
}

impl<O> Pool<O>
where
    O: SlabObject,
{
    /// Geometry of every slab of this pool.
    pub const GEOMETRY: SlabGeometry = SlabGeometry::new(O::SLAB_SIZE, Layout::new::<Slot<O>>());

    /// Number of objects carved out of one slab.
    pub const ALLOCS_PER_SLAB: usize = Self::GEOMETRY.units_per_slab;

    /// Creates a pool that acquires at most `max_slabs` slabs from `source`.
    ///
    /// With `preallocate`, the first slab is acquired right away so that the
    /// first `ALLOCS_PER_SLAB` allocations never touch the source. If the
    /// source fails, the pool starts out empty instead.
    pub fn new(max_slabs: usize, preallocate: bool, source: O::Source) -> Self {
        let geometry = Self::GEOMETRY;
        let pool = Self {
            state: Locked::new(PoolState {
                slabs: SlabList::new(),
                free: FreeList::new(),
            }),
            max_slabs,
            source,
            _marker: PhantomData,
        };
        log::trace!(
            "slab pool created: object={}, max_slabs={max_slabs}, units_per_slab={}, unit_size={}",
            core::any::type_name::<O>(),
            geometry.units_per_slab,
            geometry.unit_size,
        );
        if preallocate && let Some(slot) = pool.allocate() {
            unsafe { pool.release(slot) };
        }
        pool
    }

    /// Maximum number of slabs this pool may acquire.
    #[must_use]
    pub fn max_slabs(&self) -> usize {
        self.max_slabs
    }

    /// Returns a snapshot of the pool's bookkeeping.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        PoolStats {
            max_slabs: self.max_slabs,
            slab_count: state.slabs.len(),
            carved: state.slabs.carved(),
            free: state.free.len(),
        }
    }

    /// Reserves storage for one object.
    ///
    /// The returned slot is uninitialized. Returns `None` when the quota is
    /// reached and no unit is free, or when the source fails to provide a new
    /// slab.
    #[must_use]
    pub fn allocate(&self) -> Option<NonNull<Slot<O>>> {
        self.carve().map(|(slot, _)| slot)
    }

    pub(crate) fn carve(&self) -> Option<(NonNull<Slot<O>>, Carve)> {
        let geometry = Self::GEOMETRY;
        let mut state = self.state.lock();

        let (unit, carve) = if let Some(unit) = state.free.pop() {
            (unit, Carve::Recycled)
        } else if let Some(unit) = state.slabs.bump(&geometry) {
            (unit, Carve::Bumped)
        } else if state.slabs.len() < self.max_slabs {
            let Some(mem) = self.source.acquire(geometry.slab_layout()) else {
                log::warn!(
                    "slab source failed: object={}, slab_size={}, slab_count={}",
                    core::any::type_name::<O>(),
                    geometry.slab_size,
                    state.slabs.len(),
                );
                return None;
            };
            unsafe { state.slabs.push(mem) };
            log::debug!(
                "slab acquired: object={}, slab_count={}/{}",
                core::any::type_name::<O>(),
                state.slabs.len(),
                self.max_slabs,
            );
            let unit = state.slabs.bump(&geometry)?;
            (unit, Carve::FreshSlab)
        } else {
            log::trace!(
                "slab pool exhausted: object={}, max_slabs={}",
                core::any::type_name::<O>(),
                self.max_slabs,
            );
            return None;
        };
        drop(state);

        log::trace!(
            "unit allocated from {carve}: object={}, addr={unit:p}",
            core::any::type_name::<O>(),
        );
        Some((unit.cast(), carve))
    }

    /// Returns a unit to the free list.
    ///
    /// The unit becomes the next one handed out.
    ///
    /// # Safety
    ///
    /// `slot` must have been reserved from this pool, must hold no live
    /// object, and must not be used afterwards.
    pub unsafe fn release(&self, slot: NonNull<Slot<O>>) {
        let mut state = self.state.lock();
        unsafe { state.free.push(slot.cast()) };
    }

    /// Returns every slab to the source, leaving the pool empty.
    ///
    /// # Errors
    ///
    /// Returns [`LeakError`] if any object allocated from this pool is still
    /// live. Every slab is kept in that case.
    #[track_caller]
    pub fn drain(&self) -> Result<(), LeakError> {
        let layout = Self::GEOMETRY.slab_layout();
        let mut state = self.state.lock();
        let carved = state.slabs.carved();
        let free = state.free.len();
        ensure!(free == carved, LeakSnafu { carved, free });

        state.free.clear();
        let slab_count = state.slabs.len();
        for slab in state.slabs.take_all() {
            unsafe { self.source.release(slab, layout) };
        }
        if slab_count > 0 {
            log::debug!(
                "slab pool drained: object={}, slabs={slab_count}, units={carved}",
                core::any::type_name::<O>(),
            );
        }
        Ok(())
    }

    /// Constructs an object in place and wraps it in the type's pointer flavor.
    ///
    /// If `f` panics, the reserved unit goes back to the free list.
    pub(crate) fn alloc_with<'a, F>(&'a self, f: F) -> Option<<O::Flavor as Flavor>::Ptr<'a, O>>
    where
        F: FnOnce() -> O,
    {
        let slot = self.allocate()?;
        let guard = ReleaseGuard { pool: self, slot };
        let value = f();
        mem::forget(guard);
        unsafe {
            slot.write(Slot::new(self, value));
            Some(<O::Flavor as Flavor>::adopt(slot))
        }
    }
}

impl<O> Drop for Pool<O>
where
    O: SlabObject,
{
    fn drop(&mut self) {
        if let Err(err) = self.drain() {
            error::report(err);
        }
    }
}

/// Returns `slot` to `pool` when dropped, including during unwinding.
pub(crate) struct ReleaseGuard<'a, O>
where
    O: SlabObject,
{
    pub(crate) pool: &'a Pool<O>,
    pub(crate) slot: NonNull<Slot<O>>,
}

impl<O> Drop for ReleaseGuard<'_, O>
where
    O: SlabObject,
{
    fn drop(&mut self) {
        unsafe { self.pool.release(self.slot) }
    }
}
