//! Pointer flavors handed out by slab allocators.
//!
//! Whatever the flavor, an object is released exactly once: its destructor
//! runs and its unit goes back on the free list of the pool that produced it.
//!
//! | flavor     | handle            | release                              |
//! |------------|-------------------|--------------------------------------|
//! | [`Raw`]    | [`SlabPtr`]       | explicit, [`SlabPtr::delete`]        |
//! | [`Unique`] | [`SlabBox`]       | when the box is dropped              |
//! | [`Shared`] | [`SlabArc`]       | when the last clone is dropped       |

use core::{
    fmt,
    marker::PhantomData,
    ops::{Deref, DerefMut},
    ptr::NonNull,
    sync::atomic::{self, AtomicUsize, Ordering},
};

use crate::{
    object::{SlabObject, Slot},
    pool::Pool,
};

/// Ownership discipline of the pointers an allocator hands out.
pub trait Flavor: Sized + 'static {
    /// Reference count stored next to every object.
    type Count;

    /// Pointer returned for a freshly constructed object.
    type Ptr<'a, O: SlabObject<Flavor = Self>>;

    #[doc(hidden)]
    fn initial_count() -> Self::Count;

    #[doc(hidden)]
    /// # Safety
    ///
    /// `slot` must hold a freshly constructed object that nothing else owns,
    /// and its pool must outlive `'a`.
    unsafe fn adopt<'a, O>(slot: NonNull<Slot<O>>) -> Self::Ptr<'a, O>
    where
        O: SlabObject<Flavor = Self>;
}

/// Unmanaged pointers; the caller releases every object explicitly.
#[derive(Debug)]
pub enum Raw {}

impl Flavor for Raw {
    type Count = ();
    type Ptr<'a, O: SlabObject<Flavor = Self>> = SlabPtr<O>;

    fn initial_count() -> Self::Count {}

    unsafe fn adopt<'a, O>(slot: NonNull<Slot<O>>) -> Self::Ptr<'a, O>
    where
        O: SlabObject<Flavor = Self>,
    {
        SlabPtr { slot }
    }
}

/// Single-owner boxes, released when dropped.
#[derive(Debug)]
pub enum Unique {}

impl Flavor for Unique {
    type Count = ();
    type Ptr<'a, O: SlabObject<Flavor = Self>> = SlabBox<'a, O>;

    fn initial_count() -> Self::Count {}

    unsafe fn adopt<'a, O>(slot: NonNull<Slot<O>>) -> Self::Ptr<'a, O>
    where
        O: SlabObject<Flavor = Self>,
    {
        SlabBox {
            slot,
            _marker: PhantomData,
        }
    }
}

/// Atomically reference-counted pointers, released with the last reference.
#[derive(Debug)]
pub enum Shared {}

impl Flavor for Shared {
    type Count = AtomicUsize;
    type Ptr<'a, O: SlabObject<Flavor = Self>> = SlabArc<'a, O>;

    fn initial_count() -> Self::Count {
        AtomicUsize::new(1)
    }

    unsafe fn adopt<'a, O>(slot: NonNull<Slot<O>>) -> Self::Ptr<'a, O>
    where
        O: SlabObject<Flavor = Self>,
    {
        SlabArc {
            slot,
            _marker: PhantomData,
        }
    }
}

/// Unmanaged pointer to a slab-allocated object.
///
/// Copying the pointer does not copy the object. Exactly one copy must be
/// passed to [`delete`](Self::delete); nothing is released otherwise, and a
/// pool dropped with the object still live reports a leak.
pub struct SlabPtr<O>
where
    O: SlabObject,
{
    slot: NonNull<Slot<O>>,
}

unsafe impl<O> Send for SlabPtr<O>
where
    O: SlabObject + Send,
    Pool<O>: Sync,
{
}

unsafe impl<O> Sync for SlabPtr<O>
where
    O: SlabObject + Sync,
    Pool<O>: Sync,
{
}

impl<O> Clone for SlabPtr<O>
where
    O: SlabObject,
{
    fn clone(&self) -> Self {
        *self
    }
}

impl<O> Copy for SlabPtr<O> where O: SlabObject {}

impl<O> PartialEq for SlabPtr<O>
where
    O: SlabObject,
{
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<O> Eq for SlabPtr<O> where O: SlabObject {}

impl<O> fmt::Debug for SlabPtr<O>
where
    O: SlabObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SlabPtr").field(&self.as_ptr()).finish()
    }
}

impl<O> SlabPtr<O>
where
    O: SlabObject,
{
    /// Returns the address of the object.
    #[must_use]
    pub fn as_ptr(&self) -> NonNull<O> {
        Slot::value_ptr(self.slot)
    }

    /// Borrows the object.
    ///
    /// # Safety
    ///
    /// The object must not have been deleted, and must not be mutated or
    /// deleted while the reference is alive.
    #[must_use]
    pub unsafe fn as_ref<'b>(&self) -> &'b O {
        unsafe { self.as_ptr().as_ref() }
    }

    /// Mutably borrows the object.
    ///
    /// # Safety
    ///
    /// The object must not have been deleted, and no other reference to it
    /// may exist while the returned one is alive.
    #[must_use]
    pub unsafe fn as_mut<'b>(&mut self) -> &'b mut O {
        unsafe { self.as_ptr().as_mut() }
    }

    /// Drops the object and returns its storage to its pool.
    ///
    /// # Safety
    ///
    /// Must be called exactly once per allocated object, while its pool is
    /// still alive. No copy of this pointer may be used afterwards.
    pub unsafe fn delete(self) {
        unsafe { Slot::destroy(self.slot) }
    }
}

/// Uniquely owned slab-allocated object.
///
/// Dropping the box drops the object and returns its storage to the pool it
/// was allocated from.
pub struct SlabBox<'a, O>
where
    O: SlabObject<Flavor = Unique>,
{
    slot: NonNull<Slot<O>>,
    _marker: PhantomData<(&'a Pool<O>, O)>,
}

unsafe impl<O> Send for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique> + Send,
    Pool<O>: Sync,
{
}

unsafe impl<O> Sync for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique> + Sync,
    Pool<O>: Sync,
{
}

impl<O> Drop for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique>,
{
    fn drop(&mut self) {
        unsafe { Slot::destroy(self.slot) }
    }
}

impl<O> Deref for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique>,
{
    type Target = O;

    fn deref(&self) -> &Self::Target {
        unsafe { Slot::value_ptr(self.slot).as_ref() }
    }
}

impl<O> DerefMut for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique>,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { Slot::value_ptr(self.slot).as_mut() }
    }
}

impl<O> fmt::Debug for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<O> fmt::Display for SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique> + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}

impl<O> SlabBox<'_, O>
where
    O: SlabObject<Flavor = Unique>,
{
    /// Returns the address of the object.
    #[must_use]
    pub fn as_ptr(this: &Self) -> NonNull<O> {
        Slot::value_ptr(this.slot)
    }
}

const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Shared, atomically reference-counted slab-allocated object.
///
/// The count starts at one. Cloning increments it; dropping decrements it,
/// and the handle that brings it to zero drops the object and returns its
/// storage to the pool it was allocated from.
pub struct SlabArc<'a, O>
where
    O: SlabObject<Flavor = Shared>,
{
    slot: NonNull<Slot<O>>,
    _marker: PhantomData<(&'a Pool<O>, O)>,
}

unsafe impl<O> Send for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared> + Send + Sync,
    Pool<O>: Sync,
{
}

unsafe impl<O> Sync for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared> + Send + Sync,
    Pool<O>: Sync,
{
}

impl<O> SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared>,
{
    fn count(&self) -> &AtomicUsize {
        unsafe { &(*self.slot.as_ptr()).count }
    }

    /// Returns the number of handles sharing the object.
    #[must_use]
    pub fn strong_count(this: &Self) -> usize {
        this.count().load(Ordering::Acquire)
    }

    /// Returns `true` if both handles point to the same object.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.slot == other.slot
    }

    /// Returns the address of the object.
    #[must_use]
    pub fn as_ptr(this: &Self) -> NonNull<O> {
        Slot::value_ptr(this.slot)
    }

    /// Mutably borrows the object if no other handle shares it.
    pub fn get_mut(this: &mut Self) -> Option<&mut O> {
        if this.count().load(Ordering::Acquire) == 1 {
            Some(unsafe { Slot::value_ptr(this.slot).as_mut() })
        } else {
            None
        }
    }
}

impl<O> Clone for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared>,
{
    fn clone(&self) -> Self {
        let old = self.count().fetch_add(1, Ordering::Relaxed);
        assert!(old <= MAX_REFCOUNT, "SlabArc reference count overflow");
        Self {
            slot: self.slot,
            _marker: PhantomData,
        }
    }
}

impl<O> Drop for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared>,
{
    fn drop(&mut self) {
        if self.count().fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        atomic::fence(Ordering::Acquire);
        unsafe { Slot::destroy(self.slot) }
    }
}

impl<O> Deref for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared>,
{
    type Target = O;

    fn deref(&self) -> &Self::Target {
        unsafe { Slot::value_ptr(self.slot).as_ref() }
    }
}

impl<O> fmt::Debug for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared> + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

impl<O> fmt::Display for SlabArc<'_, O>
where
    O: SlabObject<Flavor = Shared> + fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&**self, f)
    }
}
