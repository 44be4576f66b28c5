//! Types that can live in a slab, and how they find their way home.
//!
//! An object type opts into slab allocation by implementing [`SlabObject`].
//! The implementation fixes, once and for all, the pointer flavor handed out
//! for the type, the lock and memory source of its pools, the slab size, and
//! whether its pools are instanced or static. Because a type can implement
//! the trait only once, a type can never be served by two kinds of
//! allocator.
//!
//! Each live object sits inside a [`Slot`], next to the metadata its flavor
//! and mode need:
//!
//! | mode        | flavor   | per-object overhead            |
//! |-------------|----------|--------------------------------|
//! | `Instanced` | `Raw`    | origin pointer                 |
//! | `Instanced` | `Unique` | origin pointer                 |
//! | `Instanced` | `Shared` | origin pointer + atomic count  |
//! | `Static`    | `Raw`    | none                           |
//! | `Static`    | `Unique` | none                           |
//! | `Static`    | `Shared` | atomic count                   |

use core::ptr::{self, NonNull};

use crate::{
    DEFAULT_SLAB_SIZE,
    flavor::Flavor,
    lock::RawLock,
    pool::{Pool, ReleaseGuard},
    source::SlabSource,
};

/// An object type served by slab pools.
///
/// # Examples
///
/// ```
/// use slab_allocator::{GlobalSource, Instanced, SlabAllocator, SlabObject, SpinLock, Unique};
///
/// struct Handle {
///     koid: u64,
///     rights: u32,
/// }
///
/// impl SlabObject for Handle {
///     type Flavor = Unique;
///     type Lock = SpinLock;
///     type Source = GlobalSource;
///     type Mode = Instanced;
///     const SLAB_SIZE: usize = 4096;
/// }
///
/// let allocator = SlabAllocator::<Handle>::new(1, true);
/// let handle = allocator.alloc(Handle { koid: 1, rights: 0x3 }).unwrap();
/// assert_eq!(handle.koid, 1);
/// ```
pub trait SlabObject: Sized + 'static {
    /// Pointer flavor handed out by the allocator.
    type Flavor: Flavor;
    /// Lock guarding every pool of this type.
    type Lock: RawLock;
    /// Memory source slabs are acquired from.
    type Source: SlabSource;
    /// Instanced or static pools.
    type Mode: Mode<Self>;

    /// Size in bytes of every slab, bookkeeping included.
    const SLAB_SIZE: usize = DEFAULT_SLAB_SIZE;
}

/// Strategy routing a released object back to the pool that produced it.
pub trait Mode<O>: Sized + 'static
where
    O: SlabObject,
{
    /// Origin tag stored in every slot.
    type Tag: Copy;

    #[doc(hidden)]
    fn tag(pool: &Pool<O>) -> Self::Tag;

    #[doc(hidden)]
    /// # Safety
    ///
    /// `tag` must have been produced by [`tag`](Self::tag) on a pool that is
    /// still alive.
    unsafe fn origin<'a>(tag: Self::Tag) -> &'a Pool<O>;
}

/// Every allocator is an independent value with its own quota.
///
/// Objects record the pool they came from.
#[derive(Debug)]
pub enum Instanced {}

impl<O> Mode<O> for Instanced
where
    O: SlabObject,
{
    type Tag = NonNull<Pool<O>>;

    fn tag(pool: &Pool<O>) -> Self::Tag {
        NonNull::from(pool)
    }

    unsafe fn origin<'a>(tag: Self::Tag) -> &'a Pool<O> {
        unsafe { tag.as_ref() }
    }
}

/// One process-wide pool per object type.
///
/// Objects carry no origin; the type itself names the pool. The storage is
/// declared with [`declare_static_slab_allocator!`](crate::declare_static_slab_allocator).
#[derive(Debug)]
pub enum Static {}

impl<O> Mode<O> for Static
where
    O: StaticSlab,
{
    type Tag = ();

    fn tag(_pool: &Pool<O>) -> Self::Tag {}

    unsafe fn origin<'a>((): Self::Tag) -> &'a Pool<O> {
        O::pool()
    }
}

/// Access to the process-wide pool of a static slab object.
///
/// Implemented by [`declare_static_slab_allocator!`](crate::declare_static_slab_allocator).
pub trait StaticSlab: SlabObject {
    /// Returns the pool, creating it on first use.
    fn pool() -> &'static Pool<Self>;
}

/// A live object together with its origin tag and reference count.
#[repr(C)]
pub struct Slot<O>
where
    O: SlabObject,
{
    pub(crate) origin: <O::Mode as Mode<O>>::Tag,
    pub(crate) count: <O::Flavor as Flavor>::Count,
    pub(crate) value: O,
}

impl<O> Slot<O>
where
    O: SlabObject,
{
    pub(crate) fn new(pool: &Pool<O>, value: O) -> Self {
        Self {
            origin: <O::Mode as Mode<O>>::tag(pool),
            count: <O::Flavor as Flavor>::initial_count(),
            value,
        }
    }

    /// Returns a pointer to the object inside `slot`.
    pub(crate) fn value_ptr(slot: NonNull<Self>) -> NonNull<O> {
        unsafe { NonNull::new_unchecked(&raw mut (*slot.as_ptr()).value) }
    }

    /// Drops the object and returns its unit to the originating pool.
    ///
    /// # Safety
    ///
    /// `slot` must hold a live object, its pool must still be alive, and no
    /// reference to the object may be used afterwards.
    pub(crate) unsafe fn destroy(slot: NonNull<Self>) {
        unsafe {
            let tag = (*slot.as_ptr()).origin;
            // The unit goes back to the pool even if the destructor panics.
            let _release = ReleaseGuard {
                pool: <O::Mode as Mode<O>>::origin(tag),
                slot,
            };
            ptr::drop_in_place(slot.as_ptr());
        }
    }
}
