//! One process-wide allocator per object type.
//!
//! The pool of a static object type lives in a `static` declared by
//! [`declare_static_slab_allocator!`](crate::declare_static_slab_allocator)
//! and is created on first use. Objects carry no origin tag; releasing one
//! routes it to the pool of its type.
//!
//! Statics are never dropped, so a static pool is only checked for leaks and
//! returned to its memory source by [`StaticSlabAllocator::teardown`], once
//! every user has released its objects.

use core::marker::PhantomData;

use crate::{
    error::LeakError,
    flavor::Flavor,
    object::{Static, StaticSlab},
    pool::{Pool, PoolStats},
};

/// Type-scoped operations on the process-wide pool of `O`.
///
/// This type has no values; every operation is an associated function.
///
/// # Examples
///
/// ```
/// use slab_allocator::{
///     GlobalSource, SlabObject, SpinLock, Static, StaticSlabAllocator, Unique,
///     declare_static_slab_allocator,
/// };
///
/// struct Port {
///     id: u32,
/// }
///
/// impl SlabObject for Port {
///     type Flavor = Unique;
///     type Lock = SpinLock;
///     type Source = GlobalSource;
///     type Mode = Static;
/// }
///
/// declare_static_slab_allocator!(Port, max_slabs = 4);
///
/// let port = StaticSlabAllocator::<Port>::alloc(Port { id: 3 }).unwrap();
/// assert_eq!(port.id, 3);
/// drop(port);
/// StaticSlabAllocator::<Port>::teardown().unwrap();
/// ```
pub struct StaticSlabAllocator<O>(PhantomData<fn() -> O>);

impl<O> StaticSlabAllocator<O>
where
    O: StaticSlab<Mode = Static>,
{
    /// Number of objects carved out of one slab.
    pub const ALLOCS_PER_SLAB: usize = Pool::<O>::ALLOCS_PER_SLAB;

    /// Moves `value` into the pool of `O`.
    ///
    /// Returns `None` when the pool is exhausted; `value` is dropped then.
    pub fn alloc(value: O) -> Option<<O::Flavor as Flavor>::Ptr<'static, O>> {
        O::pool().alloc_with(|| value)
    }

    /// Constructs an object in place with `f`.
    ///
    /// `f` is not called when the pool is exhausted. If it panics, the
    /// reserved storage is returned to the pool.
    pub fn alloc_with<F>(f: F) -> Option<<O::Flavor as Flavor>::Ptr<'static, O>>
    where
        F: FnOnce() -> O,
    {
        O::pool().alloc_with(f)
    }

    #[must_use]
    pub fn max_slabs() -> usize {
        O::pool().max_slabs()
    }

    #[must_use]
    pub fn stats() -> PoolStats {
        O::pool().stats()
    }

    /// Returns every slab of the pool to its memory source.
    ///
    /// The pool stays usable afterwards and acquires slabs again on demand.
    ///
    /// # Errors
    ///
    /// Returns [`LeakError`] if any object is still live; no slab is released
    /// in that case.
    #[track_caller]
    pub fn teardown() -> Result<(), LeakError> {
        O::pool().drain()
    }
}

/// Declares the process-wide pool of a static slab object type.
///
/// ```text
/// declare_static_slab_allocator!(Type, max_slabs = N);
/// declare_static_slab_allocator!(Type, max_slabs = N, preallocate = true);
/// declare_static_slab_allocator!(Type, max_slabs = N, source = expr);
/// ```
///
/// The type must implement [`SlabObject`](crate::SlabObject) with
/// `Mode = Static` and a lock that is `Sync`; the pool is reachable from
/// every thread. Without a `source` argument the source type's `Default`
/// value is used. The pool is created on first use.
#[macro_export]
macro_rules! declare_static_slab_allocator {
    (
        $obj:ty,
        max_slabs = $max_slabs:expr
        $(, preallocate = $preallocate:expr)?
        $(, source = $source:expr)?
        $(,)?
    ) => {
        impl $crate::StaticSlab for $obj {
            fn pool() -> &'static $crate::Pool<$obj> {
                static POOL: $crate::__private::Once<$crate::Pool<$obj>> =
                    $crate::__private::Once::new();
                POOL.call_once(|| {
                    $crate::Pool::new(
                        $max_slabs,
                        $crate::__slab_arg_or!($($preallocate)?; false),
                        $crate::__slab_arg_or!($($source)?; ::core::default::Default::default()),
                    )
                })
            }
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __slab_arg_or {
    (; $default:expr) => {
        $default
    };
    ($value:expr; $default:expr) => {
        $value
    };
}

#[cfg(test)]
mod tests {
    use core::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{GlobalSource, Raw, Shared, SlabArc, SlabObject, SpinLock, Unique};

    struct Timer {
        deadline: u64,
    }

    impl SlabObject for Timer {
        type Flavor = Unique;
        type Lock = SpinLock;
        type Source = GlobalSource;
        type Mode = Static;
        const SLAB_SIZE: usize = 48;
    }

    declare_static_slab_allocator!(Timer, max_slabs = 1);

    static EVENT_DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Event(u32);

    impl Drop for Event {
        fn drop(&mut self) {
            EVENT_DROPS.fetch_add(1, Ordering::Relaxed);
        }
    }

    impl SlabObject for Event {
        type Flavor = Shared;
        type Lock = SpinLock;
        type Source = GlobalSource;
        type Mode = Static;
    }

    declare_static_slab_allocator!(Event, max_slabs = 2, preallocate = true);

    struct Token(usize);

    impl SlabObject for Token {
        type Flavor = Raw;
        type Lock = SpinLock;
        type Source = GlobalSource;
        type Mode = Static;
        const SLAB_SIZE: usize = 48;
    }

    declare_static_slab_allocator!(Token, max_slabs = 1, source = GlobalSource);

    #[test]
    fn static_objects_have_no_origin_tag() {
        assert_eq!(size_of::<crate::Slot<Timer>>(), size_of::<Timer>());
        assert_eq!(StaticSlabAllocator::<Timer>::ALLOCS_PER_SLAB, 4);
    }

    #[test]
    fn static_unique_exhausts_and_recycles() {
        let timers = (0..4)
            .map(|deadline| StaticSlabAllocator::<Timer>::alloc(Timer { deadline }).unwrap())
            .collect::<Vec<_>>();
        assert!(StaticSlabAllocator::<Timer>::alloc(Timer { deadline: 9 }).is_none());
        assert_eq!(StaticSlabAllocator::<Timer>::max_slabs(), 1);

        // Vec drops front to back, so the last timer is released last.
        let released = crate::SlabBox::as_ptr(&timers[3]);
        assert_eq!(timers[3].deadline, 3);
        drop(timers);
        let timer = StaticSlabAllocator::<Timer>::alloc_with(|| Timer { deadline: 5 }).unwrap();
        assert_eq!(crate::SlabBox::as_ptr(&timer), released);
        drop(timer);

        assert!(StaticSlabAllocator::<Timer>::teardown().is_ok());
        assert_eq!(StaticSlabAllocator::<Timer>::stats().slab_count, 0);
    }

    #[test]
    fn static_shared_is_preallocated() {
        let stats = StaticSlabAllocator::<Event>::stats();
        assert_eq!(stats.slab_count, 1);

        let event = StaticSlabAllocator::<Event>::alloc(Event(1)).unwrap();
        let clone = SlabArc::clone(&event);
        assert_eq!(clone.0, 1);
        let before = EVENT_DROPS.load(Ordering::Relaxed);
        drop(event);
        assert_eq!(EVENT_DROPS.load(Ordering::Relaxed), before);
        drop(clone);
        assert_eq!(EVENT_DROPS.load(Ordering::Relaxed), before + 1);
    }

    #[test]
    fn static_teardown_reports_leaks() {
        let token = StaticSlabAllocator::<Token>::alloc(Token(42)).unwrap();
        let err = StaticSlabAllocator::<Token>::teardown().unwrap_err();
        assert_eq!(err.live(), 1);
        assert_eq!(StaticSlabAllocator::<Token>::stats().slab_count, 1);

        assert_eq!(unsafe { token.as_ref() }.0, 42);
        unsafe { token.delete() };
        StaticSlabAllocator::<Token>::teardown().unwrap();
        assert_eq!(StaticSlabAllocator::<Token>::stats().slab_count, 0);
    }
}
