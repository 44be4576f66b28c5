//! Fixed-size object slab allocators for kernel objects.
//!
//! This crate provides deterministic, bounded-memory allocation for kernel
//! object types such as handles, list nodes and message buffers, without
//! relying on a general-purpose heap for every object. Large blocks
//! ("slabs") obtained from a [`SlabSource`] are carved into object-sized
//! units; released units are kept on an intrusive free list and reused before
//! any new slab is acquired. Every allocator has a hard cap on the number of
//! slabs it may acquire.
//!
//! The crate is `no_std` and only needs `alloc` for [`GlobalSource`].
//!
//! # Declaring an Object Type
//!
//! An object type opts in by implementing [`SlabObject`], choosing:
//!
//! - the pointer [`Flavor`] handed out: [`Raw`] ([`SlabPtr`]), [`Unique`]
//!   ([`SlabBox`]) or [`Shared`] ([`SlabArc`]),
//! - the [`RawLock`] guarding its pools: [`SpinLock`] or [`NoLock`],
//! - the [`SlabSource`] slabs come from,
//! - the [`Mode`]: [`Instanced`] or [`Static`],
//! - optionally `SLAB_SIZE` (default [`DEFAULT_SLAB_SIZE`]).
//!
//! Every choice is resolved at compile time, and since a type implements
//! the trait once, it is served by exactly one kind of allocator.
//!
//! ## [`SlabAllocator`]
//!
//! Instanced allocators are ordinary values. Each has its own quota and
//! slabs, and every object records which allocator produced it.
//!
//! ```rust
//! use slab_allocator::{GlobalSource, Instanced, Shared, SlabAllocator, SlabArc, SlabObject, SpinLock};
//!
//! struct MessageBuffer {
//!     len: usize,
//!     data: [u8; 120],
//! }
//!
//! impl SlabObject for MessageBuffer {
//!     type Flavor = Shared;
//!     type Lock = SpinLock;
//!     type Source = GlobalSource;
//!     type Mode = Instanced;
//! }
//!
//! // At most 2 slabs, the first one acquired right away
//! let allocator = SlabAllocator::<MessageBuffer>::new(2, true);
//!
//! let buffer = allocator
//!     .alloc_with(|| MessageBuffer { len: 3, data: [0; 120] })
//!     .expect("quota exhausted");
//! let reader = SlabArc::clone(&buffer);
//! assert_eq!(reader.len, 3);
//! assert_eq!(reader.data[0], 0);
//!
//! // Storage returns to the allocator when the last reference is dropped
//! drop(buffer);
//! drop(reader);
//! assert_eq!(allocator.stats().live(), 0);
//! ```
//!
//! ## [`StaticSlabAllocator`]
//!
//! Static allocators are a single process-wide pool per object type, declared
//! with [`declare_static_slab_allocator!`]. Objects carry no origin tag.
//!
//! # Design Considerations
//!
//! ## Exhaustion
//!
//! Running out of quota and failing to acquire a slab from the source are
//! both reported as `None`. Neither is an error or a panic.
//!
//! ## Leaks
//!
//! A pool keeps all of its slabs until it is torn down. Tearing it down
//! while objects are still live would free memory under them, so it is a
//! fatal error: dropping an instanced allocator panics, and
//! [`StaticSlabAllocator::teardown`] returns a [`LeakError`].
//!
//! ## Thread Safety
//!
//! One lock per pool serializes allocation and release. It is held while a
//! new slab is acquired, so at most one caller installs a new active slab.
//! A pool using [`NoLock`] is not `Sync` and cannot be shared between
//! threads; static pools therefore require a `Sync` lock.
//!
//! ## Performance Characteristics
//!
//! | Operation           | Cost                                   |
//! |---------------------|----------------------------------------|
//! | allocate (recycled) | O(1)                                   |
//! | allocate (bump)     | O(1)                                   |
//! | allocate (new slab) | one call to [`SlabSource::acquire`]    |
//! | release             | O(1)                                   |
//! | teardown            | O(slabs)                               |
//!
//! ## Geometry
//!
//! Objects too large for even one unit per slab are rejected at build time:
//!
//! ```compile_fail
//! use slab_allocator::{GlobalSource, Instanced, NoLock, SlabAllocator, SlabObject, Unique};
//!
//! struct Huge([u8; 8192]);
//!
//! impl SlabObject for Huge {
//!     type Flavor = Unique;
//!     type Lock = NoLock;
//!     type Source = GlobalSource;
//!     type Mode = Instanced;
//!     const SLAB_SIZE: usize = 4096;
//! }
//!
//! let allocator = SlabAllocator::<Huge>::new(1, false);
//! ```

#![cfg_attr(not(test), no_std)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

extern crate alloc;

pub use self::{
    error::{LeakError, Report},
    flavor::{Flavor, Raw, Shared, SlabArc, SlabBox, SlabPtr, Unique},
    instanced::SlabAllocator,
    lock::{Locked, LockedGuard, NoLock, RawLock, SpinLock},
    object::{Instanced, Mode, SlabObject, Slot, Static, StaticSlab},
    pool::{Pool, PoolStats},
    slab::SlabGeometry,
    source::{GlobalSource, SlabSource},
    static_slab::StaticSlabAllocator,
};

mod error;
mod flavor;
mod instanced;
mod lock;
mod object;
mod pool;
mod slab;
mod source;
mod static_slab;

/// Default size in bytes of one slab.
pub const DEFAULT_SLAB_SIZE: usize = 16 << 10;

#[doc(hidden)]
pub mod __private {
    pub use spin::Once;
}
