//! Underlying memory sources that slabs are carved from.

use core::{alloc::Layout, ptr::NonNull};

/// Provider of slab-sized, aligned memory blocks.
///
/// A pool calls [`acquire`](Self::acquire) only when it needs a new slab and
/// returns every block through [`release`](Self::release) when it is torn
/// down. Failure to acquire is reported as `None` and is treated by the pool
/// exactly like quota exhaustion.
///
/// # Safety
///
/// A block returned by `acquire` must be valid for reads and writes of
/// `layout.size()` bytes, aligned to `layout.align()`, and must not be handed
/// out again until it is passed back to `release`.
pub unsafe trait SlabSource {
    /// Acquires a block of memory fitting `layout`.
    fn acquire(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Returns a block previously obtained from [`acquire`](Self::acquire).
    ///
    /// # Safety
    ///
    /// `ptr` must come from `acquire` on this source with the same `layout`,
    /// and must not be used afterwards.
    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Memory source backed by the global allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalSource;

unsafe impl SlabSource for GlobalSource {
    fn acquire(&self, layout: Layout) -> Option<NonNull<u8>> {
        NonNull::new(unsafe { alloc::alloc::alloc(layout) })
    }

    unsafe fn release(&self, ptr: NonNull<u8>, layout: Layout) {
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_source_respects_alignment() {
        let layout = Layout::from_size_align(256, 256).unwrap();
        let ptr = GlobalSource.acquire(layout).unwrap();
        assert_eq!(ptr.addr().get() % 256, 0);
        unsafe {
            ptr.as_ptr().write_bytes(0x33, layout.size());
            GlobalSource.release(ptr, layout);
        }
    }
}
