//! Slab layout and the two intrusive lists a pool is built from.
//!
//! # Memory Layout
//!
//! Every slab is a single block of `slab_size` bytes obtained from a
//! [`SlabSource`](crate::SlabSource). It starts with a small header and is
//! followed by as many allocation units as fit:
//!
//! ```text
//! ┌────────────────────┬─────────┬─────────┬─────┬───────────┬───────┐
//! │ SlabHeader         │ unit 0  │ unit 1  │ ... │ unit N-1  │ slack │
//! │ next | alloc_count │         │         │     │           │       │
//! └────────────────────┴─────────┴─────────┴─────┴───────────┴───────┘
//! ```
//!
//! Units are handed out front to back (`alloc_count` is the bump index and
//! never decreases). A released unit is reinterpreted as a [`FreeNode`] and
//! pushed on the pool's [`FreeList`]; it never returns to its slab.

use core::{alloc::Layout, mem, ptr::NonNull};

/// Link stored in a unit while it sits on the free list.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FreeNode {
    next: Option<NonNull<FreeNode>>,
}

/// Bookkeeping placed at the start of every slab.
#[derive(Debug)]
pub(crate) struct SlabHeader {
    next: Option<NonNull<SlabHeader>>,
    alloc_count: usize,
}

const fn round_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Compile-time description of how a slab is carved into units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlabGeometry {
    /// Size in bytes of one slab, header included.
    pub slab_size: usize,
    /// Size in bytes of one allocation unit.
    pub unit_size: usize,
    /// Alignment of one allocation unit.
    pub unit_align: usize,
    /// Offset of the first unit from the start of the slab.
    pub overhead: usize,
    /// Number of units carved out of every slab.
    pub units_per_slab: usize,
}

impl SlabGeometry {
    /// Computes the geometry of a `slab_size`-byte slab whose units hold a
    /// `payload` when live and a free-list link when free.
    ///
    /// A unit is as large and as strictly aligned as the larger of the two.
    ///
    /// # Panics
    ///
    /// Panics if not even one unit fits. When evaluated in a constant, as
    /// pools do, this is a build error.
    #[must_use]
    pub const fn new(slab_size: usize, payload: Layout) -> Self {
        let free = Layout::new::<FreeNode>();
        let unit_align = max(payload.align(), free.align());
        let unit_size = round_up(max(payload.size(), free.size()), unit_align);
        let overhead = round_up(mem::size_of::<SlabHeader>(), unit_align);

        assert!(
            slab_size > overhead,
            "SLAB_SIZE too small to hold slab bookkeeping"
        );
        let units_per_slab = (slab_size - overhead) / unit_size;
        assert!(
            units_per_slab > 0,
            "SLAB_SIZE too small to hold even one allocation unit"
        );

        Self {
            slab_size,
            unit_size,
            unit_align,
            overhead,
            units_per_slab,
        }
    }

    /// Layout requested from the memory source for one slab.
    #[must_use]
    pub const fn slab_layout(&self) -> Layout {
        let align = max(self.unit_align, mem::align_of::<SlabHeader>());
        match Layout::from_size_align(self.slab_size, align) {
            Ok(layout) => layout,
            Err(_) => panic!("invalid slab layout"),
        }
    }
}

const fn max(a: usize, b: usize) -> usize {
    if a > b { a } else { b }
}

/// Newest-first list of the slabs owned by a pool.
///
/// The head is the active slab, the only one units are still bumped from.
#[derive(Debug, Default)]
pub(crate) struct SlabList {
    head: Option<NonNull<SlabHeader>>,
    len: usize,
}

impl SlabList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Installs a freshly acquired block as the new active slab.
    ///
    /// # Safety
    ///
    /// `mem` must be valid for `geometry.slab_layout()` and exclusively owned
    /// by this list from now on.
    pub(crate) unsafe fn push(&mut self, mem: NonNull<u8>) {
        let slab = mem.cast::<SlabHeader>();
        unsafe {
            slab.write(SlabHeader {
                next: self.head,
                alloc_count: 0,
            });
        }
        self.head = Some(slab);
        self.len += 1;
    }

    /// Bump-allocates the next never-used unit of the active slab.
    pub(crate) fn bump(&mut self, geometry: &SlabGeometry) -> Option<NonNull<u8>> {
        let mut slab = self.head?;
        let header = unsafe { slab.as_mut() };
        if header.alloc_count >= geometry.units_per_slab {
            return None;
        }
        let offset = geometry.overhead + header.alloc_count * geometry.unit_size;
        header.alloc_count += 1;
        Some(unsafe { slab.cast::<u8>().add(offset) })
    }

    /// Total number of units ever carved out of all slabs.
    pub(crate) fn carved(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head;
        while let Some(slab) = cursor {
            let header = unsafe { slab.as_ref() };
            count += header.alloc_count;
            cursor = header.next;
        }
        count
    }

    /// Detaches every slab, newest first.
    pub(crate) fn take_all(&mut self) -> SlabDrain {
        self.len = 0;
        SlabDrain {
            cursor: self.head.take(),
        }
    }
}

pub(crate) struct SlabDrain {
    cursor: Option<NonNull<SlabHeader>>,
}

impl Iterator for SlabDrain {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let slab = self.cursor?;
        self.cursor = unsafe { slab.as_ref() }.next;
        Some(slab.cast())
    }
}

/// LIFO list of released units.
#[derive(Debug, Default)]
pub(crate) struct FreeList {
    head: Option<NonNull<FreeNode>>,
    len: usize,
}

impl FreeList {
    pub(crate) const fn new() -> Self {
        Self { head: None, len: 0 }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Pushes a released unit.
    ///
    /// # Safety
    ///
    /// `unit` must be a unit carved from a slab of the owning pool, must not
    /// be on the list already, and must hold no live object.
    pub(crate) unsafe fn push(&mut self, unit: NonNull<u8>) {
        let node = unit.cast::<FreeNode>();
        unsafe { node.write(FreeNode { next: self.head }) };
        self.head = Some(node);
        self.len += 1;
    }

    pub(crate) fn pop(&mut self) -> Option<NonNull<u8>> {
        let node = self.head?;
        self.head = unsafe { node.read() }.next;
        self.len -= 1;
        Some(node.cast())
    }

    pub(crate) fn clear(&mut self) {
        self.head = None;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(32))]
    struct Aligned32([u8; 40]);

    fn with_slab<F>(geometry: &SlabGeometry, f: F)
    where
        F: FnOnce(&mut SlabList),
    {
        let layout = geometry.slab_layout();
        let mem = NonNull::new(unsafe { std::alloc::alloc(layout) }).unwrap();
        let mut list = SlabList::new();
        unsafe { list.push(mem) };
        f(&mut list);
        for slab in list.take_all() {
            unsafe { std::alloc::dealloc(slab.as_ptr(), layout) };
        }
    }

    #[test]
    fn geometry_small_object() {
        let geometry = SlabGeometry::new(48, Layout::new::<u64>());
        assert_eq!(geometry.unit_size, 8);
        assert_eq!(geometry.unit_align, 8);
        assert_eq!(geometry.overhead, mem::size_of::<SlabHeader>());
        assert_eq!(geometry.units_per_slab, 4);
    }

    #[test]
    fn geometry_unit_never_smaller_than_free_node() {
        let geometry = SlabGeometry::new(4096, Layout::new::<u8>());
        assert_eq!(geometry.unit_size, mem::size_of::<FreeNode>());
        assert_eq!(geometry.unit_align, mem::align_of::<FreeNode>());
    }

    #[test]
    fn geometry_pads_units_and_header_to_alignment() {
        let geometry = SlabGeometry::new(1024, Layout::new::<Aligned32>());
        assert_eq!(geometry.unit_size, 64);
        assert_eq!(geometry.unit_align, 32);
        assert_eq!(geometry.overhead, 32);
        assert_eq!(geometry.units_per_slab, (1024 - 32) / 64);
        assert_eq!(geometry.slab_layout().align(), 32);
        assert_eq!(geometry.slab_layout().size(), 1024);
    }

    #[test]
    fn geometry_default_slab_size() {
        let geometry = SlabGeometry::new(16 << 10, Layout::new::<[u64; 4]>());
        assert_eq!(geometry.units_per_slab, ((16 << 10) - geometry.overhead) / 32);
    }

    #[test]
    #[should_panic(expected = "too small to hold even one allocation unit")]
    fn geometry_rejects_oversized_object() {
        let _ = SlabGeometry::new(64, Layout::new::<[u8; 64]>());
    }

    #[test]
    #[should_panic(expected = "too small to hold slab bookkeeping")]
    fn geometry_rejects_slab_smaller_than_header() {
        let _ = SlabGeometry::new(8, Layout::new::<u8>());
    }

    #[test]
    fn bump_hands_out_consecutive_units() {
        let geometry = SlabGeometry::new(48, Layout::new::<u64>());
        with_slab(&geometry, |list| {
            let first = list.bump(&geometry).unwrap();
            let units = core::iter::from_fn(|| list.bump(&geometry)).collect::<Vec<_>>();
            assert_eq!(units.len(), 3);
            for (i, unit) in units.iter().enumerate() {
                assert_eq!(unit.addr().get(), first.addr().get() + (i + 1) * 8);
            }
            assert_eq!(list.carved(), 4);
            assert!(list.bump(&geometry).is_none());
            assert_eq!(list.carved(), 4);
        });
    }

    #[test]
    fn first_unit_is_aligned() {
        let geometry = SlabGeometry::new(1024, Layout::new::<Aligned32>());
        with_slab(&geometry, |list| {
            while let Some(unit) = list.bump(&geometry) {
                assert_eq!(unit.addr().get() % 32, 0);
            }
        });
    }

    #[test]
    fn free_list_is_lifo() {
        let geometry = SlabGeometry::new(48, Layout::new::<u64>());
        with_slab(&geometry, |list| {
            let a = list.bump(&geometry).unwrap();
            let b = list.bump(&geometry).unwrap();
            let mut free = FreeList::new();
            unsafe {
                free.push(a);
                free.push(b);
            }
            assert_eq!(free.len(), 2);
            assert_eq!(free.pop(), Some(b));
            assert_eq!(free.pop(), Some(a));
            assert_eq!(free.pop(), None);
            assert_eq!(free.len(), 0);
        });
    }

    #[test]
    fn slab_list_tracks_every_slab() {
        let geometry = SlabGeometry::new(48, Layout::new::<u64>());
        let layout = geometry.slab_layout();
        let mut list = SlabList::new();
        for _ in 0..3 {
            let mem = NonNull::new(unsafe { std::alloc::alloc(layout) }).unwrap();
            unsafe { list.push(mem) };
            list.bump(&geometry).unwrap();
        }
        assert_eq!(list.len(), 3);
        assert_eq!(list.carved(), 3);
        let slabs = list.take_all().collect::<Vec<_>>();
        assert_eq!(slabs.len(), 3);
        assert_eq!(list.len(), 0);
        assert_eq!(list.carved(), 0);
        for slab in slabs {
            unsafe { std::alloc::dealloc(slab.as_ptr(), layout) };
        }
    }
}
