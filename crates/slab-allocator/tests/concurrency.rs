#![cfg(test)]

use std::{
    collections::HashSet,
    sync::atomic::{AtomicUsize, Ordering},
    thread,
};

use slab_allocator::{
    GlobalSource, Instanced, Shared, SlabAllocator, SlabArc, SlabBox, SlabObject, SpinLock,
    Static, StaticSlabAllocator, Unique, declare_static_slab_allocator,
};

const THREADS: usize = 8;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

struct Request {
    tid: usize,
    seq: usize,
}

impl SlabObject for Request {
    type Flavor = Unique;
    type Lock = SpinLock;
    type Source = GlobalSource;
    type Mode = Instanced;
    const SLAB_SIZE: usize = 1024;
}

static REPLY_DROPS: AtomicUsize = AtomicUsize::new(0);

struct Reply {
    status: u32,
}

impl Drop for Reply {
    fn drop(&mut self) {
        REPLY_DROPS.fetch_add(1, Ordering::Relaxed);
    }
}

impl SlabObject for Reply {
    type Flavor = Shared;
    type Lock = SpinLock;
    type Source = GlobalSource;
    type Mode = Instanced;
}

struct Irq {
    vector: usize,
}

impl SlabObject for Irq {
    type Flavor = Unique;
    type Lock = SpinLock;
    type Source = GlobalSource;
    type Mode = Static;
    const SLAB_SIZE: usize = 512;
}

declare_static_slab_allocator!(Irq, max_slabs = 2);

#[test]
fn concurrent_alloc_and_release_balance() {
    init_logger();
    let allocator = SlabAllocator::<Request>::new(2, true);

    thread::scope(|s| {
        for tid in 0..THREADS {
            let allocator = &allocator;
            s.spawn(move || {
                for seq in 0..500 {
                    let Some(request) = allocator.alloc(Request { tid, seq }) else {
                        continue;
                    };
                    assert_eq!((request.tid, request.seq), (tid, seq));
                }
            });
        }
    });

    let stats = allocator.stats();
    assert_eq!(stats.live(), 0);
    assert!(stats.slab_count <= 2);
}

#[test]
fn contended_exhaustion_hands_out_distinct_units() {
    init_logger();
    let allocator = SlabAllocator::<Request>::new(3, false);
    let capacity = 3 * SlabAllocator::<Request>::ALLOCS_PER_SLAB;

    let held = thread::scope(|s| {
        let workers = (0..THREADS)
            .map(|tid| {
                let allocator = &allocator;
                s.spawn(move || {
                    std::iter::successors(Some(0), |seq| Some(seq + 1))
                        .map_while(|seq| allocator.alloc(Request { tid, seq }))
                        .collect::<Vec<_>>()
                })
            })
            .collect::<Vec<_>>();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect::<Vec<_>>()
    });

    assert_eq!(held.len(), capacity);
    let addresses = held.iter().map(SlabBox::as_ptr).collect::<HashSet<_>>();
    assert_eq!(addresses.len(), capacity);
    assert!(held.iter().all(|r| r.tid < THREADS));
    assert_eq!(allocator.stats().slab_count, 3);
    assert!(allocator.alloc(Request { tid: 0, seq: 0 }).is_none());
}

#[test]
fn shared_reply_released_by_last_thread() {
    init_logger();
    let allocator = SlabAllocator::<Reply>::new(1, false);
    let reply = allocator.alloc(Reply { status: 200 }).unwrap();
    let before = REPLY_DROPS.load(Ordering::Relaxed);

    thread::scope(|s| {
        for _ in 0..THREADS {
            let reply = SlabArc::clone(&reply);
            s.spawn(move || {
                let extra = (0..100).map(|_| SlabArc::clone(&reply)).collect::<Vec<_>>();
                assert!(extra.iter().all(|r| r.status == 200));
            });
        }
    });

    assert_eq!(SlabArc::strong_count(&reply), 1);
    assert_eq!(REPLY_DROPS.load(Ordering::Relaxed), before);
    drop(reply);
    assert_eq!(REPLY_DROPS.load(Ordering::Relaxed), before + 1);
    assert_eq!(allocator.stats().live(), 0);
}

#[test]
fn static_pool_is_shared_by_all_threads() {
    init_logger();
    thread::scope(|s| {
        for vector in 0..THREADS {
            s.spawn(move || {
                for _ in 0..200 {
                    if let Some(irq) = StaticSlabAllocator::<Irq>::alloc(Irq { vector }) {
                        assert_eq!(irq.vector, vector);
                    }
                }
            });
        }
    });

    let stats = StaticSlabAllocator::<Irq>::stats();
    assert_eq!(stats.live(), 0);
    assert!(stats.slab_count <= StaticSlabAllocator::<Irq>::max_slabs());
    StaticSlabAllocator::<Irq>::teardown().unwrap();
}
