//! Pluggable lock strategies guarding a pool's slab list and free list.
//!
//! A pool is generic over a [`RawLock`], which only knows how to acquire and
//! release mutual exclusion. [`Locked`] pairs such a lock with the data it
//! protects and hands out RAII guards, in the same shape as a regular mutex.
//!
//! Two strategies are provided:
//!
//! - [`SpinLock`]: a busy-waiting lock usable from any context, including
//!   ones where blocking is not possible.
//! - [`NoLock`]: performs no synchronization at all. It is `!Sync`, so a pool
//!   using it cannot be shared between threads; the type system rejects the
//!   configurations in which it would be unsound.

use core::{
    cell::{Cell, UnsafeCell},
    fmt,
    marker::PhantomData,
    mem,
    ops::{Deref, DerefMut},
};

use spin::mutex::SpinMutex;

/// A raw mutual-exclusion primitive.
///
/// # Safety
///
/// Implementations must guarantee that between a successful [`lock`] (or a
/// [`try_lock`] returning `true`) and the matching [`unlock`], no other
/// caller sharing the same instance can acquire the lock. Implementations
/// that cannot guarantee this across threads must not be `Sync`.
///
/// [`lock`]: RawLock::lock
/// [`try_lock`]: RawLock::try_lock
/// [`unlock`]: RawLock::unlock
pub unsafe trait RawLock {
    /// Initial, unlocked state.
    const INIT: Self;

    /// Acquires the lock, waiting until it becomes available.
    fn lock(&self);

    /// Attempts to acquire the lock without waiting.
    fn try_lock(&self) -> bool;

    /// Releases the lock.
    ///
    /// # Safety
    ///
    /// The lock must be held by the caller.
    unsafe fn unlock(&self);
}

/// Busy-waiting lock.
pub struct SpinLock {
    inner: SpinMutex<()>,
}

unsafe impl RawLock for SpinLock {
    const INIT: Self = Self {
        inner: SpinMutex::new(()),
    };

    fn lock(&self) {
        mem::forget(self.inner.lock());
    }

    fn try_lock(&self) -> bool {
        self.inner.try_lock().map(mem::forget).is_some()
    }

    unsafe fn unlock(&self) {
        debug_assert!(self.inner.is_locked(), "SpinLock unlocked without being held");
        unsafe { self.inner.force_unlock() }
    }
}

impl Default for SpinLock {
    fn default() -> Self {
        Self::INIT
    }
}

impl fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpinLock")
            .field("locked", &self.inner.is_locked())
            .finish()
    }
}

/// Lock that does nothing.
///
/// Only valid when every access is already serialized by the caller. The
/// `!Sync` marker keeps a pool using this lock on a single thread.
#[derive(Debug, Default)]
pub struct NoLock {
    _not_sync: PhantomData<Cell<()>>,
}

unsafe impl RawLock for NoLock {
    const INIT: Self = Self {
        _not_sync: PhantomData,
    };

    fn lock(&self) {}

    fn try_lock(&self) -> bool {
        true
    }

    unsafe fn unlock(&self) {}
}

/// Data protected by a [`RawLock`].
pub struct Locked<L, T> {
    lock: L,
    data: UnsafeCell<T>,
}

unsafe impl<L, T> Sync for Locked<L, T>
where
    L: RawLock + Sync,
    T: Send,
{
}

impl<L, T> fmt::Debug for Locked<L, T>
where
    L: RawLock,
    T: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut d = f.debug_struct("Locked");
        match self.try_lock() {
            Some(guard) => d.field("data", &&*guard),
            None => d.field("data", &"<locked>"),
        };
        d.finish()
    }
}

impl<L, T> Locked<L, T>
where
    L: RawLock,
{
    pub const fn new(data: T) -> Self {
        Self {
            lock: L::INIT,
            data: UnsafeCell::new(data),
        }
    }

    pub fn lock(&self) -> LockedGuard<'_, L, T> {
        self.lock.lock();
        LockedGuard { locked: self }
    }

    pub fn try_lock(&self) -> Option<LockedGuard<'_, L, T>> {
        self.lock.try_lock().then(|| LockedGuard { locked: self })
    }
}

pub struct LockedGuard<'a, L, T>
where
    L: RawLock,
{
    locked: &'a Locked<L, T>,
}

impl<L, T> Drop for LockedGuard<'_, L, T>
where
    L: RawLock,
{
    fn drop(&mut self) {
        unsafe { self.locked.lock.unlock() }
    }
}

impl<L, T> Deref for LockedGuard<'_, L, T>
where
    L: RawLock,
{
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.locked.data.get() }
    }
}

impl<L, T> DerefMut for LockedGuard<'_, L, T>
where
    L: RawLock,
{
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.locked.data.get() }
    }
}
