//! Counted spinlock
//!
//! A thin layer over `spin::Mutex` whose guards are charged to the thread
//! that took them, so the blocking primitives can refuse to sleep while the
//! caller still spins someone else out.

use core::fmt;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};

use crate::sched;

/// Short critical sections; never held across a sleep
pub struct SpinLock<T: ?Sized> {
    inner: spin::Mutex<T>,
}

impl<T> SpinLock<T> {
    /// Create a new unlocked spinlock
    pub const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }
}

impl<T: ?Sized> SpinLock<T> {
    /// Spin until the lock is ours
    pub fn lock(&self) -> SpinLockGuard<'_, T> {
        let guard = self.inner.lock();
        let counted = sched::spinlock_acquired();
        SpinLockGuard {
            guard,
            counted,
            _not_send: PhantomData,
        }
    }

    /// Whether any thread holds the lock right now
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for SpinLock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

/// Held `SpinLock`; stays on the thread that took it
pub struct SpinLockGuard<'a, T: ?Sized> {
    guard: spin::MutexGuard<'a, T>,
    // Locks taken before the scheduler hook was installed are not charged
    counted: bool,
    _not_send: PhantomData<*const ()>,
}

impl<T: ?Sized> Deref for SpinLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized> DerefMut for SpinLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized> Drop for SpinLockGuard<'_, T> {
    fn drop(&mut self) {
        if self.counted {
            sched::spinlock_released();
        }
    }
}
