//! Sleeping lock with an owner

use alloc::sync::Arc;

use kproc_api::{Error, Result, Tid};

use super::{SpinLock, WaitChannel};
use crate::sched;

/// Mutual exclusion lock that puts contenders to sleep
///
/// The lock remembers which thread holds it. Acquiring a lock the caller
/// already holds, or releasing a lock held by someone else, halts the kernel.
#[derive(Debug)]
pub struct Lock {
    owner: SpinLock<Option<Tid>>,
    wchan: WaitChannel,
}

impl Lock {
    /// Create a new unheld lock
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            owner: SpinLock::new(None),
            wchan: WaitChannel::new(name)?,
        })
    }

    /// Allocate a shared lock
    pub fn create(name: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(name)?))
    }

    /// Name given at creation
    pub fn name(&self) -> &str {
        self.wchan.name()
    }

    /// Block until the lock is free, then take it
    pub fn acquire(&self) {
        kassert!(
            !sched::in_interrupt(),
            "lock {}: acquire in interrupt context",
            self.name()
        );
        kassert!(
            sched::spinlocks_held() == 0,
            "lock {}: acquire while holding a spinlock",
            self.name()
        );
        let me = sched::current_tid();
        let mut owner = self.owner.lock();
        kassert!(*owner != Some(me), "lock {}: reentrant acquire", self.name());
        while owner.is_some() {
            self.wchan.sleep(owner);
            owner = self.owner.lock();
        }
        *owner = Some(me);
    }

    /// Acquire only if the lock is free right now
    pub fn try_acquire(&self) -> bool {
        let me = sched::current_tid();
        let mut owner = self.owner.lock();
        kassert!(*owner != Some(me), "lock {}: reentrant acquire", self.name());
        if owner.is_some() {
            return false;
        }
        *owner = Some(me);
        true
    }

    /// Give the lock up and wake one contender
    pub fn release(&self) {
        let me = sched::current_tid();
        let mut owner = self.owner.lock();
        kassert!(
            *owner == Some(me),
            "lock {}: released by a thread that does not hold it",
            self.name()
        );
        *owner = None;
        self.wchan.wake_one(&owner);
    }

    /// Whether the calling thread is the holder
    pub fn held_by_caller(&self) -> bool {
        *self.owner.lock() == Some(sched::current_tid())
    }

    pub fn is_held(&self) -> bool {
        self.owner.lock().is_some()
    }

    /// Acquire and return a guard that releases on drop
    pub fn guard(&self) -> LockGuard<'_> {
        self.acquire();
        LockGuard { lock: self }
    }

    pub fn waiters(&self) -> usize {
        self.wchan.sleepers()
    }

    /// Tear the lock down; refused while it is held or waited on
    pub fn destroy(self: Arc<Self>) -> Result<()> {
        if self.is_held() {
            log::error!("lock {}: destroyed while held", self.name());
            return Err(Error::InvariantViolation("lock destroyed while held"));
        }
        if self.waiters() > 0 {
            log::error!("lock {}: destroyed with {} waiters", self.name(), self.waiters());
            return Err(Error::InvariantViolation("lock destroyed with waiters"));
        }
        Ok(())
    }
}

/// Held `Lock`; dropping it releases the lock
pub struct LockGuard<'a> {
    lock: &'a Lock,
}

impl LockGuard<'_> {
    pub fn lock(&self) -> &Lock {
        self.lock
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
