//! Condition variable

use alloc::sync::Arc;

use kproc_api::{Error, Result};

use super::{Lock, SpinLock, WaitChannel};
use crate::sched;

/// Mesa-style condition variable
///
/// `wait` gives up the supplied `Lock` and sleeps in one step with respect
/// to `signal` and `broadcast`, which must be called with the same lock held.
/// A woken waiter reacquires the lock before returning and must re-check its
/// predicate.
#[derive(Debug)]
pub struct CondVar {
    guard: SpinLock<()>,
    wchan: WaitChannel,
}

impl CondVar {
    /// Create a new condition variable with no waiters
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            guard: SpinLock::new(()),
            wchan: WaitChannel::new(name)?,
        })
    }

    /// Allocate a shared condition variable
    pub fn create(name: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(name)?))
    }

    pub fn name(&self) -> &str {
        self.wchan.name()
    }

    /// Release `lock`, sleep until signalled, then reacquire `lock`
    pub fn wait(&self, lock: &Lock) {
        kassert!(
            !sched::in_interrupt(),
            "cv {}: wait in interrupt context",
            self.name()
        );
        kassert!(
            sched::spinlocks_held() == 0,
            "cv {}: wait while holding a spinlock",
            self.name()
        );
        kassert!(
            lock.held_by_caller(),
            "cv {}: wait without holding {}",
            self.name(),
            lock.name()
        );
        let guard = self.guard.lock();
        lock.release();
        self.wchan.sleep(guard);
        lock.acquire();
    }

    /// Wake one waiter
    pub fn signal(&self, lock: &Lock) {
        kassert!(
            lock.held_by_caller(),
            "cv {}: signal without holding {}",
            self.name(),
            lock.name()
        );
        let guard = self.guard.lock();
        self.wchan.wake_one(&guard);
    }

    /// Wake every waiter
    pub fn broadcast(&self, lock: &Lock) {
        kassert!(
            lock.held_by_caller(),
            "cv {}: broadcast without holding {}",
            self.name(),
            lock.name()
        );
        let guard = self.guard.lock();
        self.wchan.wake_all(&guard);
    }

    pub fn waiters(&self) -> usize {
        self.wchan.sleepers()
    }

    pub fn destroy(self: Arc<Self>) -> Result<()> {
        if self.waiters() > 0 {
            log::error!("cv {}: destroyed with {} waiters", self.name(), self.waiters());
            return Err(Error::InvariantViolation("condition variable destroyed with waiters"));
        }
        Ok(())
    }
}
