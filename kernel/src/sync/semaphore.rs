//! Counting semaphore

use alloc::sync::Arc;

use kproc_api::{Error, Result};

use super::{SpinLock, WaitChannel};
use crate::sched;

/// Counting semaphore
///
/// `down` blocks while the count is zero; `up` increments and wakes at most
/// one sleeper. Sleepers re-check the count after waking, so a thread that
/// was woken may go back to sleep if another thread took the unit first.
#[derive(Debug)]
pub struct Semaphore {
    count: SpinLock<u32>,
    wchan: WaitChannel,
}

impl Semaphore {
    /// Create a new semaphore holding `initial` units
    pub fn new(name: &str, initial: u32) -> Result<Self> {
        Ok(Self {
            count: SpinLock::new(initial),
            wchan: WaitChannel::new(name)?,
        })
    }

    /// Allocate a shared semaphore
    pub fn create(name: &str, initial: u32) -> Result<Arc<Self>> {
        Ok(Arc::new(Self::new(name, initial)?))
    }

    /// Name given at creation
    pub fn name(&self) -> &str {
        self.wchan.name()
    }

    /// P: wait until the count is positive, then decrement it
    pub fn down(&self) {
        kassert!(
            !sched::in_interrupt(),
            "semaphore {}: down in interrupt context",
            self.name()
        );
        kassert!(
            sched::spinlocks_held() == 0,
            "semaphore {}: down while holding a spinlock",
            self.name()
        );
        let mut count = self.count.lock();
        while *count == 0 {
            self.wchan.sleep(count);
            count = self.count.lock();
        }
        *count -= 1;
    }

    /// Take a unit only if one is available right now
    pub fn try_down(&self) -> bool {
        let mut count = self.count.lock();
        if *count == 0 {
            return false;
        }
        *count -= 1;
        true
    }

    /// V: increment the count and wake one sleeper
    pub fn up(&self) {
        let mut count = self.count.lock();
        kassert!(*count < u32::MAX, "semaphore {}: count overflow", self.name());
        *count += 1;
        self.wchan.wake_one(&count);
    }

    /// Units currently available
    pub fn count(&self) -> u32 {
        *self.count.lock()
    }

    /// Threads currently blocked in `down`
    pub fn waiters(&self) -> usize {
        self.wchan.sleepers()
    }

    /// Tear the semaphore down; refused while anyone is blocked on it
    pub fn destroy(self: Arc<Self>) -> Result<()> {
        if self.waiters() > 0 {
            log::error!("semaphore {}: destroyed with {} waiters", self.name(), self.waiters());
            return Err(Error::InvariantViolation("semaphore destroyed with waiters"));
        }
        Ok(())
    }
}
