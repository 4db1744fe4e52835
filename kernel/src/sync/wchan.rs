//! Wait channels
//!
//! A wait channel is the only place a thread goes to sleep. Every channel is
//! paired with a spinlock owned by whoever embeds it; `sleep` takes that
//! spinlock's guard and gives it up only once the sleeper is on the queue,
//! so a waker holding the same spinlock can never miss it.

use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use kproc_api::{Result, Tid};

use super::{SpinLock, SpinLockGuard};
use crate::sched;
use crate::util::kstrdup;

struct Sleeper {
    tid: Tid,
    woken: AtomicBool,
}

/// A named queue of sleeping threads
pub struct WaitChannel {
    name: String,
    sleepers: SpinLock<VecDeque<Arc<Sleeper>>>,
}

impl WaitChannel {
    /// Create an empty wait channel named `name`
    pub fn new(name: &str) -> Result<Self> {
        Ok(Self {
            name: kstrdup(name)?,
            sleepers: SpinLock::new(VecDeque::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue the caller, release `guard`, and block until woken
    ///
    /// The spinlock behind `guard` must be the only one the caller holds; it
    /// is not reacquired on return.
    pub fn sleep<T>(&self, guard: SpinLockGuard<'_, T>) {
        kassert!(
            !sched::in_interrupt(),
            "wchan {}: sleep in interrupt context",
            self.name
        );
        let held = sched::spinlocks_held();
        kassert!(
            held == 1,
            "wchan {}: sleep while holding another spinlock ({} held)",
            self.name,
            held
        );
        let sleeper = Arc::new(Sleeper {
            tid: sched::current_tid(),
            woken: AtomicBool::new(false),
        });
        self.sleepers.lock().push_back(sleeper.clone());
        drop(guard);

        while !sleeper.woken.load(Ordering::Acquire) {
            sched::park();
        }
    }

    /// Wake the longest sleeper, if any
    ///
    /// The guard argument proves the caller holds the paired spinlock.
    pub fn wake_one<T>(&self, _held: &SpinLockGuard<'_, T>) -> bool {
        let sleeper = self.sleepers.lock().pop_front();
        match sleeper {
            Some(sleeper) => {
                Self::wake(&sleeper);
                true
            }
            None => false,
        }
    }

    /// Wake every sleeper, returning how many there were
    pub fn wake_all<T>(&self, _held: &SpinLockGuard<'_, T>) -> usize {
        let drained: VecDeque<Arc<Sleeper>> = core::mem::take(&mut *self.sleepers.lock());
        for sleeper in drained.iter() {
            Self::wake(sleeper);
        }
        drained.len()
    }

    fn wake(sleeper: &Sleeper) {
        sleeper.woken.store(true, Ordering::Release);
        sched::unpark(sleeper.tid);
    }

    /// Number of threads currently queued
    pub fn sleepers(&self) -> usize {
        self.sleepers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sleepers() == 0
    }
}

impl core::fmt::Debug for WaitChannel {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitChannel")
            .field("name", &self.name)
            .field("sleepers", &self.sleepers())
            .finish()
    }
}
