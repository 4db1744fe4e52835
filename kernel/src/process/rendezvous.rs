//! Exit rendezvous
//!
//! One per registered process. The exiting thread posts the status and
//! raises the semaphore; exactly one waiter may claim the rendezvous and
//! lower it.

use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, Ordering};

use kproc_api::{Error, Pid, Result};

use crate::sync::{Semaphore, SpinLock};

pub struct ExitRendezvous {
    pid: Pid,
    sem: Semaphore,
    status: SpinLock<Option<u8>>,
    claimed: AtomicBool,
}

impl ExitRendezvous {
    pub(crate) fn create(pid: Pid, name: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            pid,
            sem: Semaphore::new(name, 0)?,
            status: SpinLock::new(None),
            claimed: AtomicBool::new(false),
        }))
    }

    /// Record the exit status and release the waiter
    pub(crate) fn post(&self, status: u8) {
        {
            let mut slot = self.status.lock();
            kassert!(slot.is_none(), "process {}: exit posted twice", self.pid);
            *slot = Some(status);
        }
        self.sem.up();
    }

    /// Become the one waiter allowed to collect the status
    pub(crate) fn claim(&self) -> Result<()> {
        if self.claimed.swap(true, Ordering::AcqRel) {
            return Err(Error::AlreadyReaped(self.pid));
        }
        Ok(())
    }

    /// Block until the status is posted and return it
    pub(crate) fn wait(&self) -> Result<u8> {
        self.sem.down();
        let status = *self.status.lock();
        status.ok_or(Error::InvariantViolation("rendezvous raised without a status"))
    }

    /// Status, if the process has exited
    pub fn status(&self) -> Option<u8> {
        *self.status.lock()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn waiters(&self) -> usize {
        self.sem.waiters()
    }

    pub(crate) fn destroy(this: Arc<Self>) -> Result<()> {
        if this.waiters() > 0 {
            log::error!("process {}: rendezvous destroyed with a waiter", this.pid);
            return Err(Error::InvariantViolation("rendezvous destroyed with a waiter"));
        }
        Ok(())
    }
}
