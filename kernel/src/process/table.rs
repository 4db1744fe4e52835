//! Process table
//!
//! Fixed-capacity arena indexed by pid. Allocation scans circularly from
//! just past the most recently assigned pid, so freed pids are not reused
//! immediately. Slot 0 is never used.

use alloc::sync::Arc;
use alloc::vec::Vec;

use kproc_api::{Error, Pid, Result};

use super::proc::Proc;
use super::rendezvous::ExitRendezvous;
use crate::sync::SpinLock;

enum Slot {
    Free,
    /// Pid handed out, record still being built
    Reserved,
    Live(Arc<Proc>),
}

impl Slot {
    fn is_free(&self) -> bool {
        matches!(self, Slot::Free)
    }
}

struct TableInner {
    slots: Vec<Slot>,
    last: usize,
    live: usize,
}

pub struct ProcTable {
    inner: SpinLock<TableInner>,
    capacity: usize,
}

impl ProcTable {
    /// Table for pids `1..=capacity`
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity >= Pid::MAX as usize {
            return Err(Error::InvalidArgument("process table capacity"));
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity + 1)
            .map_err(|_| Error::OutOfMemory)?;
        slots.resize_with(capacity + 1, || Slot::Free);
        Ok(Self {
            inner: SpinLock::new(TableInner {
                slots,
                last: 0,
                live: 0,
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Claim a free pid
    ///
    /// Every slot is examined once, starting after the last pid handed out
    /// and wrapping from `capacity` back to 1.
    pub fn reserve(&self) -> Result<Pid> {
        let mut inner = self.inner.lock();
        let mut i = inner.last;
        for _ in 0..self.capacity {
            i = if i >= self.capacity { 1 } else { i + 1 };
            if inner.slots[i].is_free() {
                inner.slots[i] = Slot::Reserved;
                inner.last = i;
                inner.live += 1;
                return Ok(i as Pid);
            }
        }
        Err(Error::TooManyProcesses)
    }

    /// Publish a record under the pid it was reserved with
    pub(crate) fn install(&self, proc: Arc<Proc>) -> Result<()> {
        let index = self.index(proc.pid())?;
        let mut inner = self.inner.lock();
        if !matches!(inner.slots[index], Slot::Reserved) {
            return Err(Error::InvariantViolation("installing into an unreserved slot"));
        }
        inner.slots[index] = Slot::Live(proc);
        Ok(())
    }

    /// Give back a reservation whose record could not be built
    pub(crate) fn cancel(&self, pid: Pid) {
        if let Ok(index) = self.index(pid) {
            let mut inner = self.inner.lock();
            if matches!(inner.slots[index], Slot::Reserved) {
                inner.slots[index] = Slot::Free;
                inner.live -= 1;
            }
        }
    }

    /// Live record for `pid`
    pub fn lookup(&self, pid: Pid) -> Result<Arc<Proc>> {
        let index = self.index(pid)?;
        match &self.inner.lock().slots[index] {
            Slot::Live(proc) => Ok(proc.clone()),
            _ => Err(Error::NoSuchProcess(pid)),
        }
    }

    /// Free the slot holding `proc` and destroy its exit rendezvous
    ///
    /// Refused, with the slot still occupied, while a thread is blocked on
    /// the rendezvous or when `proc` is not the record registered under its
    /// pid.
    pub(crate) fn deregister(&self, proc: &Arc<Proc>) -> Result<()> {
        let pid = proc.pid();
        let index = self.index(pid)?;
        let rendezvous = proc.take_rendezvous();
        if rendezvous.as_ref().is_some_and(|r| r.waiters() > 0) {
            log::error!("proc: {} deregistered with a waiter", pid);
            if let Some(rendezvous) = rendezvous {
                proc.install_rendezvous(rendezvous);
            }
            return Err(Error::InvariantViolation("rendezvous destroyed with a waiter"));
        }

        let freed = {
            let mut inner = self.inner.lock();
            let registered =
                matches!(&inner.slots[index], Slot::Live(live) if Arc::ptr_eq(live, proc));
            if registered {
                inner.slots[index] = Slot::Free;
                inner.live -= 1;
            }
            registered
        };
        match rendezvous {
            Some(rendezvous) if !freed => proc.install_rendezvous(rendezvous),
            Some(rendezvous) => ExitRendezvous::destroy(rendezvous)?,
            None => {}
        }
        if !freed {
            return Err(Error::NoSuchProcess(pid));
        }
        Ok(())
    }

    /// Occupied slots, reservations included
    pub fn len(&self) -> usize {
        self.inner.lock().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pids of every live record, in slot order
    pub fn pids(&self) -> Vec<Pid> {
        self.inner
            .lock()
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Live(_) => Some(i as Pid),
                _ => None,
            })
            .collect()
    }

    fn index(&self, pid: Pid) -> Result<usize> {
        let index = pid as usize;
        if index == 0 || index > self.capacity {
            return Err(Error::InvalidArgument("pid out of range"));
        }
        Ok(index)
    }
}
