//! Process record

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use kproc_api::platform::AddressSpace;
use kproc_api::vfs::Vnode;
use kproc_api::{Pid, Result};

use super::fd::{FileTable, OpenFile};
use super::rendezvous::ExitRendezvous;
use crate::sync::{SpinLock, SpinLockGuard};
use crate::util::kstrdup;

/// Fields guarded by the record's spinlock
pub(crate) struct ProcInner {
    pub(crate) threads: usize,
    pub(crate) addrspace: Option<Arc<dyn AddressSpace>>,
    pub(crate) cwd: Option<Arc<dyn Vnode>>,
    pub(crate) parent: Pid,
    pub(crate) children: Vec<Pid>,
    pub(crate) exited: bool,
}

/// A process
///
/// The record outlives its threads: after exit it stays in the process
/// table, holding the exit status, until a waiter reaps it.
pub struct Proc {
    pid: Pid,
    name: String,
    inner: SpinLock<ProcInner>,
    files: SpinLock<FileTable>,
    rendezvous: SpinLock<Option<Arc<ExitRendezvous>>>,
}

impl Proc {
    pub(crate) fn new(pid: Pid, name: &str, parent: Pid, open_max: usize) -> Result<Self> {
        Ok(Self {
            pid,
            name: kstrdup(name)?,
            inner: SpinLock::new(ProcInner {
                threads: 0,
                addrspace: None,
                cwd: None,
                parent,
                children: Vec::new(),
                exited: false,
            }),
            files: SpinLock::new(FileTable::new(open_max)?),
            rendezvous: SpinLock::new(None),
        })
    }

    /// Pid the record is registered under (0 for the kernel process)
    pub fn pid(&self) -> Pid {
        self.pid
    }

    /// Name given at creation, copied into a fork child
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current parent; init once the original parent is gone
    pub fn parent_pid(&self) -> Pid {
        self.inner.lock().parent
    }

    /// Snapshot of the child pid list, oldest first
    pub fn children(&self) -> Vec<Pid> {
        self.inner.lock().children.clone()
    }

    /// Threads attached to the process
    pub fn thread_count(&self) -> usize {
        self.inner.lock().threads
    }

    /// Whether an address space is installed
    pub fn has_address_space(&self) -> bool {
        self.inner.lock().addrspace.is_some()
    }

    /// Shared handle to the address space, if there is one
    pub fn address_space(&self) -> Option<Arc<dyn AddressSpace>> {
        self.inner.lock().addrspace.clone()
    }

    /// Install `space`, returning the previous one
    pub fn set_address_space(
        &self,
        space: Option<Arc<dyn AddressSpace>>,
    ) -> Option<Arc<dyn AddressSpace>> {
        core::mem::replace(&mut self.inner.lock().addrspace, space)
    }

    /// Working directory, if any
    pub fn cwd(&self) -> Option<Arc<dyn Vnode>> {
        self.inner.lock().cwd.clone()
    }

    /// Replace the working directory, returning the old one
    pub fn set_cwd(&self, cwd: Option<Arc<dyn Vnode>>) -> Option<Arc<dyn Vnode>> {
        core::mem::replace(&mut self.inner.lock().cwd, cwd)
    }

    pub fn has_exited(&self) -> bool {
        self.inner.lock().exited
    }

    /// Exit status, once the process has exited
    pub fn exit_status(&self) -> Option<u8> {
        self.rendezvous().and_then(|rendezvous| rendezvous.status())
    }

    /// Whether some thread has claimed this process's exit status
    pub fn has_waiter(&self) -> bool {
        self.rendezvous()
            .is_some_and(|rendezvous| rendezvous.is_claimed())
    }

    pub fn file(&self, fd: usize) -> Result<Arc<OpenFile>> {
        self.files.lock().get(fd)
    }

    pub fn open_files(&self) -> usize {
        self.files.lock().open_count()
    }

    pub(crate) fn lock(&self) -> SpinLockGuard<'_, ProcInner> {
        self.inner.lock()
    }

    pub(crate) fn files(&self) -> SpinLockGuard<'_, FileTable> {
        self.files.lock()
    }

    pub(crate) fn add_child(&self, child: Pid) {
        self.inner.lock().children.push(child);
    }

    /// Drop `child` from the list; absent pids are ignored
    pub(crate) fn remove_child(&self, child: Pid) -> bool {
        let mut inner = self.inner.lock();
        match inner.children.iter().position(|&pid| pid == child) {
            Some(index) => {
                inner.children.remove(index);
                true
            }
            None => false,
        }
    }

    pub(crate) fn rendezvous(&self) -> Option<Arc<ExitRendezvous>> {
        self.rendezvous.lock().clone()
    }

    pub(crate) fn install_rendezvous(&self, rendezvous: Arc<ExitRendezvous>) {
        *self.rendezvous.lock() = Some(rendezvous);
    }

    pub(crate) fn take_rendezvous(&self) -> Option<Arc<ExitRendezvous>> {
        self.rendezvous.lock().take()
    }
}

impl core::fmt::Debug for Proc {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Proc")
            .field("pid", &self.pid)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
