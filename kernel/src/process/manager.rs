//! Process lifecycle manager
//!
//! `ProcManager` is the context handle for everything process-related: the
//! table, the kernel-owner process, the thread -> process map behind
//! `curproc`, and the system-wide open-file table. There is one per kernel
//! image; tests build as many as they like.

use alloc::boxed::Box;
use alloc::sync::Arc;

use hashbrown::HashMap;
use kproc_api::config::{ProcConfig, CONSOLE_PATH};
use kproc_api::platform::{AddressSpace, Platform};
use kproc_api::vfs::OpenFlags;
use kproc_api::{Error, Pid, Result, Tid, INIT_PID, KERNEL_PID};
use static_assertions::assert_impl_all;

use super::fd::{OpenFile, SystemFileTable, STDERR_FILENO, STDIN_FILENO, STDOUT_FILENO};
use super::proc::Proc;
use super::rendezvous::ExitRendezvous;
use super::table::ProcTable;
use crate::sched;
use crate::sync::SpinLock;

/// Name of the kernel-owner process
pub const KERNEL_PROC_NAME: &str = "[kernel]";

pub struct ProcManager {
    config: ProcConfig,
    table: ProcTable,
    kproc: Arc<Proc>,
    platform: Arc<dyn Platform>,
    threads: SpinLock<HashMap<Tid, Arc<Proc>>>,
    files: SystemFileTable,
}

assert_impl_all!(Proc: Send, Sync);
assert_impl_all!(ProcManager: Send, Sync);

impl ProcManager {
    /// Build the table and the kernel-owner process
    ///
    /// The kernel-owner process carries pid 0 and is never registered in the
    /// table, so it can be neither waited for nor destroyed.
    pub fn bootstrap(config: ProcConfig, platform: Arc<dyn Platform>) -> Result<Arc<Self>> {
        let table = ProcTable::with_capacity(config.max_procs)?;
        let kproc = Arc::new(Proc::new(
            KERNEL_PID,
            KERNEL_PROC_NAME,
            KERNEL_PID,
            config.open_max,
        )?);
        let files = SystemFileTable::with_capacity(config.system_open_max)?;
        log::info!(
            "proc: bootstrap, {} process slots, {} system files",
            config.max_procs,
            config.system_open_max
        );
        Ok(Arc::new(Self {
            config,
            table,
            kproc,
            platform,
            threads: SpinLock::new(HashMap::new()),
            files,
        }))
    }

    pub fn config(&self) -> &ProcConfig {
        &self.config
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn table(&self) -> &ProcTable {
        &self.table
    }

    pub fn system_files(&self) -> &SystemFileTable {
        &self.files
    }

    pub fn kernel_proc(&self) -> &Arc<Proc> {
        &self.kproc
    }

    pub fn is_kernel_proc(&self, proc: &Proc) -> bool {
        core::ptr::eq(proc, Arc::as_ptr(&self.kproc))
    }

    /// Live process registered under `pid`
    pub fn lookup(&self, pid: Pid) -> Result<Arc<Proc>> {
        self.table.lookup(pid)
    }

    pub fn getpid(&self, proc: &Proc) -> Pid {
        proc.pid()
    }

    /// Registered processes, including exited ones not yet reaped
    pub fn process_count(&self) -> usize {
        self.table.len()
    }

    // ========================================================================
    // Creation and destruction
    // ========================================================================

    /// Create and register an empty process
    pub fn create(&self, name: &str) -> Result<Arc<Proc>> {
        let proc = self.register(name)?;
        log::debug!("proc: created {} ({})", proc.pid(), name);
        Ok(proc)
    }

    /// Create a process ready to run a program
    ///
    /// The new process shares the caller's working directory and gets the
    /// console on descriptors 0, 1 and 2.
    pub fn create_runprogram(&self, name: &str) -> Result<Arc<Proc>> {
        let proc = self.register(name)?;
        proc.set_cwd(self.current_or_kernel().cwd());

        if let Err(err) = self.open_console(&proc) {
            log::warn!("proc: console setup for {} failed: {}", proc.pid(), err);
            self.discard(proc);
            return Err(err);
        }
        log::debug!("proc: created {} ({}) for exec", proc.pid(), name);
        Ok(proc)
    }

    pub(crate) fn register(&self, name: &str) -> Result<Arc<Proc>> {
        let pid = self.table.reserve()?;
        match self.build(pid, name) {
            Ok(proc) => Ok(proc),
            Err(err) => {
                self.table.cancel(pid);
                Err(err)
            }
        }
    }

    fn build(&self, pid: Pid, name: &str) -> Result<Arc<Proc>> {
        let proc = Arc::new(Proc::new(pid, name, INIT_PID, self.config.open_max)?);
        proc.install_rendezvous(ExitRendezvous::create(pid, name)?);
        self.table.install(proc.clone())?;
        Ok(proc)
    }

    fn open_console(&self, proc: &Proc) -> Result<()> {
        let standard = [
            (STDIN_FILENO, OpenFlags::RDONLY, "STDIN"),
            (STDOUT_FILENO, OpenFlags::WRONLY, "STDOUT"),
            (STDERR_FILENO, OpenFlags::WRONLY, "STDERR"),
        ];
        for (fd, flags, lock_name) in standard {
            let vnode = self.platform.vfs().open(CONSOLE_PATH, flags)?;
            let file = OpenFile::new(vnode, flags, lock_name)?;
            self.files.register(&file)?;
            proc.files().install(fd, file)?;
        }
        Ok(())
    }

    /// Destroy a half-built record on an error path
    pub(crate) fn discard(&self, proc: Arc<Proc>) {
        let pid = proc.pid();
        if let Err(err) = self.destroy(proc) {
            log::error!("proc: cleanup of {} failed: {}", pid, err);
        }
    }

    /// Release every resource of a process and free its record
    ///
    /// The record must have no threads and nobody waiting for it; claiming
    /// its rendezvous here shuts out later waiters. Children are handed to
    /// init.
    pub fn destroy(&self, proc: Arc<Proc>) -> Result<()> {
        self.check_destroyable(&proc)?;
        if let Some(rendezvous) = proc.rendezvous() {
            if rendezvous.claim().is_err() {
                log::error!("proc: destroying {} while it is waited for", proc.pid());
                return Err(Error::InvariantViolation(
                    "destroying a process someone is waiting for",
                ));
            }
        }
        self.teardown(proc)
    }

    /// Free a record whose rendezvous the caller has claimed
    ///
    /// The slot goes first; nothing is released unless it could be freed.
    pub(crate) fn teardown(&self, proc: Arc<Proc>) -> Result<()> {
        self.check_destroyable(&proc)?;
        let pid = proc.pid();
        self.table.deregister(&proc)?;

        drop(proc.set_cwd(None));

        let is_current = self
            .curproc()
            .is_some_and(|current| Arc::ptr_eq(&current, &proc));
        if let Some(space) = proc.set_address_space(None) {
            if is_current {
                self.platform.deactivate_address_space();
            }
            drop(space);
        }

        proc.files().clear();
        self.reparent_children(&proc);

        log::debug!("proc: destroyed {} ({})", pid, proc.name());
        Ok(())
    }

    fn check_destroyable(&self, proc: &Arc<Proc>) -> Result<()> {
        let pid = proc.pid();
        if self.is_kernel_proc(proc) {
            log::error!("proc: attempt to destroy the kernel process");
            return Err(Error::InvariantViolation("destroying the kernel process"));
        }
        if proc.thread_count() != 0 {
            log::error!("proc: destroying {} with {} threads", pid, proc.thread_count());
            return Err(Error::InvariantViolation("destroying a process with live threads"));
        }
        match self.table.lookup(pid) {
            Ok(registered) if Arc::ptr_eq(&registered, proc) => Ok(()),
            _ => Err(Error::NoSuchProcess(pid)),
        }
    }

    /// Hand every child of a dying process to init
    fn reparent_children(&self, proc: &Proc) {
        let children = core::mem::take(&mut proc.lock().children);
        for pid in children {
            let Ok(child) = self.table.lookup(pid) else {
                continue;
            };
            let exited = {
                let mut inner = child.lock();
                if inner.parent != proc.pid() {
                    continue;
                }
                inner.parent = INIT_PID;
                inner.exited
            };
            log::debug!("proc: {} reparented from {} to init", pid, proc.pid());
            if exited {
                continue;
            }
            if let Ok(init) = self.table.lookup(INIT_PID) {
                init.add_child(pid);
                // An exit racing with the reparent may have searched init's
                // list before the pid was added
                if child.has_exited() {
                    init.remove_child(pid);
                }
            }
        }
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Attach `tid` to `proc`
    pub fn add_thread(&self, proc: &Arc<Proc>, tid: Tid) -> Result<()> {
        let mut threads = self.threads.lock();
        if threads.contains_key(&tid) {
            return Err(Error::InvariantViolation("thread already belongs to a process"));
        }
        proc.lock().threads += 1;
        threads.insert(tid, proc.clone());
        Ok(())
    }

    /// Detach `tid` from its process, returning the process
    pub fn remove_thread(&self, tid: Tid) -> Result<Arc<Proc>> {
        let proc = self
            .threads
            .lock()
            .remove(&tid)
            .ok_or(Error::InvariantViolation("thread does not belong to a process"))?;
        {
            let mut inner = proc.lock();
            kassert!(inner.threads > 0, "proc {}: thread count underflow", proc.pid());
            inner.threads -= 1;
        }
        Ok(proc)
    }

    /// Attach the calling thread to `proc`
    pub fn attach_current(&self, proc: &Arc<Proc>) -> Result<()> {
        self.add_thread(proc, sched::current_tid())
    }

    pub fn detach_current(&self) -> Result<Arc<Proc>> {
        self.remove_thread(sched::current_tid())
    }

    /// Start a kernel thread that belongs to `proc`
    ///
    /// The thread is counted before this returns, so the process cannot be
    /// destroyed out from under it.
    pub fn spawn_thread<F>(self: &Arc<Self>, proc: &Arc<Proc>, name: &str, entry: F) -> Result<Tid>
    where
        F: FnOnce() + Send + 'static,
    {
        proc.lock().threads += 1;
        let manager = self.clone();
        let owner = proc.clone();
        let spawned = sched::spawn(
            name,
            Box::new(move || {
                manager.bind_thread(&owner, sched::current_tid());
                drop(owner);
                drop(manager);
                entry();
            }),
        );
        if spawned.is_err() {
            proc.lock().threads -= 1;
        }
        spawned
    }

    fn bind_thread(&self, proc: &Arc<Proc>, tid: Tid) {
        let previous = self.threads.lock().insert(tid, proc.clone());
        kassert!(previous.is_none(), "thread {}: bound to two processes", tid);
    }

    /// Process of the calling thread
    pub fn curproc(&self) -> Option<Arc<Proc>> {
        self.threads.lock().get(&sched::current_tid()).cloned()
    }

    /// Process of the calling thread, or the kernel-owner process
    pub fn current_or_kernel(&self) -> Arc<Proc> {
        self.curproc().unwrap_or_else(|| self.kproc.clone())
    }

    // ========================================================================
    // Address spaces
    // ========================================================================

    /// Address space of the current process
    pub fn getas(&self) -> Option<Arc<dyn AddressSpace>> {
        self.curproc().and_then(|proc| proc.address_space())
    }

    /// Swap the current process's address space, returning the old one
    pub fn setas(
        &self,
        space: Option<Arc<dyn AddressSpace>>,
    ) -> Result<Option<Arc<dyn AddressSpace>>> {
        let proc = self
            .curproc()
            .ok_or(Error::InvariantViolation("setas outside a process"))?;
        Ok(proc.set_address_space(space))
    }
}
