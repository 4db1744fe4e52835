//! Exit and wait

use alloc::sync::Arc;

use kproc_api::{Error, Pid, Result};

use super::manager::ProcManager;
use super::proc::Proc;
use crate::sched;

impl ProcManager {
    /// Terminate the calling thread's process with `status`
    ///
    /// Only the low 8 bits of `status` are kept. The record stays in the
    /// table until a waiter collects the status. Exiting a process the
    /// caller does not belong to halts the kernel.
    pub fn exit(&self, proc: &Arc<Proc>, status: i32) -> ! {
        let recorded = self.record_exit(proc, status);
        kassert!(
            recorded.is_ok(),
            "proc: exit of {} failed: {:?}",
            proc.pid(),
            recorded
        );
        sched::exit_current()
    }

    fn record_exit(&self, proc: &Arc<Proc>, status: i32) -> Result<()> {
        if self.is_kernel_proc(proc) {
            return Err(Error::InvariantViolation("the kernel process cannot exit"));
        }
        let current = self.curproc();
        if !current.is_some_and(|current| Arc::ptr_eq(&current, proc)) {
            return Err(Error::InvariantViolation("exit called from outside the process"));
        }
        let rendezvous = proc
            .rendezvous()
            .ok_or(Error::InvariantViolation("exiting process is not registered"))?;

        let code = (status & 0xff) as u8;
        {
            let mut inner = proc.lock();
            if inner.exited {
                return Err(Error::InvariantViolation("process exited twice"));
            }
            inner.exited = true;
        }
        self.detach_current()?;
        self.detach_from_parent(proc);

        log::debug!("proc: {} exited with status {}", proc.pid(), code);
        rendezvous.post(code);
        Ok(())
    }

    /// Remove `proc` from its parent's child list
    ///
    /// The parent can change under us when it dies and hands us to init;
    /// retry until the parent we removed ourselves from is still the parent.
    fn detach_from_parent(&self, proc: &Proc) {
        loop {
            let parent_pid = proc.parent_pid();
            if parent_pid != proc.pid() {
                if let Ok(parent) = self.lookup(parent_pid) {
                    parent.remove_child(proc.pid());
                }
            }
            if proc.parent_pid() == parent_pid {
                break;
            }
        }
    }

    /// Wait for the process registered under `pid` and reap it
    pub fn wait(&self, pid: Pid) -> Result<u8> {
        let target = self.lookup(pid)?;
        self.wait_proc(target)
    }

    /// Block until `target` exits, then destroy it and return its status
    ///
    /// Only one waiter per process is admitted; later ones get
    /// `AlreadyReaped`.
    pub fn wait_proc(&self, target: Arc<Proc>) -> Result<u8> {
        let pid = target.pid();
        if self.is_kernel_proc(&target) {
            return Err(Error::InvariantViolation("waiting for the kernel process"));
        }
        if self
            .curproc()
            .is_some_and(|current| Arc::ptr_eq(&current, &target))
        {
            return Err(Error::InvariantViolation("process waiting for itself"));
        }
        let rendezvous = target.rendezvous().ok_or(Error::NoSuchProcess(pid))?;
        rendezvous.claim()?;

        let status = rendezvous.wait()?;
        drop(rendezvous);
        self.teardown(target)?;

        log::debug!("proc: reaped {} with status {}", pid, status);
        Ok(status)
    }
}
