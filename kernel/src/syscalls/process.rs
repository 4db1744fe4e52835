//! Process syscalls

use alloc::sync::Arc;
use core::convert::Infallible;

use kproc_api::platform::TrapFrame;
use kproc_api::{Errno, Error, Pid};

use super::SysResult;
use crate::process::exec::{copy_in_path, ArgBuf};
use crate::process::ProcManager;
use crate::sched;

impl ProcManager {
    pub fn sys_getpid(&self) -> Result<Pid, Errno> {
        Ok(self.current_or_kernel().pid())
    }

    pub fn sys_fork(self: &Arc<Self>, tf: &TrapFrame) -> Result<Pid, Errno> {
        let parent = self.curproc().ok_or(Errno::EINVAL)?;
        self.fork(&parent, tf).map_err(|err| err.errno())
    }

    /// Wait for child `pid`, returning its pid and exit status
    ///
    /// Options are not supported. User processes may only wait for their own
    /// children; the kernel-owner process may wait for anyone.
    pub fn sys_waitpid(&self, pid: i32, options: i32) -> Result<(Pid, i32), Errno> {
        if options != 0 || pid <= 0 {
            return Err(Errno::EINVAL);
        }
        let caller = self.current_or_kernel();
        let target = self.lookup(pid as Pid).map_err(|err| match err {
            Error::InvalidArgument(_) => Errno::ESRCH,
            other => other.errno(),
        })?;
        if !self.is_kernel_proc(&caller) && target.parent_pid() != caller.pid() {
            return Err(Errno::ECHILD);
        }
        let status = self.wait_proc(target).map_err(|err| err.errno())?;
        Ok((pid as Pid, i32::from(status)))
    }

    pub fn sys_exit(&self, status: i32) -> ! {
        match self.curproc() {
            Some(proc) => self.exit(&proc, status),
            None => {
                log::warn!("syscall: _exit from a thread without a process");
                sched::exit_current()
            }
        }
    }

    pub fn sys_execv<S: AsRef<str>>(&self, program: &str, args: &[S]) -> Result<Infallible, Errno> {
        self.execv(program, args).map_err(|err| err.errno())
    }
}

/// `waitpid` with the status pointer in user memory (0 means discard)
pub(crate) fn waitpid_from_user(
    manager: &ProcManager,
    pid: i32,
    ustatus: usize,
    options: i32,
) -> SysResult {
    let (pid, status) = manager.sys_waitpid(pid, options)?;
    if ustatus != 0 {
        let space = manager.getas().ok_or(Errno::EFAULT)?;
        space
            .copy_out(ustatus, &status.to_ne_bytes())
            .map_err(|err| err.errno())?;
    }
    Ok(pid as usize)
}

/// `execv` with the path and `argv` in user memory
pub(crate) fn execv_from_user(
    manager: &ProcManager,
    uprogram: usize,
    uargv: usize,
) -> Result<Infallible, Errno> {
    if uprogram == 0 {
        return Err(Errno::EFAULT);
    }
    let space = manager.getas().ok_or(Errno::EFAULT)?;
    let path = copy_in_path(&*space, uprogram).map_err(|err| err.errno())?;
    if path.is_empty() {
        return Err(Errno::ENOENT);
    }
    let argbuf = ArgBuf::copy_in(&*space, uargv, manager.config().arg_max)
        .map_err(|err| err.errno())?;
    drop(space);
    manager
        .exec_with(&path, argbuf)
        .map_err(|err| err.errno())
}
