//! System call layer
//!
//! Decodes process-lifecycle calls from a trap frame, runs them against the
//! process manager and writes the result back: the value in `v0` with `a3`
//! clear on success, the error code in `v0` with `a3` set on failure.

pub mod process;

use alloc::sync::Arc;
use core::convert::Infallible;

use kproc_api::platform::TrapFrame;
use kproc_api::Errno;

use crate::process::ProcManager;

pub const SYS_FORK: usize = 0;
pub const SYS_EXECV: usize = 2;
pub const SYS_EXIT: usize = 3;
pub const SYS_WAITPID: usize = 4;
pub const SYS_GETPID: usize = 5;

/// Syscall result: a register value or an error code
pub type SysResult = core::result::Result<usize, Errno>;

/// Run the syscall described by `tf` and store its result in `tf`
pub fn dispatch(manager: &Arc<ProcManager>, tf: &mut TrapFrame) {
    let callno = tf.syscall_number();
    let result: SysResult = match callno {
        SYS_FORK => manager.sys_fork(tf).map(|pid| pid as usize),
        SYS_GETPID => manager.sys_getpid().map(|pid| pid as usize),
        SYS_WAITPID => {
            process::waitpid_from_user(manager, tf.arg(0) as i32, tf.arg(1), tf.arg(2) as i32)
        }
        SYS_EXIT => manager.sys_exit(tf.arg(0) as i32),
        SYS_EXECV => process::execv_from_user(manager, tf.arg(0), tf.arg(1))
            .map(|never: Infallible| -> usize { match never {} }),
        _ => {
            log::warn!("syscall: unknown call number {}", callno);
            Err(Errno::ENOSYS)
        }
    };

    match result {
        Ok(value) => tf.set_return(value),
        Err(errno) => tf.set_error(errno.code()),
    }
    tf.advance_pc();
}
