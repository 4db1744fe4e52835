//! Scheduler hook
//!
//! The kernel image installs its `ThreadOps` once during boot; the blocking
//! primitives and the fork path reach the scheduler only through here.

use kproc_api::sched::{ThreadEntry, ThreadOps};
use kproc_api::{Result, Tid};
use spin::Once;

static THREAD_OPS: Once<&'static dyn ThreadOps> = Once::new();

/// Install the scheduler interface; later calls are ignored
///
/// Returns `true` if this call performed the installation.
pub fn install(ops: &'static dyn ThreadOps) -> bool {
    let mut installed = false;
    THREAD_OPS.call_once(|| {
        installed = true;
        ops
    });
    if installed {
        log::info!("sched: thread operations installed");
    }
    installed
}

pub fn installed() -> bool {
    THREAD_OPS.is_completed()
}

fn ops() -> &'static dyn ThreadOps {
    match THREAD_OPS.get() {
        Some(ops) => *ops,
        None => panic!("sched: thread operations used before install"),
    }
}

/// Identifier of the running thread
pub fn current_tid() -> Tid {
    ops().current()
}

pub fn in_interrupt() -> bool {
    ops().in_interrupt()
}

pub(crate) fn park() {
    ops().park()
}

pub(crate) fn unpark(tid: Tid) {
    ops().unpark(tid)
}

/// Charge a spinlock to the calling thread
///
/// Returns `false` (nothing charged) before the hook is installed.
pub(crate) fn spinlock_acquired() -> bool {
    match THREAD_OPS.get() {
        Some(ops) => {
            ops.spinlock_acquired();
            true
        }
        None => false,
    }
}

pub(crate) fn spinlock_released() {
    if let Some(ops) = THREAD_OPS.get() {
        ops.spinlock_released();
    }
}

/// Spinlocks the calling thread holds
pub fn spinlocks_held() -> usize {
    ops().spinlocks_held()
}

/// Start a kernel thread
pub fn spawn(name: &str, entry: ThreadEntry) -> Result<Tid> {
    ops().spawn(name, entry)
}

/// Terminate the calling thread
pub fn exit_current() -> ! {
    ops().exit_current()
}
