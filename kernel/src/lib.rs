//! Process lifecycle and synchronization core
//!
//! Blocking primitives (semaphore, lock, condition variable) built on wait
//! channels, and the process layer on top of them: a bounded process table,
//! process records, parent/child bookkeeping, and the fork / exit / wait
//! protocol. Everything machine-dependent sits behind the `kproc-api`
//! interfaces; the `std` feature supplies a host implementation of them.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

/// Check a kernel invariant, logging the violated condition before halting
macro_rules! kassert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            log::error!("kassert failed: {}", stringify!($cond));
            panic!($($arg)+);
        }
    };
}

pub mod process;
pub mod sched;
pub mod sync;
pub mod syscalls;

#[cfg(feature = "std")]
pub mod host;

mod util;

pub use kproc_api as api;
pub use kproc_api::{Errno, Error, Pid, Result, Tid};
