//! kproc API - core types and collaborator interfaces for the process core
//!
//! This crate holds everything the process lifecycle and synchronization core
//! shares with the rest of a kernel image:
//!
//! - **Types**: process and thread identifiers
//! - **Error**: the error taxonomy and the user-visible error codes
//! - **Config**: compile-time limits and the runtime `ProcConfig`
//! - **Sched**: the thread operations the blocking primitives rely on
//! - **Platform**: address spaces, trap frames and user-mode entry
//! - **Vfs**: vnodes, open flags and path lookup
//!
//! The core depends only on these abstractions, so the same code runs on a
//! bare-metal scheduler or on the host runtime used by the test suites.

#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

pub mod config;
pub mod error;
pub mod platform;
pub mod sched;
pub mod types;
pub mod vfs;

pub use error::{Errno, Error, Result};
pub use types::{Pid, Tid, INIT_PID, KERNEL_PID};
