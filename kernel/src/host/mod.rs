//! Host runtime
//!
//! Implements the scheduler and platform interfaces on top of `std`
//! threads so the core can run, block and fork inside an ordinary process.
//! Used by the test suites and for development on a workstation.

pub mod platform;
pub mod threads;

pub use platform::{HostAddressSpace, HostPlatform, HostVfs, HostVnode, UserEntry};
pub use threads::{enter_interrupt, install, HostThreads, InterruptGuard};
