//! Configuration for the process core
//!
//! Compile-time limits mirror the values a kernel image is built with. A
//! `ProcConfig` carries the runtime view of the same limits so test builds
//! can shrink the tables.

use static_assertions::const_assert;

use crate::types::{Pid, INIT_PID};

/// Maximum number of simultaneously registered processes
pub const NPROC: usize = 100;

/// Descriptor slots per process
pub const OPEN_MAX: usize = 128;

/// Entries in the system-wide open-file table
pub const SYSTEM_OPEN_MAX: usize = 10 * OPEN_MAX;

/// Upper bound on the packed size of an argument vector
pub const ARG_MAX: usize = 64 * 1024;

/// Longest accepted path, including the terminating NUL
pub const PATH_MAX: usize = 1024;

/// Path of the console device
pub const CONSOLE_PATH: &str = "con:";

const_assert!(NPROC >= 2);
const_assert!(INIT_PID as usize <= NPROC);
const_assert!(OPEN_MAX >= 3);
const_assert!(SYSTEM_OPEN_MAX >= OPEN_MAX);

/// Runtime limits for a process manager instance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcConfig {
    /// Process table capacity (valid pids are `1..=max_procs`)
    pub max_procs: usize,
    /// Descriptor slots per process
    pub open_max: usize,
    /// System-wide open-file entries
    pub system_open_max: usize,
    /// Argument vector ceiling for program replacement
    pub arg_max: usize,
}

impl ProcConfig {
    /// Limits a kernel image is built with
    pub const fn kernel_default() -> Self {
        Self {
            max_procs: NPROC,
            open_max: OPEN_MAX,
            system_open_max: SYSTEM_OPEN_MAX,
            arg_max: ARG_MAX,
        }
    }

    /// Same limits with a different process table capacity
    pub const fn with_max_procs(mut self, max_procs: usize) -> Self {
        self.max_procs = max_procs;
        self
    }

    /// Highest pid a table built from this configuration can hand out
    pub fn max_pid(&self) -> Pid {
        self.max_procs as Pid
    }
}

impl Default for ProcConfig {
    fn default() -> Self {
        Self::kernel_default()
    }
}
