//! Identifier types shared across the process core

/// Process identifier
///
/// Identifiers are small positive integers. `0` is reserved for the
/// kernel-owner process and is never handed out by the process table.
pub type Pid = u32;

/// Thread identifier, as assigned by the thread subsystem
pub type Tid = u64;

/// Pid carried by the kernel-owner process (never registered)
pub const KERNEL_PID: Pid = 0;

/// Well-known pid of the init process; orphans are reparented to it
pub const INIT_PID: Pid = 1;
