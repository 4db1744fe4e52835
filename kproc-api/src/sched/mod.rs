//! Thread operations consumed by the process core
//!
//! The blocking primitives never touch a scheduler directly. They ask the
//! installed `ThreadOps` who is running, whether we are in interrupt context,
//! how many spinlocks the caller holds, and how to put the caller to sleep
//! or wake someone else.

use alloc::boxed::Box;

use crate::error::Result;
use crate::types::Tid;

/// Entry point of a freshly spawned kernel thread
pub type ThreadEntry = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler interface the core relies on
pub trait ThreadOps: Send + Sync {
    /// Identifier of the calling thread
    fn current(&self) -> Tid;

    /// Whether the caller is running in interrupt context
    fn in_interrupt(&self) -> bool;

    /// Block the calling thread until `unpark` targets it
    ///
    /// May return spuriously; callers re-check their wake condition.
    fn park(&self);

    /// Make `tid` runnable again
    ///
    /// An unpark that arrives before the matching park is not lost.
    fn unpark(&self, tid: Tid);

    /// The calling thread took a spinlock
    fn spinlock_acquired(&self);

    /// The calling thread released a spinlock
    fn spinlock_released(&self);

    /// Spinlocks the calling thread holds
    fn spinlocks_held(&self) -> usize;

    /// Start a new kernel thread running `entry`
    fn spawn(&self, name: &str, entry: ThreadEntry) -> Result<Tid>;

    /// Terminate the calling thread
    fn exit_current(&self) -> !;
}
