//! Synchronization primitives
//!
//! Everything here sleeps through a [`WaitChannel`]: a named queue of
//! blocked threads paired with a spinlock the caller already holds. The
//! three blocking primitives are independent of each other and sit directly
//! on top of that pair.
//!
//! - [`Semaphore`]: counting semaphore, `down` blocks while the count is 0
//! - [`Lock`]: sleeping mutual exclusion with an owner
//! - [`CondVar`]: Mesa-style condition variable used together with a `Lock`
//!
//! None of the blocking operations may be called from interrupt context or
//! while the caller holds a spinlock.

pub mod condvar;
pub mod lock;
pub mod semaphore;
pub mod spinlock;
pub mod wchan;


pub use condvar::CondVar;
pub use lock::{Lock, LockGuard};
pub use semaphore::Semaphore;
pub use spinlock::{SpinLock, SpinLockGuard};
pub use wchan::WaitChannel;
