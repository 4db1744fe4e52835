//! `ThreadOps` backed by `std::thread`

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, Thread};

use kproc_api::sched::{ThreadEntry, ThreadOps};
use kproc_api::{Error, Result, Tid};

use crate::sched;

thread_local! {
    static CURRENT: Cell<Option<Tid>> = const { Cell::new(None) };
    static IN_INTERRUPT: Cell<bool> = const { Cell::new(false) };
    static SPINLOCKS: Cell<usize> = const { Cell::new(0) };
    static REGISTRATION: RefCell<Option<Registration>> = const { RefCell::new(None) };
}

/// Lazy registration of a thread the host did not spawn; dropped with the
/// thread's locals
struct Registration(Tid);

impl Drop for Registration {
    fn drop(&mut self) {
        HOST_THREADS.threads.lock().remove(&self.0);
    }
}

/// Unwind payload used to terminate a spawned thread from deep inside it
struct ThreadExit;

/// Registry of host threads known to the scheduler hook
///
/// Threads get an id the first time they touch the scheduler, so test
/// threads created with `std::thread::spawn` take part in blocking too;
/// such a thread leaves the registry when it ends.
/// Termination through `exit_current` unwinds, which requires the test
/// profile's unwinding panic strategy.
pub struct HostThreads {
    next_tid: AtomicU64,
    // Raw mutex: the registry is scheduler state, not a kernel spinlock
    threads: spin::Mutex<BTreeMap<Tid, Thread>>,
}

static HOST_THREADS: HostThreads = HostThreads::new();

/// Install the host scheduler hook (idempotent) and return it
pub fn install() -> &'static HostThreads {
    sched::install(&HOST_THREADS);
    &HOST_THREADS
}

impl HostThreads {
    const fn new() -> Self {
        Self {
            next_tid: AtomicU64::new(1),
            threads: spin::Mutex::new(BTreeMap::new()),
        }
    }

    fn register(&self, tid: Tid) {
        self.threads.lock().insert(tid, thread::current());
        CURRENT.with(|current| current.set(Some(tid)));
    }

    fn deregister(&self, tid: Tid) {
        self.threads.lock().remove(&tid);
        CURRENT.with(|current| current.set(None));
    }

    /// Threads currently registered
    pub fn registered(&self) -> usize {
        self.threads.lock().len()
    }

    pub fn is_registered(&self, tid: Tid) -> bool {
        self.threads.lock().contains_key(&tid)
    }
}

impl ThreadOps for HostThreads {
    fn current(&self) -> Tid {
        if let Some(tid) = CURRENT.with(|current| current.get()) {
            return tid;
        }
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        self.register(tid);
        REGISTRATION.with(|slot| *slot.borrow_mut() = Some(Registration(tid)));
        tid
    }

    fn in_interrupt(&self) -> bool {
        IN_INTERRUPT.with(|flag| flag.get())
    }

    fn spinlock_acquired(&self) {
        SPINLOCKS.with(|held| held.set(held.get() + 1));
    }

    fn spinlock_released(&self) {
        SPINLOCKS.with(|held| held.set(held.get().saturating_sub(1)));
    }

    fn spinlocks_held(&self) -> usize {
        SPINLOCKS.with(|held| held.get())
    }

    fn park(&self) {
        thread::park();
    }

    fn unpark(&self, tid: Tid) {
        if let Some(thread) = self.threads.lock().get(&tid) {
            thread.unpark();
        }
    }

    fn spawn(&self, name: &str, entry: ThreadEntry) -> Result<Tid> {
        let tid = self.next_tid.fetch_add(1, Ordering::Relaxed);
        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                HOST_THREADS.register(tid);
                let outcome = panic::catch_unwind(AssertUnwindSafe(entry));
                HOST_THREADS.deregister(tid);
                if let Err(payload) = outcome {
                    if !payload.is::<ThreadExit>() {
                        panic::resume_unwind(payload);
                    }
                }
            })
            .map_err(|_| Error::OutOfMemory)?;
        log::debug!("host: spawned thread {} ({})", tid, name);
        Ok(tid)
    }

    fn exit_current(&self) -> ! {
        panic::resume_unwind(Box::new(ThreadExit))
    }
}

/// Marks the calling thread as running in interrupt context until dropped
pub struct InterruptGuard {
    previous: bool,
}

pub fn enter_interrupt() -> InterruptGuard {
    let previous = IN_INTERRUPT.with(|flag| flag.replace(true));
    InterruptGuard { previous }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        let previous = self.previous;
        IN_INTERRUPT.with(|flag| flag.set(previous));
    }
}
