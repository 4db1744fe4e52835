//! Common test utilities for kernel integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use kproc_kernel::api::config::ProcConfig;
use kproc_kernel::api::platform::Platform;
use kproc_kernel::host::{self, HostAddressSpace, HostPlatform, UserEntry};
use kproc_kernel::process::{Proc, ProcManager};

/// A manager on the host runtime plus the platform behind it
pub struct Fixture {
    pub manager: Arc<ProcManager>,
    pub platform: Arc<HostPlatform>,
}

impl Fixture {
    pub fn new(max_procs: usize) -> Self {
        Self::with_config(ProcConfig::default().with_max_procs(max_procs))
    }

    pub fn with_config(config: ProcConfig) -> Self {
        host::install();
        let platform = HostPlatform::new();
        let manager = ProcManager::bootstrap(config, platform.clone() as Arc<dyn Platform>)
            .expect("bootstrap");
        Self { manager, platform }
    }

    /// Install the closure every user-mode entry runs
    pub fn on_user_entry<F>(&self, program: F)
    where
        F: Fn(&Arc<ProcManager>, UserEntry) + Send + Sync + 'static,
    {
        let manager = self.manager.clone();
        self.platform
            .set_user_program(Arc::new(move |entry| program(&manager, entry)));
    }

    /// A registered process with a fresh address space
    pub fn user_process(&self, name: &str) -> Arc<Proc> {
        let proc = self.manager.create(name).expect("create");
        proc.set_address_space(Some(Arc::new(HostAddressSpace::new())));
        proc
    }
}

/// Exit the calling thread's process
pub fn exit_current(manager: &ProcManager, status: i32) -> ! {
    let proc = manager.curproc().expect("thread belongs to a process");
    manager.exit(&proc, status)
}

/// Spin (yielding) until `cond` holds
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::yield_now();
    }
}
