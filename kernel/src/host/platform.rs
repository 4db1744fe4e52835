//! `Platform`, `AddressSpace` and `Vfs` backed by ordinary heap memory

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use kproc_api::config::CONSOLE_PATH;
use kproc_api::platform::{AddressSpace, Platform, TrapFrame};
use kproc_api::vfs::{OpenFlags, Vfs, Vnode};
use kproc_api::{Error, Result};
use spin::Once;

use crate::sched;
use crate::sync::SpinLock;

/// Top of the user stack in every host address space
pub const USERSTACK: usize = 0x8000_0000;
/// Bytes of user memory backing a host address space
pub const USER_REGION: usize = 64 * 1024;
/// Lowest mapped user address
pub const USER_BASE: usize = USERSTACK - USER_REGION;

/// A file known to the host vfs
pub struct HostVnode {
    name: String,
    entry: Option<usize>,
    dir: bool,
}

impl HostVnode {
    pub fn file(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entry: None,
            dir: false,
        })
    }

    /// A loadable program starting at `entry`
    pub fn program(name: &str, entry: usize) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entry: Some(entry),
            dir: false,
        })
    }

    pub fn dir(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            entry: None,
            dir: true,
        })
    }
}

impl Vnode for HostVnode {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_dir(&self) -> bool {
        self.dir
    }
}

/// Flat path -> vnode map with the console pre-registered
pub struct HostVfs {
    nodes: SpinLock<BTreeMap<String, Arc<HostVnode>>>,
    opens: AtomicUsize,
}

impl HostVfs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(CONSOLE_PATH.to_string(), HostVnode::file(CONSOLE_PATH));
        Self {
            nodes: SpinLock::new(nodes),
            opens: AtomicUsize::new(0),
        }
    }

    pub fn add(&self, path: &str, vnode: Arc<HostVnode>) {
        self.nodes.lock().insert(path.to_string(), vnode);
    }

    pub fn remove(&self, path: &str) {
        self.nodes.lock().remove(path);
    }

    /// Shared handle to a registered vnode
    pub fn node(&self, path: &str) -> Option<Arc<HostVnode>> {
        self.nodes.lock().get(path).cloned()
    }

    /// Successful opens so far
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::Relaxed)
    }

    fn program_entry(&self, name: &str) -> Option<usize> {
        self.nodes.lock().get(name).and_then(|node| node.entry)
    }
}

impl Default for HostVfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Vfs for HostVfs {
    fn open(&self, path: &str, _flags: OpenFlags) -> Result<Arc<dyn Vnode>> {
        let node = self.node(path).ok_or(Error::NotFound)?;
        self.opens.fetch_add(1, Ordering::Relaxed);
        Ok(node)
    }
}

/// User memory for one process: a single region ending at `USERSTACK`
pub struct HostAddressSpace {
    memory: SpinLock<Vec<u8>>,
    activations: Arc<AtomicUsize>,
}

impl HostAddressSpace {
    pub fn new() -> Self {
        Self::with_counter(Arc::new(AtomicUsize::new(0)))
    }

    fn with_counter(activations: Arc<AtomicUsize>) -> Self {
        Self {
            memory: SpinLock::new(vec![0; USER_REGION]),
            activations,
        }
    }

    /// Times this space (or a copy of it) was activated
    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::Relaxed)
    }

    fn range(uaddr: usize, len: usize) -> Result<core::ops::Range<usize>> {
        let start = uaddr.checked_sub(USER_BASE).ok_or(Error::BadAddress)?;
        let end = start.checked_add(len).ok_or(Error::BadAddress)?;
        if end > USER_REGION {
            return Err(Error::BadAddress);
        }
        Ok(start..end)
    }
}

impl Default for HostAddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace for HostAddressSpace {
    fn try_copy(&self) -> Result<Box<dyn AddressSpace>> {
        let copy = Self::with_counter(self.activations.clone());
        copy.memory.lock().copy_from_slice(&self.memory.lock());
        Ok(Box::new(copy))
    }

    fn activate(&self) {
        self.activations.fetch_add(1, Ordering::Relaxed);
    }

    fn define_stack(&mut self) -> Result<usize> {
        Ok(USERSTACK)
    }

    fn copy_in(&self, uaddr: usize, buf: &mut [u8]) -> Result<()> {
        let range = Self::range(uaddr, buf.len())?;
        buf.copy_from_slice(&self.memory.lock()[range]);
        Ok(())
    }

    fn copy_out(&self, uaddr: usize, data: &[u8]) -> Result<()> {
        let range = Self::range(uaddr, data.len())?;
        self.memory.lock()[range].copy_from_slice(data);
        Ok(())
    }
}

/// How a thread entered user mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserEntry {
    /// Child side of fork, with the prepared trap frame
    Forked(TrapFrame),
    /// Fresh program image after exec
    Exec {
        argc: usize,
        argv: usize,
        stack: usize,
        entry: usize,
    },
}

/// Stand-in for user mode: runs on the thread that entered it
pub type UserProgram = Arc<dyn Fn(UserEntry) + Send + Sync>;

/// Platform whose "user mode" is a Rust closure
pub struct HostPlatform {
    vfs: HostVfs,
    user_program: Once<UserProgram>,
    fail_as_create: AtomicBool,
    deactivations: AtomicUsize,
    spaces_created: AtomicUsize,
}

impl HostPlatform {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            vfs: HostVfs::new(),
            user_program: Once::new(),
            fail_as_create: AtomicBool::new(false),
            deactivations: AtomicUsize::new(0),
            spaces_created: AtomicUsize::new(0),
        })
    }

    pub fn host_vfs(&self) -> &HostVfs {
        &self.vfs
    }

    /// Set the closure every user-mode entry runs (first call wins)
    pub fn set_user_program(&self, program: UserProgram) {
        self.user_program.call_once(|| program);
    }

    /// Make subsequent address space creation fail with `OutOfMemory`
    pub fn fail_address_space_creation(&self, fail: bool) {
        self.fail_as_create.store(fail, Ordering::SeqCst);
    }

    pub fn deactivations(&self) -> usize {
        self.deactivations.load(Ordering::SeqCst)
    }

    pub fn spaces_created(&self) -> usize {
        self.spaces_created.load(Ordering::SeqCst)
    }

    /// Run the user program, which must leave through `exit`
    ///
    /// With no program installed the thread just ends, as if user mode ran
    /// forever without trapping back.
    fn run_user(&self, entry: UserEntry) -> ! {
        let Some(program) = self.user_program.get() else {
            sched::exit_current()
        };
        program(entry);
        log::error!("host: user program returned from {:?}", entry);
        panic!("host: user program returned without exiting")
    }
}

impl Platform for HostPlatform {
    fn vfs(&self) -> &dyn Vfs {
        &self.vfs
    }

    fn create_address_space(&self) -> Result<Box<dyn AddressSpace>> {
        if self.fail_as_create.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }
        self.spaces_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(HostAddressSpace::new()))
    }

    fn deactivate_address_space(&self) {
        self.deactivations.fetch_add(1, Ordering::SeqCst);
    }

    fn load_elf(&self, image: &Arc<dyn Vnode>, _space: &mut dyn AddressSpace) -> Result<usize> {
        self.vfs
            .program_entry(image.name())
            .ok_or(Error::NotExecutable)
    }

    fn enter_forked_process(&self, tf: TrapFrame) -> ! {
        self.run_user(UserEntry::Forked(tf))
    }

    fn enter_new_process(&self, argc: usize, argv: usize, stack: usize, entry: usize) -> ! {
        self.run_user(UserEntry::Exec {
            argc,
            argv,
            stack,
            entry,
        })
    }
}
