//! Descriptor tables
//!
//! Each process maps small integers to shared open-file entries. Entries are
//! also tracked by the system-wide table, which bounds how many can exist at
//! once; an entry leaves that table when its last handle is dropped.

use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

use kproc_api::vfs::{OpenFlags, Vnode};
use kproc_api::{Error, Result};

use crate::sync::{Lock, SpinLock};

/// Standard input descriptor
pub const STDIN_FILENO: usize = 0;
/// Standard output descriptor
pub const STDOUT_FILENO: usize = 1;
/// Standard error descriptor
pub const STDERR_FILENO: usize = 2;

/// An open file: vnode, access mode, position and its own lock
pub struct OpenFile {
    vnode: Arc<dyn Vnode>,
    flags: OpenFlags,
    offset: SpinLock<u64>,
    refs: AtomicUsize,
    lock: Lock,
}

impl OpenFile {
    pub fn new(vnode: Arc<dyn Vnode>, flags: OpenFlags, lock_name: &str) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            vnode,
            flags,
            offset: SpinLock::new(0),
            refs: AtomicUsize::new(1),
            lock: Lock::new(lock_name)?,
        }))
    }

    pub fn vnode(&self) -> &Arc<dyn Vnode> {
        &self.vnode
    }

    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    pub fn offset(&self) -> u64 {
        *self.offset.lock()
    }

    pub fn set_offset(&self, offset: u64) {
        *self.offset.lock() = offset;
    }

    /// Descriptor-level reference count, maintained by the file syscalls
    pub fn refs(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub fn incref(&self) -> usize {
        self.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn decref(&self) -> usize {
        let previous = self.refs.fetch_sub(1, Ordering::AcqRel);
        kassert!(previous > 0, "open file {}: refcount underflow", self.vnode.name());
        previous - 1
    }

    /// Serializes I/O that moves the offset
    pub fn lock(&self) -> &Lock {
        &self.lock
    }
}

/// Per-process descriptor table
pub struct FileTable {
    slots: Vec<Option<Arc<OpenFile>>>,
}

impl FileTable {
    pub fn new(open_max: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(open_max)
            .map_err(|_| Error::OutOfMemory)?;
        slots.resize_with(open_max, || None);
        Ok(Self { slots })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, fd: usize) -> Result<Arc<OpenFile>> {
        self.slots
            .get(fd)
            .and_then(|slot| slot.clone())
            .ok_or(Error::BadFileDescriptor)
    }

    /// Point `fd` at `file`, returning whatever it pointed at before
    pub fn install(&mut self, fd: usize, file: Arc<OpenFile>) -> Result<Option<Arc<OpenFile>>> {
        let slot = self.slots.get_mut(fd).ok_or(Error::BadFileDescriptor)?;
        Ok(slot.replace(file))
    }

    pub fn take(&mut self, fd: usize) -> Option<Arc<OpenFile>> {
        self.slots.get_mut(fd).and_then(Option::take)
    }

    /// Lowest unused descriptor
    pub fn first_free(&self) -> Option<usize> {
        self.slots.iter().position(Option::is_none)
    }

    /// Make every descriptor refer to the same entry as in `other`
    ///
    /// Handles are shared, not duplicated; the entries' descriptor
    /// reference counts are left alone.
    pub fn copy_from(&mut self, other: &FileTable) {
        for (mine, theirs) in self.slots.iter_mut().zip(other.slots.iter()) {
            *mine = theirs.clone();
        }
    }

    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Drop every handle, returning how many were open
    pub fn clear(&mut self) -> usize {
        let open = self.open_count();
        self.slots.iter_mut().for_each(|slot| *slot = None);
        open
    }
}

/// System-wide open-file table
pub struct SystemFileTable {
    slots: SpinLock<Vec<Weak<OpenFile>>>,
}

impl SystemFileTable {
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| Error::OutOfMemory)?;
        slots.resize_with(capacity, Weak::new);
        Ok(Self {
            slots: SpinLock::new(slots),
        })
    }

    /// Track `file` in the first free slot, returning the slot index
    pub fn register(&self, file: &Arc<OpenFile>) -> Result<usize> {
        let mut slots = self.slots.lock();
        let index = slots
            .iter()
            .position(|slot| slot.strong_count() == 0)
            .ok_or(Error::TooManyOpenFiles)?;
        slots[index] = Arc::downgrade(file);
        Ok(index)
    }

    /// Entries with at least one live handle
    pub fn live(&self) -> usize {
        self.slots
            .lock()
            .iter()
            .filter(|slot| slot.strong_count() > 0)
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }
}
