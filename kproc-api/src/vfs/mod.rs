//! Virtual file system interfaces consumed by the process core

use alloc::sync::Arc;

use bitflags::bitflags;

use crate::error::Result;

bitflags! {
    /// Flags accepted by `Vfs::open`
    ///
    /// Read-only is the absence of both access bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: u32 {
        const WRONLY = 0b00_0001;
        const RDWR   = 0b00_0010;
        const CREAT  = 0b00_0100;
        const EXCL   = 0b00_1000;
        const TRUNC  = 0b01_0000;
        const APPEND = 0b10_0000;
    }
}

impl OpenFlags {
    /// Read-only access
    pub const RDONLY: Self = Self::empty();

    pub fn readable(&self) -> bool {
        !self.contains(Self::WRONLY)
    }

    pub fn writable(&self) -> bool {
        self.intersects(Self::WRONLY | Self::RDWR)
    }
}

/// A file system object
///
/// Shared ownership through `Arc` is the reference count: cloning is
/// incref, dropping is decref.
pub trait Vnode: Send + Sync {
    /// Name the vnode was opened under, for diagnostics
    fn name(&self) -> &str;

    /// Whether the vnode is a directory
    fn is_dir(&self) -> bool {
        false
    }
}

/// Path lookup
pub trait Vfs: Send + Sync {
    /// Resolve `path` and open it with `flags`
    fn open(&self, path: &str, flags: OpenFlags) -> Result<Arc<dyn Vnode>>;
}
