//! Machine-dependent collaborators: address spaces, trap frames, user entry

use alloc::boxed::Box;
use alloc::sync::Arc;

use crate::error::Result;
use crate::vfs::{Vfs, Vnode};

/// Number of general purpose registers saved in a trap frame
pub const NUM_GPRS: usize = 32;

/// Register carrying the syscall number on entry and the return value on exit
pub const REG_V0: usize = 2;
/// Second return register
pub const REG_V1: usize = 3;
/// First argument register
pub const REG_A0: usize = 4;
/// Second argument register
pub const REG_A1: usize = 5;
/// Third argument register
pub const REG_A2: usize = 6;
/// Fourth argument register; holds the error flag on syscall return
pub const REG_A3: usize = 7;
/// Stack pointer
pub const REG_SP: usize = 29;

/// Size of the syscall instruction the program counter steps over
pub const SYSCALL_INSN_LEN: usize = 4;

/// Register state saved on entry to the kernel
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapFrame {
    pub gpr: [usize; NUM_GPRS],
    pub pc: usize,
    pub status: usize,
    pub cause: usize,
    pub vaddr: usize,
}

impl TrapFrame {
    pub const fn zeroed() -> Self {
        Self {
            gpr: [0; NUM_GPRS],
            pc: 0,
            status: 0,
            cause: 0,
            vaddr: 0,
        }
    }

    /// Syscall number the trap was raised with
    pub fn syscall_number(&self) -> usize {
        self.gpr[REG_V0]
    }

    /// Syscall argument `n` (0-based, register arguments only)
    pub fn arg(&self, n: usize) -> usize {
        self.gpr[REG_A0 + n]
    }

    /// Record a successful return value
    pub fn set_return(&mut self, value: usize) {
        self.gpr[REG_V0] = value;
        self.gpr[REG_A3] = 0;
    }

    /// Record a failed syscall with `code` in the return register
    pub fn set_error(&mut self, code: i32) {
        self.gpr[REG_V0] = code as usize;
        self.gpr[REG_A3] = 1;
    }

    /// Step past the syscall instruction so it is not restarted
    pub fn advance_pc(&mut self) {
        self.pc = self.pc.wrapping_add(SYSCALL_INSN_LEN);
    }

    /// Shape a copy of the parent's frame for the child side of fork:
    /// fork returns 0 without error and resumes after the syscall
    pub fn prepare_fork_child(&mut self) {
        self.set_return(0);
        self.advance_pc();
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// A user address space
///
/// Dropping the last handle destroys the space.
pub trait AddressSpace: Send + Sync {
    /// Duplicate the whole space
    fn try_copy(&self) -> Result<Box<dyn AddressSpace>>;

    /// Make this space the one the MMU translates through
    fn activate(&self);

    /// Set up the user stack and return the initial stack pointer
    fn define_stack(&mut self) -> Result<usize>;

    /// Read `buf.len()` bytes of user memory starting at `uaddr`
    fn copy_in(&self, uaddr: usize, buf: &mut [u8]) -> Result<()>;

    /// Write `data` into user memory starting at `uaddr`
    fn copy_out(&self, uaddr: usize, data: &[u8]) -> Result<()>;
}

/// Machine services the process core drives
pub trait Platform: Send + Sync {
    /// Path lookup used for console descriptors and program images
    fn vfs(&self) -> &dyn Vfs;

    /// Allocate an empty address space
    fn create_address_space(&self) -> Result<Box<dyn AddressSpace>>;

    /// Flush translations so nothing refers to the outgoing space
    fn deactivate_address_space(&self);

    /// Load a program image into `space`, returning its entry point
    fn load_elf(&self, image: &Arc<dyn Vnode>, space: &mut dyn AddressSpace) -> Result<usize>;

    /// Return to user mode in a freshly forked thread
    fn enter_forked_process(&self, tf: TrapFrame) -> !;

    /// Start a new program in user mode
    fn enter_new_process(&self, argc: usize, argv: usize, stack: usize, entry: usize) -> !;
}
