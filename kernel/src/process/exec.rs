//! Program replacement
//!
//! Arguments travel from the old image to the new one through an
//! `ArgBuf`: NUL-terminated strings packed back to back in kernel memory.
//! On the way out they are laid down below the new stack top, followed
//! (downwards) by the NULL-terminated `argv` pointer array.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::convert::Infallible;
use core::mem::size_of;

use kproc_api::config::PATH_MAX;
use kproc_api::platform::AddressSpace;
use kproc_api::vfs::OpenFlags;
use kproc_api::{Error, Result};

use super::manager::ProcManager;
use super::proc::Proc;

const PTR_SIZE: usize = size_of::<usize>();

/// Packed argument vector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgBuf {
    data: Vec<u8>,
    nargs: usize,
}

impl ArgBuf {
    /// Pack kernel strings, refusing vectors larger than `arg_max`
    pub fn from_args<S: AsRef<str>>(args: &[S], arg_max: usize) -> Result<Self> {
        let len: usize = args.iter().map(|arg| arg.as_ref().len() + 1).sum();
        if len > arg_max {
            return Err(Error::ArgListTooLong);
        }
        let mut data = Vec::new();
        data.try_reserve_exact(len)
            .map_err(|_| Error::OutOfMemory)?;
        for arg in args {
            let bytes = arg.as_ref().as_bytes();
            if bytes.contains(&0) {
                return Err(Error::InvalidArgument("argument contains NUL"));
            }
            data.extend_from_slice(bytes);
            data.push(0);
        }
        Ok(Self {
            data,
            nargs: args.len(),
        })
    }

    /// Read a NULL-terminated `argv` array out of user memory
    pub fn copy_in(space: &dyn AddressSpace, uargv: usize, arg_max: usize) -> Result<Self> {
        let mut data = Vec::new();
        let mut nargs = 0;
        loop {
            let slot = uargv
                .checked_add(nargs * PTR_SIZE)
                .ok_or(Error::BadAddress)?;
            let uarg = read_user_ptr(space, slot)?;
            if uarg == 0 {
                break;
            }
            let room = arg_max - data.len();
            copy_in_str(space, uarg, room, Error::ArgListTooLong, &mut data)?;
            nargs += 1;
        }
        Ok(Self { data, nargs })
    }

    pub fn nargs(&self) -> usize {
        self.nargs
    }

    /// Packed size, terminators included
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nargs == 0
    }

    /// Argument `index`, without its terminator
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.data
            .split_inclusive(|&byte| byte == 0)
            .nth(index)
            .and_then(|arg| core::str::from_utf8(&arg[..arg.len() - 1]).ok())
    }

    /// Lay the arguments out below `stack_top` in `space`
    ///
    /// Returns the new stack pointer and the user address of `argv`; the
    /// pointer array sits exactly at the new stack pointer.
    pub fn copy_out(&self, space: &dyn AddressSpace, stack_top: usize) -> Result<(usize, usize)> {
        let mut sp = stack_top
            .checked_sub(self.data.len())
            .ok_or(Error::BadAddress)?;
        sp &= !(PTR_SIZE - 1);
        let strings = sp;
        sp = sp
            .checked_sub((self.nargs + 1) * PTR_SIZE)
            .ok_or(Error::BadAddress)?;
        let argv = sp;

        space.copy_out(strings, &self.data)?;
        let mut offset = 0;
        for (i, arg) in self.data.split_inclusive(|&byte| byte == 0).enumerate() {
            space.copy_out(argv + i * PTR_SIZE, &(strings + offset).to_ne_bytes())?;
            offset += arg.len();
        }
        space.copy_out(argv + self.nargs * PTR_SIZE, &0usize.to_ne_bytes())?;
        Ok((sp, argv))
    }
}

fn read_user_ptr(space: &dyn AddressSpace, uaddr: usize) -> Result<usize> {
    let mut raw = [0u8; PTR_SIZE];
    space.copy_in(uaddr, &mut raw)?;
    Ok(usize::from_ne_bytes(raw))
}

/// Append the NUL-terminated string at `uaddr` to `out`
///
/// Fails with `too_long` if more than `max` bytes (terminator included)
/// would be needed. Returns the number of bytes appended.
pub(crate) fn copy_in_str(
    space: &dyn AddressSpace,
    uaddr: usize,
    max: usize,
    too_long: Error,
    out: &mut Vec<u8>,
) -> Result<usize> {
    let start = out.len();
    let mut byte = [0u8; 1];
    loop {
        if out.len() - start == max {
            out.truncate(start);
            return Err(too_long);
        }
        let addr = uaddr
            .checked_add(out.len() - start)
            .ok_or(Error::BadAddress)?;
        space.copy_in(addr, &mut byte)?;
        out.try_reserve(1).map_err(|_| Error::OutOfMemory)?;
        out.push(byte[0]);
        if byte[0] == 0 {
            return Ok(out.len() - start);
        }
    }
}

/// Read a path argument out of user memory
pub(crate) fn copy_in_path(space: &dyn AddressSpace, uaddr: usize) -> Result<String> {
    let mut raw = Vec::new();
    copy_in_str(
        space,
        uaddr,
        PATH_MAX,
        Error::InvalidArgument("path too long"),
        &mut raw,
    )?;
    raw.pop();
    String::from_utf8(raw).map_err(|_| Error::InvalidArgument("path is not UTF-8"))
}

impl ProcManager {
    /// Replace the current process's image with the program at `path`
    ///
    /// The new address space is built and activated off to the side; the
    /// process only switches to it once the image and stack are in place.
    /// On failure the old space is reactivated and left installed. On
    /// success the old space is released. Returns the entry point and the
    /// initial stack pointer.
    pub fn load_program(&self, path: &str) -> Result<(usize, usize)> {
        let proc = self
            .curproc()
            .ok_or(Error::InvariantViolation("load_program outside a process"))?;
        let image = self.platform().vfs().open(path, OpenFlags::RDONLY)?;
        let mut fresh = self.platform().create_address_space()?;
        fresh.activate();

        let loaded = self
            .platform()
            .load_elf(&image, &mut *fresh)
            .and_then(|entry| Ok((entry, fresh.define_stack()?)));
        drop(image);
        let (entry, stack) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                log::debug!("proc: loading {} into {} failed: {}", path, proc.pid(), err);
                self.reactivate(&proc);
                return Err(err);
            }
        };

        let old = proc.set_address_space(Some(Arc::from(fresh)));
        drop(old);
        log::debug!("proc: {} loaded {}", proc.pid(), path);
        Ok((entry, stack))
    }

    fn reactivate(&self, proc: &Proc) {
        match proc.address_space() {
            Some(space) => space.activate(),
            None => self.platform().deactivate_address_space(),
        }
    }

    /// Replace the current program, passing `args` to the new one
    ///
    /// Returns only on failure.
    pub fn execv<S: AsRef<str>>(&self, path: &str, args: &[S]) -> Result<Infallible> {
        if path.is_empty() {
            return Err(Error::NotFound);
        }
        if path.len() >= PATH_MAX {
            return Err(Error::InvalidArgument("path too long"));
        }
        let argbuf = ArgBuf::from_args(args, self.config().arg_max)?;
        self.exec_with(path, argbuf)
    }

    pub(crate) fn exec_with(&self, path: &str, argbuf: ArgBuf) -> Result<Infallible> {
        let (entry, stack) = self.load_program(path)?;
        let proc = self
            .curproc()
            .ok_or(Error::InvariantViolation("exec outside a process"))?;
        let space = proc
            .address_space()
            .ok_or(Error::InvariantViolation("exec lost its address space"))?;

        match argbuf.copy_out(&*space, stack) {
            Ok((sp, argv)) => {
                drop(space);
                log::info!("proc: {} exec {} with {} args", proc.pid(), path, argbuf.nargs());
                self.platform().enter_new_process(argbuf.nargs(), argv, sp, entry)
            }
            Err(err) => {
                // The old image is gone; there is nothing to return to
                log::error!("proc: {} exec {}: arguments do not fit: {}", proc.pid(), path, err);
                drop(space);
                self.exit(&proc, -1)
            }
        }
    }
}
