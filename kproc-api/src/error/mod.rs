//! Error handling for the process core
//!
//! `Error` is what core operations report. `Errno` is the small integer code
//! a syscall hands back to user space; every `Error` maps onto one.

use core::fmt;

use crate::types::Pid;

/// Error type used throughout the process core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A storage request could not be satisfied
    OutOfMemory,
    /// Every process table slot is occupied
    TooManyProcesses,
    /// The system-wide open-file table is full
    TooManyOpenFiles,
    /// No live process carries this pid
    NoSuchProcess(Pid),
    /// The pid names a process that is not a child of the caller
    NotChild(Pid),
    /// Someone else already claimed this process's exit status
    AlreadyReaped(Pid),
    /// Path lookup failed
    NotFound,
    /// Malformed argument
    InvalidArgument(&'static str),
    /// A user pointer could not be read or written
    BadAddress,
    /// Argument vector exceeds the configured ceiling
    ArgListTooLong,
    /// The file is not a loadable program image
    NotExecutable,
    /// Descriptor does not name an open file
    BadFileDescriptor,
    /// I/O failure reported by a collaborator
    IoError,
    /// Operation or call number not provided
    NotSupported,
    /// A lifecycle precondition was violated by the caller
    InvariantViolation(&'static str),
}

impl Error {
    /// User-visible code for this error
    pub fn errno(&self) -> Errno {
        match self {
            Error::OutOfMemory => Errno::ENOMEM,
            Error::TooManyProcesses => Errno::ENPROC,
            Error::TooManyOpenFiles => Errno::ENFILE,
            Error::NoSuchProcess(_) => Errno::ESRCH,
            Error::NotChild(_) | Error::AlreadyReaped(_) => Errno::ECHILD,
            Error::NotFound => Errno::ENOENT,
            Error::InvalidArgument(_) | Error::InvariantViolation(_) => Errno::EINVAL,
            Error::BadAddress => Errno::EFAULT,
            Error::ArgListTooLong => Errno::E2BIG,
            Error::NotExecutable => Errno::ENOEXEC,
            Error::BadFileDescriptor => Errno::EBADF,
            Error::IoError => Errno::EIO,
            Error::NotSupported => Errno::ENOSYS,
        }
    }

    /// Whether the error reports a programming error rather than a runtime condition
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::InvariantViolation(_))
    }

    /// Whether retrying later could succeed
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            Error::OutOfMemory | Error::TooManyProcesses | Error::TooManyOpenFiles
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "Out of memory"),
            Error::TooManyProcesses => write!(f, "Too many processes in system"),
            Error::TooManyOpenFiles => write!(f, "Too many open files in system"),
            Error::NoSuchProcess(pid) => write!(f, "No such process: {}", pid),
            Error::NotChild(pid) => write!(f, "Process {} is not a child of the caller", pid),
            Error::AlreadyReaped(pid) => write!(f, "Exit status of process {} already claimed", pid),
            Error::NotFound => write!(f, "No such file or directory"),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::BadAddress => write!(f, "Bad memory reference"),
            Error::ArgListTooLong => write!(f, "Argument list too long"),
            Error::NotExecutable => write!(f, "Exec format error"),
            Error::BadFileDescriptor => write!(f, "Bad file number"),
            Error::IoError => write!(f, "Input/output error"),
            Error::NotSupported => write!(f, "Function not implemented"),
            Error::InvariantViolation(msg) => write!(f, "Invariant violated: {}", msg),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<Errno> for Error {
    fn from(errno: Errno) -> Self {
        match errno {
            Errno::ENOMEM => Error::OutOfMemory,
            Errno::ENPROC => Error::TooManyProcesses,
            Errno::ENFILE => Error::TooManyOpenFiles,
            Errno::ENOENT => Error::NotFound,
            Errno::EFAULT => Error::BadAddress,
            Errno::E2BIG => Error::ArgListTooLong,
            Errno::ENOEXEC => Error::NotExecutable,
            Errno::EBADF => Error::BadFileDescriptor,
            Errno::EIO => Error::IoError,
            Errno::ESRCH => Error::NoSuchProcess(0),
            Errno::ECHILD => Error::NotChild(0),
            Errno::EINVAL => Error::InvalidArgument("invalid argument"),
            Errno::ENOSYS => Error::NotSupported,
        }
    }
}

/// Result type used throughout the process core
pub type Result<T> = core::result::Result<T, Error>;

/// Error codes returned to user space
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Function not implemented
    ENOSYS = 1,
    /// Out of memory
    ENOMEM = 3,
    /// Bad memory reference
    EFAULT = 6,
    /// Invalid argument
    EINVAL = 8,
    /// Too many processes in system
    ENPROC = 12,
    /// Exec format error
    ENOEXEC = 13,
    /// Argument list too long
    E2BIG = 14,
    /// No such process
    ESRCH = 15,
    /// No child processes
    ECHILD = 16,
    /// No such file or directory
    ENOENT = 19,
    /// Too many open files in system
    ENFILE = 29,
    /// Bad file number
    EBADF = 30,
    /// Input/output error
    EIO = 32,
}

impl Errno {
    /// Raw code as stored in the return register
    pub const fn code(self) -> i32 {
        self as i32
    }

    pub const fn description(self) -> &'static str {
        match self {
            Errno::ENOSYS => "Function not implemented",
            Errno::ENOMEM => "Out of memory",
            Errno::EFAULT => "Bad memory reference",
            Errno::EINVAL => "Invalid argument",
            Errno::ENPROC => "Too many processes in system",
            Errno::ENOEXEC => "Exec format error",
            Errno::E2BIG => "Argument list too long",
            Errno::ESRCH => "No such process",
            Errno::ECHILD => "No child processes",
            Errno::ENOENT => "No such file or directory",
            Errno::ENFILE => "Too many open files in system",
            Errno::EBADF => "Bad file number",
            Errno::EIO => "Input/output error",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}
