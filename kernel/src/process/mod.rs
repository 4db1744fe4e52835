//! Process management
//!
//! - `table`: bounded pid -> record arena with circular allocation
//! - `proc`: the process record
//! - `manager`: creation, destruction, thread attachment, address spaces
//! - `wait` / `fork`: the exit -> wait rendezvous and process duplication
//! - `fd`: per-process and system-wide open-file tables
//! - `exec`: argument marshalling and program replacement

pub mod exec;
pub mod fd;
pub mod fork;
pub mod manager;
pub mod proc;
pub mod rendezvous;
pub mod table;
pub mod wait;


pub use exec::ArgBuf;
pub use fd::{FileTable, OpenFile, SystemFileTable};
pub use manager::ProcManager;
pub use proc::Proc;
pub use table::ProcTable;
