use alloc::string::String;

use kproc_api::{Error, Result};

/// Duplicate `s` into a new allocation, reporting exhaustion instead of aborting
pub(crate) fn kstrdup(s: &str) -> Result<String> {
    let mut copy = String::new();
    copy.try_reserve_exact(s.len())
        .map_err(|_| Error::OutOfMemory)?;
    copy.push_str(s);
    Ok(copy)
}
