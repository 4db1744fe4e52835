//! Fork

use alloc::sync::Arc;

use kproc_api::platform::TrapFrame;
use kproc_api::{Error, Pid, Result};

use super::manager::ProcManager;
use super::proc::Proc;

impl ProcManager {
    /// Duplicate `parent` into a new child process
    ///
    /// The child gets a copy of the address space, shares the working
    /// directory and every open file, and starts in user mode from a copy
    /// of `tf` that makes fork return 0. Returns the child's pid; on failure
    /// nothing of the child survives.
    pub fn fork(self: &Arc<Self>, parent: &Arc<Proc>, tf: &TrapFrame) -> Result<Pid> {
        if self.is_kernel_proc(parent) {
            return Err(Error::InvariantViolation("fork of the kernel process"));
        }
        let child = self.register(parent.name())?;
        if let Err(err) = self.populate_child(parent, &child) {
            log::warn!("proc: fork of {} failed: {}", parent.pid(), err);
            self.discard(child);
            return Err(err);
        }

        child.lock().parent = parent.pid();
        parent.add_child(child.pid());

        let mut child_tf = *tf;
        child_tf.prepare_fork_child();
        let platform = self.platform().clone();
        let spawned = self.spawn_thread(&child, parent.name(), move || {
            platform.enter_forked_process(child_tf);
        });
        if let Err(err) = spawned {
            log::warn!("proc: no thread for child of {}: {}", parent.pid(), err);
            parent.remove_child(child.pid());
            self.discard(child);
            return Err(err);
        }

        log::debug!("proc: {} forked {}", parent.pid(), child.pid());
        Ok(child.pid())
    }

    fn populate_child(&self, parent: &Proc, child: &Proc) -> Result<()> {
        child.set_cwd(parent.cwd());

        let space = parent
            .address_space()
            .ok_or(Error::InvalidArgument("fork of a process without an address space"))?;
        let copy = space.try_copy()?;
        child.set_address_space(Some(Arc::from(copy)));

        let parent_files = parent.files();
        child.files().copy_from(&parent_files);
        Ok(())
    }
}
