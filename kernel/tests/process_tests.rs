//! Process management tests
//! Tests for pid allocation, lookup, record lifecycle and reparenting

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;

use common::Fixture;
use kproc_kernel::api::config::ProcConfig;
use kproc_kernel::api::vfs::{OpenFlags, Vnode};
use kproc_kernel::api::{Error, INIT_PID, KERNEL_PID};
use kproc_kernel::host::{HostAddressSpace, HostVnode};
use kproc_kernel::process::Proc;
use proptest::prelude::*;

mod allocation_tests {
    use super::*;

    #[test]
    fn test_first_pids() {
        let fx = Fixture::new(8);
        let a = fx.manager.create("a").expect("create a");
        let b = fx.manager.create("b").expect("create b");
        assert_eq!(a.pid(), 1);
        assert_eq!(b.pid(), 2);
        assert_eq!(fx.manager.process_count(), 2);
        assert_eq!(fx.manager.getpid(&b), 2);
    }

    #[test]
    fn test_lookup_by_pid() {
        let fx = Fixture::new(8);
        let proc = fx.manager.create("looked-up").expect("create");
        let found = fx.manager.lookup(proc.pid()).expect("lookup");
        assert!(Arc::ptr_eq(&found, &proc));
        assert_eq!(found.name(), "looked-up");
        assert!(fx.manager.lookup(KERNEL_PID).is_err());
        assert_eq!(fx.manager.lookup(5).err(), Some(Error::NoSuchProcess(5)));
    }

    #[test]
    fn test_table_full_then_recovers() {
        let fx = Fixture::new(3);
        let procs: Vec<_> = (0..3)
            .map(|i| fx.manager.create(&format!("p{}", i)).expect("create"))
            .collect();
        assert_eq!(fx.manager.create("overflow").err(), Some(Error::TooManyProcesses));

        let freed = procs[1].pid();
        fx.manager.destroy(procs[1].clone()).expect("destroy");
        let again = fx.manager.create("again").expect("create after destroy");
        assert_eq!(again.pid(), freed);
    }

    #[test]
    fn test_pids_not_reused_immediately() {
        let fx = Fixture::new(8);
        let first = fx.manager.create("first").expect("create");
        fx.manager.destroy(first).expect("destroy");
        let second = fx.manager.create("second").expect("create");
        assert_eq!(second.pid(), 2);
    }

    #[test]
    fn test_kernel_process_is_not_registered() {
        let fx = Fixture::new(4);
        let kproc = fx.manager.kernel_proc().clone();
        assert_eq!(kproc.pid(), KERNEL_PID);
        assert!(fx.manager.is_kernel_proc(&kproc));
        assert_eq!(fx.manager.process_count(), 0);
        assert!(matches!(
            fx.manager.destroy(kproc),
            Err(Error::InvariantViolation(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_live_pids_are_unique(ops in proptest::collection::vec(any::<Option<u8>>(), 1..64)) {
            let capacity = 6;
            let fx = Fixture::new(capacity);
            let mut live: Vec<Arc<Proc>> = Vec::new();
            for op in ops {
                match op {
                    None if !live.is_empty() => {
                        let victim = live.remove(0);
                        fx.manager.destroy(victim).expect("destroy");
                    }
                    _ => match fx.manager.create("prop") {
                        Ok(proc) => {
                            prop_assert!(live.len() < capacity);
                            prop_assert!(proc.pid() >= 1 && proc.pid() as usize <= capacity);
                            prop_assert!(live.iter().all(|p| p.pid() != proc.pid()));
                            live.push(proc);
                        }
                        Err(err) => {
                            prop_assert_eq!(err, Error::TooManyProcesses);
                            prop_assert_eq!(live.len(), capacity);
                        }
                    },
                }
                let pids: BTreeSet<_> = live.iter().map(|p| p.pid()).collect();
                prop_assert_eq!(pids.len(), live.len());
                prop_assert_eq!(fx.manager.process_count(), live.len());
            }
        }
    }
}

mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_create_is_empty() {
        let fx = Fixture::new(4);
        let proc = fx.manager.create("empty").expect("create");
        assert_eq!(proc.thread_count(), 0);
        assert!(!proc.has_address_space());
        assert!(proc.cwd().is_none());
        assert!(proc.children().is_empty());
        assert_eq!(proc.parent_pid(), INIT_PID);
        assert_eq!(proc.open_files(), 0);
        assert_eq!(proc.exit_status(), None);
    }

    #[test]
    fn test_runprogram_inherits_cwd_and_console() {
        let fx = Fixture::new(4);
        let root: Arc<dyn Vnode> = HostVnode::dir("/");
        fx.manager.kernel_proc().set_cwd(Some(root.clone()));
        assert_eq!(Arc::strong_count(&root), 2);

        let proc = fx.manager.create_runprogram("shell").expect("create");
        assert!(Arc::ptr_eq(&proc.cwd().expect("cwd"), &root));
        assert_eq!(Arc::strong_count(&root), 3);

        let stdin = proc.file(0).expect("stdin");
        let stdout = proc.file(1).expect("stdout");
        let stderr = proc.file(2).expect("stderr");
        assert_eq!(stdin.flags(), OpenFlags::RDONLY);
        assert_eq!(stdout.flags(), OpenFlags::WRONLY);
        assert_eq!(stderr.flags(), OpenFlags::WRONLY);
        assert_eq!(stdout.refs(), 1);
        assert_eq!(stdout.offset(), 0);
        assert_eq!(stdin.vnode().name(), "con:");
        assert_eq!(fx.manager.system_files().live(), 3);
        drop((stdin, stdout, stderr));

        fx.manager.destroy(proc).expect("destroy");
        assert_eq!(Arc::strong_count(&root), 2);
        assert_eq!(fx.manager.system_files().live(), 0);
    }

    #[test]
    fn test_runprogram_without_console_unwinds() {
        let fx = Fixture::new(4);
        fx.platform.host_vfs().remove("con:");
        assert_eq!(fx.manager.create_runprogram("shell").err(), Some(Error::NotFound));
        assert_eq!(fx.manager.process_count(), 0);
    }

    #[test]
    fn test_runprogram_system_table_full() {
        let mut config = ProcConfig::default().with_max_procs(4);
        config.system_open_max = 4;
        let fx = Fixture::with_config(config);
        let first = fx.manager.create_runprogram("one").expect("first");
        assert_eq!(
            fx.manager.create_runprogram("two").err(),
            Some(Error::TooManyOpenFiles)
        );
        assert_eq!(fx.manager.process_count(), 1);
        fx.manager.destroy(first).expect("destroy");
        fx.manager.create_runprogram("three").expect("after release");
    }

    #[test]
    fn test_destroy_refuses_live_threads() {
        let fx = Fixture::new(4);
        let proc = fx.manager.create("busy").expect("create");
        fx.manager.add_thread(&proc, 9_000_001).expect("add thread");
        assert_eq!(proc.thread_count(), 1);
        assert!(matches!(
            fx.manager.destroy(proc.clone()),
            Err(Error::InvariantViolation(_))
        ));

        let owner = fx.manager.remove_thread(9_000_001).expect("remove thread");
        assert!(Arc::ptr_eq(&owner, &proc));
        fx.manager.destroy(proc).expect("destroy");
    }

    #[test]
    fn test_thread_attachment() {
        let fx = Fixture::new(4);
        let proc = fx.manager.create("attached").expect("create");
        assert!(fx.manager.curproc().is_none());
        assert!(Arc::ptr_eq(&fx.manager.current_or_kernel(), fx.manager.kernel_proc()));

        fx.manager.attach_current(&proc).expect("attach");
        assert!(Arc::ptr_eq(&fx.manager.curproc().expect("curproc"), &proc));
        assert!(fx.manager.attach_current(&proc).is_err());

        fx.manager.detach_current().expect("detach");
        assert!(fx.manager.curproc().is_none());
        assert!(fx.manager.detach_current().is_err());
        assert_eq!(proc.thread_count(), 0);
    }

    #[test]
    fn test_getas_setas() {
        let fx = Fixture::new(4);
        let proc = fx.manager.create("spaces").expect("create");
        assert!(fx.manager.setas(None).is_err());

        fx.manager.attach_current(&proc).expect("attach");
        assert!(fx.manager.getas().is_none());
        let old = fx
            .manager
            .setas(Some(Arc::new(HostAddressSpace::new())))
            .expect("setas");
        assert!(old.is_none());
        assert!(fx.manager.getas().is_some());
        assert!(proc.has_address_space());
        fx.manager.detach_current().expect("detach");
    }

    #[test]
    fn test_destroy_releases_address_space() {
        let fx = Fixture::new(4);
        let proc = fx.user_process("spaces");
        let space = proc.address_space().expect("space");
        assert_eq!(Arc::strong_count(&space), 2);

        fx.manager.destroy(proc).expect("destroy");
        assert_eq!(Arc::strong_count(&space), 1);
        // Not the current process, so translations were left alone
        assert_eq!(fx.platform.deactivations(), 0);
    }

    #[test]
    fn test_destroy_twice_fails_cleanly() {
        let fx = Fixture::new(4);
        let proc = fx.manager.create("once").expect("create");
        let pid = proc.pid();
        fx.manager.destroy(proc.clone()).expect("destroy");
        assert_eq!(fx.manager.destroy(proc).err(), Some(Error::NoSuchProcess(pid)));
    }
}
