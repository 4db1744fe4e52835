//! Program replacement tests

mod common;

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{exit_current, Fixture};
use kproc_kernel::api::config::ProcConfig;
use kproc_kernel::api::platform::{AddressSpace, TrapFrame, REG_A0, REG_A1, REG_A3, REG_V0};
use kproc_kernel::api::{Errno, Error};
use kproc_kernel::host::platform::USERSTACK;
use kproc_kernel::host::{HostAddressSpace, HostVnode, UserEntry};
use kproc_kernel::process::{Proc, ProcManager};
use kproc_kernel::syscalls::{self, SYS_EXECV};

const ENTRY: usize = 0x40_0000;
const TIMEOUT: Duration = Duration::from_secs(10);

/// What the new image saw on entry
#[derive(Debug)]
struct Started {
    args: Vec<String>,
    argv: usize,
    stack: usize,
    entry: usize,
}

fn read_arg(space: &dyn AddressSpace, argv: usize, index: usize) -> String {
    let mut raw = [0u8; size_of::<usize>()];
    space
        .copy_in(argv + index * size_of::<usize>(), &mut raw)
        .expect("argv slot");
    let mut addr = usize::from_ne_bytes(raw);
    let mut bytes = Vec::new();
    loop {
        let mut byte = [0u8; 1];
        space.copy_in(addr, &mut byte).expect("arg byte");
        if byte[0] == 0 {
            break;
        }
        bytes.push(byte[0]);
        addr += 1;
    }
    String::from_utf8(bytes).expect("utf-8 arg")
}

/// Report every exec entry on the returned channel, then exit with 0
fn record_starts(fx: &Fixture) -> Receiver<Started> {
    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    fx.on_user_entry(move |manager, entry| {
        if let UserEntry::Exec {
            argc,
            argv,
            stack,
            entry,
        } = entry
        {
            let space = manager.getas().expect("new image has a space");
            let args = (0..argc).map(|i| read_arg(&*space, argv, i)).collect();
            let mut terminator = [0u8; size_of::<usize>()];
            space
                .copy_in(argv + argc * size_of::<usize>(), &mut terminator)
                .expect("argv terminator");
            assert_eq!(usize::from_ne_bytes(terminator), 0);
            drop(space);
            let started = Started {
                args,
                argv,
                stack,
                entry,
            };
            tx.lock().expect("tx").send(started).expect("send");
            exit_current(manager, 0);
        }
    });
    rx
}

/// Run `body` on a thread of `proc`; whatever it returns is sent back and the
/// process exits with status 1
fn run_in<T, F>(fx: &Fixture, proc: &Arc<Proc>, body: F) -> Receiver<T>
where
    T: Send + 'static,
    F: FnOnce(&Arc<ProcManager>) -> T + Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    let manager = fx.manager.clone();
    fx.manager
        .spawn_thread(proc, proc.name(), move || {
            let value = body(&manager);
            tx.send(value).expect("send");
            exit_current(&manager, 1);
        })
        .expect("spawn");
    rx
}

fn exec_error(fx: &Fixture, proc: &Arc<Proc>, path: &'static str, args: &[&str]) -> Error {
    let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    let rx = run_in(fx, proc, move |manager| match manager.execv(path, &args) {
        Ok(never) => match never {},
        Err(err) => err,
    });
    let err = rx.recv_timeout(TIMEOUT).expect("exec result");
    assert_eq!(fx.manager.wait(proc.pid()), Ok(1));
    err
}

fn host_process(fx: &Fixture, name: &str) -> (Arc<Proc>, Arc<HostAddressSpace>) {
    let space = Arc::new(HostAddressSpace::new());
    let proc = fx.manager.create(name).expect("create");
    proc.set_address_space(Some(space.clone()));
    (proc, space)
}

mod success_tests {
    use super::*;

    #[test]
    fn test_execv_starts_program_with_args() {
        let fx = Fixture::new(8);
        fx.platform
            .host_vfs()
            .add("/bin/echo", HostVnode::program("/bin/echo", ENTRY));
        let starts = record_starts(&fx);
        let (proc, old) = host_process(&fx, "shell");

        fx.manager
            .spawn_thread(&proc, "shell", {
                let manager = fx.manager.clone();
                move || {
                    let err = match manager.execv("/bin/echo", &["echo", "hello", ""]) {
                        Ok(never) => match never {},
                        Err(err) => err,
                    };
                    panic!("exec failed: {}", err);
                }
            })
            .expect("spawn");

        let started = starts.recv_timeout(TIMEOUT).expect("program start");
        assert_eq!(started.args, ["echo", "hello", ""]);
        assert_eq!(started.entry, ENTRY);
        assert_eq!(started.stack, started.argv);
        assert_eq!(started.argv % size_of::<usize>(), 0);
        assert!(started.stack < USERSTACK);

        assert_eq!(fx.manager.wait(proc.pid()), Ok(0));
        assert_eq!(fx.platform.spaces_created(), 1);
        assert_eq!(Arc::strong_count(&old), 1);
    }

    #[test]
    fn test_load_program_swaps_space() {
        let fx = Fixture::new(8);
        fx.platform
            .host_vfs()
            .add("/bin/true", HostVnode::program("/bin/true", ENTRY + 0x40));
        let (proc, old) = host_process(&fx, "loader");

        let rx = run_in(&fx, &proc, |manager| {
            let loaded = manager.load_program("/bin/true");
            let space = manager.getas();
            (loaded, space.map(|space| Arc::as_ptr(&space) as *const () as usize))
        });
        let (loaded, space) = rx.recv_timeout(TIMEOUT).expect("load result");

        assert_eq!(loaded, Ok((ENTRY + 0x40, USERSTACK)));
        assert_ne!(space, Some(Arc::as_ptr(&old) as *const () as usize));
        assert_eq!(fx.manager.wait(proc.pid()), Ok(1));
        assert_eq!(Arc::strong_count(&old), 1);
        assert_eq!(old.activations(), 0);
    }

    #[test]
    fn test_execv_through_trap_frame() {
        let fx = Fixture::new(8);
        fx.platform
            .host_vfs()
            .add("/bin/cat", HostVnode::program("/bin/cat", ENTRY));
        let starts = record_starts(&fx);
        let (proc, space) = host_process(&fx, "shell");

        let path = USERSTACK - 256;
        let first = USERSTACK - 128;
        let second = USERSTACK - 96;
        let argv = USERSTACK - 512;
        space.copy_out(path, b"/bin/cat\0").expect("path");
        space.copy_out(first, b"cat\0").expect("arg 0");
        space.copy_out(second, b"notes.txt\0").expect("arg 1");
        for (i, ptr) in [first, second, 0].iter().enumerate() {
            space
                .copy_out(argv + i * size_of::<usize>(), &ptr.to_ne_bytes())
                .expect("argv");
        }

        let manager = fx.manager.clone();
        fx.manager
            .spawn_thread(&proc, "shell", move || {
                let mut tf = TrapFrame::zeroed();
                tf.gpr[REG_V0] = SYS_EXECV;
                tf.gpr[REG_A0] = path;
                tf.gpr[REG_A1] = argv;
                syscalls::dispatch(&manager, &mut tf);
                panic!("exec returned errno {}", tf.gpr[REG_V0]);
            })
            .expect("spawn");

        let started = starts.recv_timeout(TIMEOUT).expect("program start");
        assert_eq!(started.args, ["cat", "notes.txt"]);
        assert_eq!(fx.manager.wait(proc.pid()), Ok(0));
    }
}

mod failure_tests {
    use super::*;

    #[test]
    fn test_missing_program_keeps_old_image() {
        let fx = Fixture::new(8);
        let (proc, old) = host_process(&fx, "shell");
        let kept = Arc::new(Mutex::new(false));
        let err = {
            let kept = kept.clone();
            let rx = run_in(&fx, &proc, move |manager| {
                let err = match manager.execv("/bin/nope", &["nope"]) {
                    Ok(never) => match never {},
                    Err(err) => err,
                };
                let space = manager.getas().expect("old space kept");
                space.copy_out(USERSTACK - 1, &[1]).expect("old space usable");
                *kept.lock().expect("kept") = true;
                err
            });
            rx.recv_timeout(TIMEOUT).expect("exec result")
        };
        assert_eq!(err, Error::NotFound);
        assert!(*kept.lock().expect("kept"));
        assert_eq!(fx.platform.spaces_created(), 0);
        assert_eq!(fx.manager.wait(proc.pid()), Ok(1));

        let mut byte = [0u8; 1];
        old.copy_in(USERSTACK - 1, &mut byte).expect("read");
        assert_eq!(byte[0], 1);
    }

    #[test]
    fn test_bad_image_rolls_back() {
        let fx = Fixture::new(8);
        fx.platform
            .host_vfs()
            .add("/etc/motd", HostVnode::file("/etc/motd"));
        let (proc, old) = host_process(&fx, "shell");

        assert_eq!(exec_error(&fx, &proc, "/etc/motd", &["motd"]), Error::NotExecutable);
        assert_eq!(fx.platform.spaces_created(), 1);
        assert_eq!(old.activations(), 1);
    }

    #[test]
    fn test_no_memory_for_new_image() {
        let fx = Fixture::new(8);
        fx.platform
            .host_vfs()
            .add("/bin/big", HostVnode::program("/bin/big", ENTRY));
        fx.platform.fail_address_space_creation(true);
        let (proc, old) = host_process(&fx, "shell");

        assert_eq!(exec_error(&fx, &proc, "/bin/big", &["big"]), Error::OutOfMemory);
        assert_eq!(old.activations(), 0);
    }

    #[test]
    fn test_argument_limits() {
        let fx = Fixture::with_config(ProcConfig {
            arg_max: 16,
            ..ProcConfig::default().with_max_procs(8)
        });

        assert_eq!(
            fx.manager.execv("/bin/echo", &["echo", "0123456789abcdef"]),
            Err(Error::ArgListTooLong)
        );
        assert_eq!(
            fx.manager.sys_execv("/bin/echo", &["echo", "0123456789abcdef"]),
            Err(Errno::E2BIG)
        );
        assert_eq!(fx.manager.execv("", &["x"]), Err(Error::NotFound));
        let long = "a".repeat(2048);
        assert!(matches!(
            fx.manager.execv(&long, &["x"]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_execv_trap_frame_errors() {
        let fx = Fixture::new(8);
        let (proc, space) = host_process(&fx, "shell");
        space.copy_out(USERSTACK - 8, b"\0").expect("empty path");

        let rx = run_in(&fx, &proc, |manager| {
            let mut results = Vec::new();
            for path in [0, USERSTACK - 8, 0x10] {
                let mut tf = TrapFrame::zeroed();
                tf.gpr[REG_V0] = SYS_EXECV;
                tf.gpr[REG_A0] = path;
                syscalls::dispatch(manager, &mut tf);
                results.push((tf.gpr[REG_A3], tf.gpr[REG_V0]));
            }
            results
        });
        let results = rx.recv_timeout(TIMEOUT).expect("results");
        assert_eq!(
            results,
            [
                (1, Errno::EFAULT.code() as usize),
                (1, Errno::ENOENT.code() as usize),
                (1, Errno::EFAULT.code() as usize),
            ]
        );
        assert_eq!(fx.manager.wait(proc.pid()), Ok(1));
    }
}
