use super::{lock, wait_for_exit, TrackedChild};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn spawn_own_group(script: &str) -> TrackedChild {
    let child = Command::new("sh")
        .arg("-c")
        .arg(script)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
        .expect("spawn sh");
    TrackedChild::new(child)
}

#[test]
fn wait_returns_an_error_instead_of_polling_forever() {
    let tracked = spawn_own_group("exit 0");
    let pid = Pid::from_raw(tracked.child.id() as i32);
    // Reaped behind the handle's back, so every later wait fails.
    waitpid(pid, None).expect("reap");
    let handle = Arc::new(Mutex::new(tracked));

    let waited = wait_for_exit(&handle, None);
    assert!(waited.is_err());
    assert!(lock(&handle).exited);
}

#[test]
fn reaped_processes_are_never_signalled() {
    let mut tracked = spawn_own_group("sleep 30");
    tracked.exited = true;
    tracked.terminate();
    thread::sleep(Duration::from_millis(100));
    assert!(tracked.child.try_wait().expect("try_wait").is_none());

    tracked.exited = false;
    tracked.terminate();
    let status = tracked.child.wait().expect("wait");
    assert_eq!(status.signal(), Some(nix::sys::signal::Signal::SIGKILL as i32));
}

#[test]
fn wait_marks_the_process_exited() {
    let handle = Arc::new(Mutex::new(spawn_own_group("exit 3")));
    let status = wait_for_exit(&handle, None).expect("wait");
    assert_eq!(status.code(), Some(3));
    assert!(lock(&handle).exited);
}
