use std::collections::HashMap;
use std::io::{ErrorKind, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, ChildStdout, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

#[cfg(unix)]
use nix::sys::signal::{kill, sigprocmask, SigSet, SigmaskHow, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::{compute_test_command, CommandPlan, RunRequest};
use crate::config::Concurrency;
use crate::coverage::{CoverageApplier, NoCoverage};
use crate::line_buffer::LineBuffer;
use crate::locator::{BinaryLocator, FixedPath, SearchPath};
use crate::reconcile::{expand_file_path, output_processor};
use crate::resolver::{resolve_targets, GoList, PackageQuery, RunTargets};
use crate::sink::LineSink;

const RUNNER_BINARY: &str = "go";
const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(40);
const READ_CHUNK: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("cannot run `go test`: the `{name}` binary was not found in GOROOT ({goroot}) or PATH ({path})")]
    BinaryNotFound {
        name: String,
        goroot: String,
        path: String,
    },
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` is missing its stdout/stderr pipe")]
    MissingStdio { command: String },
    #[error("lost track of `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Cooperative cancellation for one run. Cloning shares the flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A registered test process. Once `exited` is set the process has been
/// reaped and its group is never signalled again.
struct TrackedChild {
    child: Child,
    exited: bool,
}

impl TrackedChild {
    fn new(child: Child) -> Self {
        Self {
            child,
            exited: false,
        }
    }

    fn terminate(&mut self) {
        if !self.exited {
            terminate_tree(&mut self.child);
        }
    }
}

type ChildHandle = Arc<Mutex<TrackedChild>>;

/// Runs `go test` and owns the registry of every test process still alive.
///
/// One supervisor is meant to live for the whole host program; runs on
/// different threads may share it.
pub struct ProcessSupervisor {
    sink: Arc<dyn LineSink>,
    locator: Box<dyn BinaryLocator>,
    packages: Option<Box<dyn PackageQuery>>,
    coverage: Box<dyn CoverageApplier>,
    registry: Mutex<HashMap<u64, ChildHandle>>,
    next_id: AtomicU64,
}

impl ProcessSupervisor {
    pub fn new(sink: Arc<dyn LineSink>) -> Self {
        Self {
            sink,
            locator: Box::new(SearchPath),
            packages: None,
            coverage: Box::new(NoCoverage),
            registry: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_locator(mut self, locator: Box<dyn BinaryLocator>) -> Self {
        self.locator = locator;
        self
    }

    /// Replaces the `go list` backed package query.
    pub fn with_package_query(mut self, packages: Box<dyn PackageQuery>) -> Self {
        self.packages = Some(packages);
        self
    }

    pub fn with_coverage(mut self, coverage: Box<dyn CoverageApplier>) -> Self {
        self.coverage = coverage;
        self
    }

    pub fn running(&self) -> usize {
        lock(&self.registry).len()
    }

    /// Runs the request to completion. `true` only for a zero exit code; every
    /// failure to start is written to the sink and yields `false`.
    pub fn run(&self, request: &RunRequest) -> bool {
        match self.try_run(request) {
            Ok(passed) => passed,
            Err(error) => {
                warn!(%error, "{} failed", request.kind());
                self.sink.line(&format!("Error: {} failed.", request.kind()));
                self.sink.line(&error.to_string());
                false
            }
        }
    }

    /// The plan `run` would execute, without starting anything.
    pub fn plan(&self, request: &RunRequest) -> Result<CommandPlan, RunError> {
        let go = self.locate_runner(request)?;
        let targets = self.resolve(request, &go);
        Ok(compute_test_command(request, &targets.targets))
    }

    /// Kills every registered process tree and empties the registry.
    pub fn cancel_all(&self) -> bool {
        let drained = {
            let mut registry = lock(&self.registry);
            registry.drain().collect::<Vec<(u64, ChildHandle)>>()
        };
        for (id, child) in &drained {
            debug!(run = id, "cancelling test process");
            lock(child).terminate();
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "cancelled running tests");
        }
        self.sink.busy(0);
        true
    }

    fn try_run(&self, request: &RunRequest) -> Result<bool, RunError> {
        if request.config.concurrency == Concurrency::Serial {
            self.cancel_all();
        }
        let go = self.locate_runner(request)?;
        let targets = self.resolve(request, &go);
        let plan = compute_test_command(request, &targets.targets);
        for warning in &plan.warnings {
            warn!("{warning}");
            self.sink.line(&format!("Warning: {warning}"));
        }

        self.sink.line(&format!(
            "Running tool: {} {}",
            go.display(),
            plan.display_args.join(" ")
        ));
        self.sink.line("");
        if request.background {
            debug!(dir = %request.dir.display(), "starting background {}", request.kind());
        } else {
            info!(dir = %request.dir.display(), "starting {}", request.kind());
        }

        let status = self.spawn_and_stream(request, &go, &plan, targets)?;
        let passed = status.success();
        debug!(%status, passed, "test process finished");

        if let Some(profile) = plan.coverage_file_path.as_deref() {
            if let Err(error) = self.coverage.apply(profile, &request.dir) {
                warn!(%error, "coverage could not be applied");
            }
        }
        Ok(passed)
    }

    fn locate_runner(&self, request: &RunRequest) -> Result<PathBuf, RunError> {
        let found = match request.config.go_binary.as_ref() {
            Some(configured) => FixedPath(configured.clone()).locate(RUNNER_BINARY),
            None => self.locator.locate(RUNNER_BINARY),
        };
        found.ok_or_else(|| RunError::BinaryNotFound {
            name: RUNNER_BINARY.to_owned(),
            goroot: std::env::var("GOROOT").unwrap_or_default(),
            path: std::env::var("PATH").unwrap_or_default(),
        })
    }

    fn resolve(&self, request: &RunRequest, go: &Path) -> RunTargets {
        match self.packages.as_deref() {
            Some(query) => resolve_targets(request, query),
            None => {
                let query = GoList::new(go.to_path_buf(), request.config.test_env());
                resolve_targets(request, &query)
            }
        }
    }

    fn spawn_and_stream(
        &self,
        request: &RunRequest,
        go: &Path,
        plan: &CommandPlan,
        targets: RunTargets,
    ) -> Result<ExitStatus, RunError> {
        let rendered = format!("{} {}", go.display(), plan.args.join(" "));
        let mut process = test_command(go, plan, &request.dir, request.config.test_env());
        let mut child = process.spawn().map_err(|source| RunError::Spawn {
            command: rendered.clone(),
            source,
        })?;
        let (stdout, stderr) = match (child.stdout.take(), child.stderr.take()) {
            (Some(stdout), Some(stderr)) => (stdout, stderr),
            _ => {
                terminate_tree(&mut child);
                let _ = child.wait();
                return Err(RunError::MissingStdio { command: rendered });
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let child = Arc::new(Mutex::new(TrackedChild::new(child)));
        let running = {
            let mut registry = lock(&self.registry);
            registry.insert(id, child.clone());
            registry.len()
        };
        self.sink.busy(running);

        let stdout_reader = self.stream_stdout(stdout, plan.json_mode, targets, request);
        let stderr_reader = self.stream_stderr(stderr, request.dir.clone());

        let status = wait_for_exit(&child, request.cancel.as_ref());
        let remaining = {
            let mut registry = lock(&self.registry);
            registry.remove(&id);
            registry.len()
        };
        self.sink.busy(remaining);

        for reader in [stdout_reader, stderr_reader] {
            if reader.join().is_err() {
                warn!("output reader thread panicked");
            }
        }
        status.map_err(|source| RunError::Wait {
            command: rendered,
            source,
        })
    }

    fn stream_stdout(
        &self,
        stdout: ChildStdout,
        json_mode: bool,
        targets: RunTargets,
        request: &RunRequest,
    ) -> thread::JoinHandle<()> {
        let sink = self.sink.clone();
        let mut processor = output_processor(
            json_mode,
            targets.packages,
            &request.dir,
            request.events.clone(),
        );
        thread::spawn(move || {
            let mut buffer = LineBuffer::new();
            read_chunks(stdout, |chunk| {
                for line in buffer.append(chunk) {
                    processor.process_line(&line, sink.as_ref());
                }
            });
            if let Some(last) = buffer.done() {
                processor.process_line(&last, sink.as_ref());
            }
            processor.finish(sink.as_ref());
        })
    }

    fn stream_stderr(&self, stderr: ChildStderr, dir: PathBuf) -> thread::JoinHandle<()> {
        let sink = self.sink.clone();
        thread::spawn(move || {
            let mut buffer = LineBuffer::new();
            read_chunks(stderr, |chunk| {
                for line in buffer.append(chunk) {
                    sink.line(&expand_file_path(&line, &dir));
                }
            });
            if let Some(last) = buffer.done() {
                sink.line(&expand_file_path(&last, &dir));
            }
        })
    }
}

fn test_command(
    go: &Path,
    plan: &CommandPlan,
    dir: &Path,
    env: impl IntoIterator<Item = (String, String)>,
) -> ProcessCommand {
    let mut process = ProcessCommand::new(go);
    process
        .args(&plan.args)
        .current_dir(dir)
        .env_clear()
        .envs(env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    #[cfg(unix)]
    unsafe {
        // Own process group so the whole tree can be signalled; signals
        // blocked by the host must not stay blocked in the runner.
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .and_then(|_| sigprocmask(SigmaskHow::SIG_SETMASK, Some(&SigSet::empty()), None))
                .map_err(std::io::Error::from)
        });
    }
    process
}

fn read_chunks<R: Read>(mut reader: R, mut on_chunk: impl FnMut(&[u8])) {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => on_chunk(&chunk[..read]),
            Err(error) if error.kind() == ErrorKind::Interrupted => continue,
            Err(error) => {
                debug!(%error, "output stream closed");
                break;
            }
        }
    }
}

/// Polls until the process is reaped. A failed wait is final: the process is
/// killed, marked exited and the error returned.
fn wait_for_exit(
    child: &ChildHandle,
    cancel: Option<&CancelToken>,
) -> std::io::Result<ExitStatus> {
    let mut killed = false;
    loop {
        {
            let mut tracked = lock(child);
            if !killed && cancel.is_some_and(CancelToken::is_cancelled) {
                debug!(pid = tracked.child.id(), "cancellation requested");
                tracked.terminate();
                killed = true;
            }
            match tracked.child.try_wait() {
                Ok(Some(status)) => {
                    tracked.exited = true;
                    return Ok(status);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(%error, "waiting on test process failed; killing it");
                    tracked.terminate();
                    let waited = tracked.child.wait();
                    tracked.exited = true;
                    return waited;
                }
            }
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

fn terminate_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let pid = child.id() as i32;
        if pid > 0 && kill(Pid::from_raw(-pid), Signal::SIGKILL).is_ok() {
            return;
        }
    }
    let _ = child.kill();
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(all(test, unix))]
#[path = "tests/process_manager_tests.rs"]
mod tests;
