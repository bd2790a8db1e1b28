use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

#[cfg(unix)]
use nix::sys::signal::{SigSet, Signal};
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::{CommandPlan, RunRequest};
use crate::config::{ConfigError, TestConfig};
use crate::coverage::CoverageSummary;
use crate::logging::init_logging;
use crate::process_manager::{CancelToken, ProcessSupervisor, RunError};
use crate::reconcile::GoTestEvent;
use crate::resolver::find_module_root;
use crate::sink::{ConsoleSink, LineSink, OutputMode};
use crate::symbols::{
    benchmark_functions, extract_instance_test_name, find_all_test_suite_runs, test_functions,
    GoOutline, SymbolProvider,
};
use crate::{Command, RunArgs, Scope};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to resolve current directory: {0}")]
    Cwd(#[source] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("failed to read {}: {source}", path.display())]
    ReadSource {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no {kind} found in {}", path.display())]
    NoFunctions { kind: &'static str, path: PathBuf },
    #[error(transparent)]
    Run(#[from] RunError),
    #[cfg(unix)]
    #[error("failed to install signal handling: {0}")]
    Signals(#[source] nix::errno::Errno),
}

/// What a command produced. Run output has already streamed to stdout;
/// `output` carries anything left to print.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub passed: bool,
    pub output: String,
}

pub fn run_command(cmd: Command) -> Result<Outcome, RunnerError> {
    match cmd {
        Command::Help => Ok(Outcome {
            passed: true,
            output: String::new(),
        }),
        Command::Plan(args) => {
            init_logging(args.log_level);
            let cwd = std::env::current_dir().map_err(RunnerError::Cwd)?;
            let request = build_request(&args, &cwd)?;
            let sink = ConsoleSink::stdout(OutputMode::from_env());
            let plan = ProcessSupervisor::new(Arc::new(sink)).plan(&request)?;
            Ok(Outcome {
                passed: true,
                output: render_plan(&plan),
            })
        }
        Command::Run(args) => {
            init_logging(args.log_level);
            let cwd = std::env::current_dir().map_err(RunnerError::Cwd)?;
            run_tests(&args, &cwd)
        }
    }
}

pub fn run_tests(args: &RunArgs, cwd: &Path) -> Result<Outcome, RunnerError> {
    let cancel = CancelToken::new();
    let mut request = build_request(args, cwd)?.with_cancel(cancel.clone());
    if args.events {
        request = request.with_events(Arc::new(|event: &GoTestEvent| {
            match serde_json::to_string(event) {
                Ok(json) => eprintln!("{json}"),
                Err(error) => debug!(%error, "event could not be encoded"),
            }
        }));
    }

    let sink: Arc<dyn LineSink> = Arc::new(ConsoleSink::stdout(OutputMode::from_env()));
    let mut supervisor = ProcessSupervisor::new(sink.clone());
    if request.apply_coverage {
        supervisor = supervisor.with_coverage(Box::new(CoverageSummary::new(sink)));
    }
    let supervisor = Arc::new(supervisor);
    install_interrupt_handler(supervisor.clone(), cancel)?;

    let passed = supervisor.run(&request);
    Ok(Outcome {
        passed,
        output: String::new(),
    })
}

/// Translates CLI arguments into a run request rooted at `cwd`.
pub fn build_request(args: &RunArgs, cwd: &Path) -> Result<RunRequest, RunnerError> {
    let file = match &args.scope {
        Scope::File(path) => Some(cwd.join(path)),
        _ => None,
    };
    let dir = match (&args.dir, &file) {
        (Some(dir), _) => cwd.join(dir),
        (None, Some(file)) => file.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf),
        (None, None) => cwd.to_path_buf(),
    };
    let explicit_config = args.config.as_ref().map(|path| cwd.join(path));
    let config = TestConfig::discover(&dir, explicit_config.as_deref())?;

    let mut request = RunRequest::new(dir.clone(), config);
    if !args.go_flags.is_empty() {
        request = request.with_flags(args.go_flags.clone());
    }
    request.module_mode = !args.gopath && find_module_root(&dir).is_some();
    request.benchmark = matches!(args.scope, Scope::Bench) || (file.is_some() && args.bench);
    request.include_subdirectories = matches!(args.scope, Scope::Workspace);
    request.apply_coverage = args.cover;
    request.background = args.background;
    debug!(
        dir = %dir.display(),
        module_mode = request.module_mode,
        "built run request"
    );

    let functions = match &file {
        Some(file) => file_functions(file, &args.functions, request.benchmark)?,
        None => args.functions.clone(),
    };
    if !functions.is_empty() {
        request = request.with_functions(functions);
    }
    Ok(request)
}

/// Functions to run from one test file. Explicit names are kept; suite
/// methods also pull in the test functions that dispatch their suite.
fn file_functions(
    file: &Path,
    explicit: &[String],
    benchmark: bool,
) -> Result<Vec<String>, RunnerError> {
    let source = fs::read_to_string(file).map_err(|source| RunnerError::ReadSource {
        path: file.to_path_buf(),
        source,
    })?;
    let symbols = GoOutline.provide_symbols(&source);

    if benchmark {
        if !explicit.is_empty() {
            return Ok(explicit.to_vec());
        }
        let names = benchmark_functions(&symbols)
            .into_iter()
            .map(|symbol| symbol.name)
            .collect::<Vec<String>>();
        if names.is_empty() {
            return Err(RunnerError::NoFunctions {
                kind: "benchmarks",
                path: file.to_path_buf(),
            });
        }
        return Ok(names);
    }

    let tests = test_functions(&symbols);
    if explicit.is_empty() {
        if tests.is_empty() {
            return Err(RunnerError::NoFunctions {
                kind: "tests",
                path: file.to_path_buf(),
            });
        }
        return Ok(tests.into_iter().map(|symbol| symbol.name).collect());
    }

    let mut names = explicit.to_vec();
    if explicit
        .iter()
        .any(|name| extract_instance_test_name(name).is_some())
    {
        for suite in find_all_test_suite_runs(&source, &tests) {
            if !names.contains(&suite.name) {
                names.push(suite.name.clone());
            }
        }
    }
    Ok(names)
}

pub fn render_plan(plan: &CommandPlan) -> String {
    let mut lines = vec![
        format!("command: go {}", plan.args.join(" ")),
        format!("display: go {}", plan.display_args.join(" ")),
        format!("json: {}", plan.json_mode),
    ];
    if let Some(path) = &plan.coverage_file_path {
        lines.push(format!("coverprofile: {}", path.display()));
    }
    lines.extend(plan.warnings.iter().map(|warning| format!("warning: {warning}")));
    lines.join("\n")
}

/// SIGINT/SIGTERM cancel every running test process. The signals are blocked
/// on this thread (and threads spawned after it) and consumed by a waiter.
#[cfg(unix)]
fn install_interrupt_handler(
    supervisor: Arc<ProcessSupervisor>,
    cancel: CancelToken,
) -> Result<(), RunnerError> {
    let mut signals = SigSet::empty();
    signals.add(Signal::SIGINT);
    signals.add(Signal::SIGTERM);
    signals.thread_block().map_err(RunnerError::Signals)?;
    thread::spawn(move || loop {
        match signals.wait() {
            Ok(signal) => {
                warn!(?signal, "interrupted; cancelling running tests");
                cancel.cancel();
                supervisor.cancel_all();
            }
            Err(error) => {
                debug!(%error, "signal wait failed");
                return;
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_interrupt_handler(
    _supervisor: Arc<ProcessSupervisor>,
    _cancel: CancelToken,
) -> Result<(), RunnerError> {
    Ok(())
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
