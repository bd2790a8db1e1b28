pub mod command;
pub mod config;
pub mod coverage;
pub mod line_buffer;
pub mod locator;
pub mod logging;
pub mod process_manager;
pub mod reconcile;
pub mod resolver;
pub mod runner;
pub mod sink;
pub mod symbols;

use std::path::PathBuf;

use thiserror::Error;

use crate::logging::LogLevel;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunArgs),
    Plan(RunArgs),
    Help,
}

/// Which tests a run covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Package,
    Bench,
    File(PathBuf),
    Workspace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub scope: Scope,
    pub dir: Option<PathBuf>,
    pub functions: Vec<String>,
    pub config: Option<PathBuf>,
    pub cover: bool,
    /// Legacy GOPATH workspace instead of module detection.
    pub gopath: bool,
    pub events: bool,
    pub background: bool,
    /// Benchmarks rather than tests for `file`.
    pub bench: bool,
    pub log_level: LogLevel,
    pub go_flags: Vec<String>,
}

impl RunArgs {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            dir: None,
            functions: Vec::new(),
            config: None,
            cover: false,
            gopath: false,
            events: false,
            background: false,
            bench: false,
            log_level: LogLevel::default(),
            go_flags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CliParseError {
    #[error("{0} requires a value")]
    MissingValue(&'static str),
    #[error("file requires a path to a _test.go file")]
    MissingFile,
    #[error("unknown log level: {0} (expected trace, debug, info, warn, error)")]
    InvalidLogLevel(String),
    #[error("unknown scope: {0}")]
    UnknownScope(String),
    #[error("unknown argument: {0}")]
    UnknownArgument(String),
}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let Some(cmd) = args.next() else {
        return Ok(Command::Help);
    };

    match cmd.as_str() {
        "--help" | "-h" | "help" => Ok(Command::Help),
        "plan" => {
            let Some(scope) = args.next() else {
                return Err(CliParseError::MissingValue("plan"));
            };
            match parse_run(scope, args)? {
                Command::Run(run) => Ok(Command::Plan(run)),
                other => Ok(other),
            }
        }
        _ => parse_run(cmd, args),
    }
}

fn parse_run<I>(scope: String, args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let scope = match scope.as_str() {
        "package" => Scope::Package,
        "bench" => Scope::Bench,
        "workspace" => Scope::Workspace,
        "file" => match args.next() {
            Some(path) if !path.starts_with('-') => Scope::File(PathBuf::from(path)),
            _ => return Err(CliParseError::MissingFile),
        },
        "--help" | "-h" => return Ok(Command::Help),
        other => return Err(CliParseError::UnknownScope(other.to_owned())),
    };
    let mut run = RunArgs::new(scope);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--dir" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--dir"));
                };
                run.dir = Some(PathBuf::from(path));
            }
            "--func" => {
                let Some(name) = args.next() else {
                    return Err(CliParseError::MissingValue("--func"));
                };
                run.functions.push(name);
            }
            "--config" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingValue("--config"));
                };
                run.config = Some(PathBuf::from(path));
            }
            "--log" => {
                let Some(level) = args.next() else {
                    return Err(CliParseError::MissingValue("--log"));
                };
                run.log_level =
                    LogLevel::parse(&level).ok_or(CliParseError::InvalidLogLevel(level))?;
            }
            "--cover" => run.cover = true,
            "--gopath" => run.gopath = true,
            "--events" => run.events = true,
            "--background" => run.background = true,
            "--bench" => run.bench = true,
            "--" => {
                run.go_flags = args.by_ref().collect();
            }
            "--help" | "-h" => return Ok(Command::Help),
            other => return Err(CliParseError::UnknownArgument(other.to_owned())),
        }
    }

    Ok(Command::Run(run))
}

pub fn print_usage() {
    eprintln!(
        "gotest-relay\n\nUSAGE:\n  gotest-relay package   [options] [-- <go test flags>]\n  gotest-relay bench     [options] [-- <go test flags>]\n  gotest-relay file <F>  [options] [-- <go test flags>]\n  gotest-relay workspace [options] [-- <go test flags>]\n  gotest-relay plan <scope> [scope args]\n\nSCOPES:\n  package           Tests of the package in --dir\n  bench             Benchmarks of the package in --dir\n  file <F>          Tests (or --bench benchmarks) declared in one _test.go file\n  workspace         Tests of every package below --dir (./...)\n  plan <scope>      Print the go invocation for a scope without running it\n\nOPTIONS:\n  --dir <PATH>      Package directory (default: current directory)\n  --func <NAME>     Only run this function; repeatable\n  --config <PATH>   Config file (default: <dir>/gotest-relay.toml when present)\n  --cover           Collect a cover profile and print a coverage summary\n  --gopath          Legacy GOPATH workspace instead of go.mod detection\n  --events          Write go test JSON events to stderr\n  --background      Quiet lifecycle logging\n  --bench           With `file`, run benchmarks instead of tests\n  --log <LEVEL>     trace, debug, info, warn (default), error\n\nENVIRONMENT:\n  GOTEST_RELAY_LOG    Log filter override\n  GOTEST_RELAY_COLOR  auto, always, never\n  NO_COLOR            Disable colour\n\nGENERAL:\n  -h, --help        Print help\n"
    );
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
