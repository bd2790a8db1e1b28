use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{CoverMode, TestConfig};
use crate::process_manager::CancelToken;
use crate::reconcile::EventSink;
use crate::symbols::extract_instance_test_name;

pub const LONG_TARGETS_MARKER: &str = "<long arguments omitted>";
pub const MAX_DISPLAY_TARGETS: usize = 4;
const PASSTHROUGH_SEPARATOR: &str = "-args";
const RUN_FLAG: &str = "-run";

/// Everything needed to run `go test` once.
#[derive(Clone)]
pub struct RunRequest {
    pub dir: PathBuf,
    pub config: TestConfig,
    /// Caller flags. Defaults to the configured test (or build) flags.
    pub flags: Vec<String>,
    pub functions: Option<Vec<String>>,
    pub benchmark: bool,
    pub module_mode: bool,
    pub include_subdirectories: bool,
    pub apply_coverage: bool,
    /// Not explicitly requested by a user; lifecycle logging stays quiet.
    pub background: bool,
    pub cancel: Option<CancelToken>,
    pub events: Option<Arc<dyn EventSink>>,
}

impl RunRequest {
    pub fn new(dir: impl Into<PathBuf>, config: TestConfig) -> Self {
        let flags = config.default_flags();
        Self {
            dir: dir.into(),
            config,
            flags,
            functions: None,
            benchmark: false,
            module_mode: true,
            include_subdirectories: false,
            apply_coverage: false,
            background: false,
            cancel: None,
            events: None,
        }
    }

    pub fn with_flags(mut self, flags: Vec<String>) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_functions(mut self, functions: Vec<String>) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn kind(&self) -> &'static str {
        if self.benchmark {
            "Benchmarks"
        } else {
            "Tests"
        }
    }
}

impl std::fmt::Debug for RunRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunRequest")
            .field("dir", &self.dir)
            .field("config", &self.config)
            .field("flags", &self.flags)
            .field("functions", &self.functions)
            .field("benchmark", &self.benchmark)
            .field("module_mode", &self.module_mode)
            .field("include_subdirectories", &self.include_subdirectories)
            .field("apply_coverage", &self.apply_coverage)
            .field("background", &self.background)
            .field("cancel", &self.cancel.is_some())
            .field("events", &self.events.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPlan {
    /// Arguments handed to the `go` binary.
    pub args: Vec<String>,
    /// What a user would type: no `-json` plumbing, long target lists elided.
    pub display_args: Vec<String>,
    pub coverage_file_path: Option<PathBuf>,
    pub json_mode: bool,
    pub warnings: Vec<String>,
}

pub fn compute_test_command(request: &RunRequest, targets: &[String]) -> CommandPlan {
    let config = &request.config;
    let (runner_flags, passthrough) = split_passthrough(&request.flags);
    let mut runner_flags = runner_flags.to_vec();
    let mut args = vec!["test".to_owned()];
    let mut warnings = Vec::new();
    let mut coverage_file_path = None;

    if request.benchmark {
        args.push("-benchmem".to_owned());
        args.push("-run=^$".to_owned());
    } else {
        args.push("-timeout".to_owned());
        args.push(config.test_timeout.clone());
        if request.apply_coverage {
            let path = coverage_profile_path(&request.dir);
            args.push(format!("-coverprofile={}", path.display()));
            match CoverMode::parse(&config.cover_mode) {
                Some(mode) => {
                    if let Some(value) = mode.flag_value() {
                        args.push(format!("-covermode={value}"));
                    }
                }
                None => warnings.push(format!(
                    "cover mode `{}` is not one of default, set, count, atomic; using the default",
                    config.cover_mode
                )),
            }
            coverage_file_path = Some(path);
        }
    }

    if let Some(tags) = config.tags() {
        if !contains_flag(&runner_flags, "-tags") {
            args.push("-tags".to_owned());
            args.push(tags.to_owned());
        }
    }

    args.extend(function_filters(request));

    let json_mode = (contains_flag(&runner_flags, "-v") || request.events.is_some())
        && !contains_flag(&runner_flags, "-json");

    let mut display_args = args.clone();
    if targets.len() > MAX_DISPLAY_TARGETS {
        display_args.push(LONG_TARGETS_MARKER.to_owned());
    } else {
        display_args.extend(targets.iter().cloned());
    }
    args.extend(targets.iter().cloned());
    if json_mode {
        args.push("-json".to_owned());
    }

    if contains_flag(&args, RUN_FLAG) {
        remove_run_flag(&mut runner_flags);
    }
    for list in [&mut args, &mut display_args] {
        list.extend(runner_flags.iter().cloned());
        list.extend(passthrough.iter().cloned());
    }

    CommandPlan {
        args,
        display_args,
        coverage_file_path,
        json_mode,
        warnings,
    }
}

/// Splits at the first `-args`; the tail, separator included, belongs to the
/// test binary.
pub fn split_passthrough(flags: &[String]) -> (&[String], &[String]) {
    match flags.iter().position(|flag| flag == PASSTHROUGH_SEPARATOR) {
        Some(index) => flags.split_at(index),
        None => (flags, &flags[flags.len()..]),
    }
}

/// `-run`/`-bench`/`-check.f` filters for explicitly named functions.
///
/// Suite methods go to `-check.f` only. When every name is a suite method no
/// `-run` is emitted, so the dispatcher test must be one of the functions the
/// package runs anyway.
pub fn function_filters(request: &RunRequest) -> Vec<String> {
    let functions = request
        .functions
        .as_deref()
        .filter(|functions| !functions.is_empty());
    let Some(functions) = functions else {
        if request.benchmark {
            return vec!["-bench".to_owned(), ".".to_owned()];
        }
        return Vec::new();
    };

    if request.benchmark {
        return vec!["-bench".to_owned(), anchored_alternation(functions)];
    }

    let (methods, plain): (Vec<&String>, Vec<&String>) = functions
        .iter()
        .partition(|name| extract_instance_test_name(name).is_some());
    let methods = methods
        .into_iter()
        .filter_map(|name| extract_instance_test_name(name))
        .collect::<Vec<&str>>();

    let mut filters = Vec::new();
    if !plain.is_empty() {
        filters.push(RUN_FLAG.to_owned());
        filters.push(anchored_alternation(&plain));
    }
    if !methods.is_empty() {
        filters.push("-check.f".to_owned());
        filters.push(anchored_alternation(&methods));
    }
    filters
}

fn anchored_alternation<S: AsRef<str>>(names: &[S]) -> String {
    let joined = names
        .iter()
        .map(|name| name.as_ref())
        .collect::<Vec<&str>>()
        .join("|");
    format!("^({joined})$")
}

fn contains_flag(flags: &[String], flag: &str) -> bool {
    flags.iter().any(|candidate| candidate == flag)
}

/// Drops the first `-run <value>` (or `-run=<value>`) from caller flags.
pub fn remove_run_flag(flags: &mut Vec<String>) {
    let Some(index) = flags
        .iter()
        .position(|flag| flag == RUN_FLAG || flag.starts_with("-run="))
    else {
        return;
    };
    let end = if flags[index] == RUN_FLAG {
        (index + 2).min(flags.len())
    } else {
        index + 1
    };
    flags.drain(index..end);
}

/// Profile location for a directory. Stable for a given directory so plans
/// stay reproducible.
pub fn coverage_profile_path(dir: &Path) -> PathBuf {
    let mut hasher = DefaultHasher::new();
    dir.hash(&mut hasher);
    std::env::temp_dir().join(format!("go-code-cover-{:016x}.out", hasher.finish()))
}

#[cfg(test)]
#[path = "tests/command_tests.rs"]
mod tests;
