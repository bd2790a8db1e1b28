//! Relays `go test` stdout to a [`LineSink`], rewriting source locations
//! that the runner prints relative to each package directory.
//!
//! Two strategies exist, picked once per run: [`StandardOutput`] for the
//! human-readable format and [`JsonOutput`] for `go test -json` events.

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::resolver::PackageMap;
use crate::sink::LineSink;

mod json;
mod standard;

pub use json::JsonOutput;
pub use standard::StandardOutput;

static SOURCE_LOCATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\S.*?\.go):(\d+):").expect("source location pattern is valid")
});

/// One record of the `go test -json` stream.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct GoTestEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub action: TestAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package: Option<String>,
    /// Set on build events instead of `Package`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TestAction {
    Start,
    Run,
    Pause,
    Cont,
    Pass,
    Bench,
    Fail,
    Output,
    Skip,
    #[serde(rename = "build-output")]
    BuildOutput,
    #[serde(rename = "build-fail")]
    BuildFail,
    #[serde(other)]
    Unknown,
}

/// Receives every decoded event of a JSON-mode run, whatever its action.
pub trait EventSink: Send + Sync {
    fn event(&self, event: &GoTestEvent);
}

impl<F> EventSink for F
where
    F: Fn(&GoTestEvent) + Send + Sync,
{
    fn event(&self, event: &GoTestEvent) {
        self(event)
    }
}

/// Where the packages of a run live on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageDirs {
    pub map: PackageMap,
    /// `$GOPATH/src` of a legacy workspace, used when a package is not mapped.
    pub workspace_root: Option<PathBuf>,
}

impl PackageDirs {
    pub fn base_dir(&self, package: &str) -> Option<PathBuf> {
        if let Some(dir) = self.map.get(package) {
            return Some(dir.clone());
        }
        self.workspace_root.as_ref().map(|root| {
            package
                .split('/')
                .filter(|segment| !segment.is_empty())
                .fold(root.clone(), |dir, segment| dir.join(segment))
        })
    }
}

/// A line-processing strategy for the stdout of one run.
pub trait OutputProcessor: Send {
    fn process_line(&mut self, line: &str, sink: &dyn LineSink);

    /// Called once after the last line; flushes whatever is still held.
    fn finish(&mut self, sink: &dyn LineSink);
}

pub fn output_processor(
    json_mode: bool,
    packages: PackageDirs,
    working_dir: &Path,
    events: Option<Arc<dyn EventSink>>,
) -> Box<dyn OutputProcessor> {
    if json_mode {
        Box::new(JsonOutput::new(packages, events).with_working_dir(working_dir))
    } else {
        Box::new(StandardOutput::new(packages))
    }
}

/// Rewrites `file.go:LINE:` prefixes so relative paths become `base/file.go`.
/// Already absolute paths are left alone and a leading `./` is dropped.
pub fn expand_file_path(output: &str, base: &Path) -> String {
    output
        .split('\n')
        .map(|line| {
            let Some(path) = SOURCE_LOCATION
                .captures(line)
                .and_then(|captures| captures.get(1))
            else {
                return line.to_owned();
            };
            let relative = Path::new(path.as_str());
            if relative.is_absolute() {
                return line.to_owned();
            }
            let relative = relative.strip_prefix(".").unwrap_or(relative);
            format!(
                "{}{}{}",
                &line[..path.start()],
                base.join(relative).display(),
                &line[path.end()..]
            )
        })
        .collect::<Vec<String>>()
        .join("\n")
}

#[cfg(test)]
#[path = "../tests/reconcile_tests.rs"]
mod tests;
