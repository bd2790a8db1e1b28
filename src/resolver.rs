use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Stdio};

use indexmap::IndexMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::command::RunRequest;
use crate::reconcile::PackageDirs;

const MODULE_MARKER: &str = "go.mod";
const RECURSIVE_TARGET: &str = "./...";

/// Import path to absolute package directory, in `go list` order.
pub type PackageMap = IndexMap<String, PathBuf>;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed ({status}): {stderr}")]
    Failed {
        command: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// Answers package questions about a directory, normally by asking `go list`.
pub trait PackageQuery: Send + Sync {
    fn current_package(&self, dir: &Path) -> Result<String, QueryError>;
    fn non_vendor_packages(&self, dir: &Path, recursive: bool) -> Result<PackageMap, QueryError>;
}

pub struct GoList {
    go: PathBuf,
    env: BTreeMap<String, String>,
}

impl GoList {
    pub fn new(go: PathBuf, env: BTreeMap<String, String>) -> Self {
        Self { go, env }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, QueryError> {
        let command = format!("{} {}", self.go.display(), args.join(" "));
        debug!(%command, dir = %dir.display(), "querying packages");
        let output = ProcessCommand::new(&self.go)
            .args(args)
            .current_dir(dir)
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| QueryError::Launch {
                command: command.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(QueryError::Failed {
                command,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PackageQuery for GoList {
    fn current_package(&self, dir: &Path) -> Result<String, QueryError> {
        Ok(self.run(dir, &["list"])?.trim().to_owned())
    }

    fn non_vendor_packages(&self, dir: &Path, recursive: bool) -> Result<PackageMap, QueryError> {
        let pattern = if recursive { RECURSIVE_TARGET } else { "." };
        let listing = self.run(dir, &["list", "-f", "{{.ImportPath}};{{.Dir}}", pattern])?;
        Ok(parse_package_listing(&listing))
    }
}

/// Parses `ImportPath;Dir` lines, dropping vendored packages.
pub fn parse_package_listing(raw: &str) -> PackageMap {
    raw.lines()
        .filter_map(|line| line.trim().split_once(';'))
        .filter(|(import_path, dir)| !import_path.is_empty() && !dir.is_empty())
        .filter(|(import_path, _)| {
            !import_path.contains("/vendor/") && !import_path.starts_with("vendor/")
        })
        .map(|(import_path, dir)| (import_path.to_owned(), PathBuf::from(dir)))
        .collect()
}

/// What to pass to `go test` positionally, and where those packages live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunTargets {
    pub targets: Vec<String>,
    pub packages: PackageDirs,
}

pub fn resolve_targets(request: &RunRequest, query: &dyn PackageQuery) -> RunTargets {
    let workspace_root = if request.module_mode {
        None
    } else {
        current_go_workspace(&request.config.gopath_entries(), &request.dir)
    };
    let mut resolved = RunTargets {
        targets: Vec::new(),
        packages: PackageDirs {
            map: PackageMap::new(),
            workspace_root: workspace_root.clone(),
        },
    };

    if request.include_subdirectories {
        resolved.targets.push(RECURSIVE_TARGET.to_owned());
        match query.non_vendor_packages(&request.dir, true) {
            Ok(map) => resolved.packages.map = map,
            Err(error) => warn!(%error, "package map unavailable; using workspace-relative paths"),
        }
        return resolved;
    }

    let current = if request.module_mode {
        query.current_package(&request.dir).unwrap_or_else(|error| {
            warn!(%error, "could not determine current package");
            String::new()
        })
    } else {
        workspace_root
            .as_deref()
            .and_then(|root| package_path_within(root, &request.dir))
            .unwrap_or_default()
    };
    if !current.is_empty() {
        // Targeting by import path keeps symlinked directories working.
        resolved
            .packages
            .map
            .insert(current.clone(), request.dir.clone());
        resolved.targets.insert(0, current);
    }
    resolved
}

/// The longest `<gopath entry>/src` that contains `dir`.
pub fn current_go_workspace(gopath: &[PathBuf], dir: &Path) -> Option<PathBuf> {
    gopath
        .iter()
        .map(|entry| entry.join("src"))
        .filter(|workspace| dir.starts_with(workspace))
        .max_by_key(|workspace| workspace.components().count())
}

fn package_path_within(workspace: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(workspace).ok()?;
    let segments = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<String>>();
    Some(segments.join("/"))
}

/// Nearest directory at or above `dir` holding a `go.mod`.
pub fn find_module_root(dir: &Path) -> Option<PathBuf> {
    let mut current = Some(canonicalize_best_effort(dir.to_path_buf()));
    while let Some(path) = current {
        if path.join(MODULE_MARKER).is_file() {
            return Some(path);
        }
        current = path.parent().map(Path::to_path_buf);
    }
    None
}

fn canonicalize_best_effort(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

#[cfg(test)]
#[path = "tests/resolver_tests.rs"]
mod tests;
