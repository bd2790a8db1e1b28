use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::sink::LineSink;

#[derive(Debug, Error)]
pub enum CoverageError {
    #[error("failed to read coverage profile {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed coverage profile line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

/// Consumes the profile written by a `-coverprofile` run.
pub trait CoverageApplier: Send + Sync {
    fn apply(&self, profile: &Path, root: &Path) -> Result<(), CoverageError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoCoverage;

impl CoverageApplier for NoCoverage {
    fn apply(&self, _profile: &Path, _root: &Path) -> Result<(), CoverageError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileCoverage {
    pub statements: u64,
    pub covered: u64,
}

impl FileCoverage {
    pub fn percent(&self) -> f64 {
        if self.statements == 0 {
            return 0.0;
        }
        self.covered as f64 * 100.0 / self.statements as f64
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoverProfile {
    pub mode: String,
    pub files: IndexMap<String, FileCoverage>,
}

impl CoverProfile {
    pub fn total(&self) -> FileCoverage {
        self.files
            .values()
            .fold(FileCoverage::default(), |total, file| FileCoverage {
                statements: total.statements + file.statements,
                covered: total.covered + file.covered,
            })
    }
}

/// Parses the text format: a `mode:` header, then
/// `file.go:startLine.startCol,endLine.endCol numStmts count` per block.
pub fn parse_profile(raw: &str) -> Result<CoverProfile, CoverageError> {
    let mut profile = CoverProfile::default();
    for (index, line) in raw.lines().enumerate() {
        let number = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(mode) = line.strip_prefix("mode:") {
            profile.mode = mode.trim().to_owned();
            continue;
        }
        let fields = line.split_whitespace().collect::<Vec<&str>>();
        let [location, statements, count] = fields[..] else {
            return Err(CoverageError::Parse {
                line: number,
                reason: format!("expected 3 fields, found {}", fields.len()),
            });
        };
        let Some((file, _)) = location.rsplit_once(':') else {
            return Err(CoverageError::Parse {
                line: number,
                reason: format!("missing block position in `{location}`"),
            });
        };
        let statements = statements.parse::<u64>().map_err(|error| CoverageError::Parse {
            line: number,
            reason: format!("statement count: {error}"),
        })?;
        let count = count.parse::<u64>().map_err(|error| CoverageError::Parse {
            line: number,
            reason: format!("hit count: {error}"),
        })?;
        let entry = profile.files.entry(file.to_owned()).or_default();
        entry.statements += statements;
        if count > 0 {
            entry.covered += statements;
        }
    }
    Ok(profile)
}

/// Writes per-file and total statement coverage to a line sink.
pub struct CoverageSummary {
    sink: Arc<dyn LineSink>,
}

impl CoverageSummary {
    pub fn new(sink: Arc<dyn LineSink>) -> Self {
        Self { sink }
    }
}

impl CoverageApplier for CoverageSummary {
    fn apply(&self, profile: &Path, _root: &Path) -> Result<(), CoverageError> {
        let raw = fs::read_to_string(profile).map_err(|source| CoverageError::Read {
            path: profile.to_path_buf(),
            source,
        })?;
        let parsed = parse_profile(&raw)?;
        for (file, coverage) in &parsed.files {
            self.sink.line(&format!(
                "{file}\t{:.1}% ({}/{})",
                coverage.percent(),
                coverage.covered,
                coverage.statements
            ));
        }
        self.sink.line(&format!(
            "coverage: {:.1}% of statements",
            parsed.total().percent()
        ));
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/coverage_tests.rs"]
mod tests;
