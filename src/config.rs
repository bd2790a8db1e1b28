use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

pub const CONFIG_FILE: &str = "gotest-relay.toml";
pub const DEFAULT_TEST_TIMEOUT: &str = "30s";

static ENV_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([\w.\-]+)\s*=\s*(.*?)?\s*$").expect("env line pattern is valid")
});

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Whether a new run may overlap the ones already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Concurrency {
    #[default]
    Parallel,
    /// Starting a run first cancels every running one.
    Serial,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverMode {
    Default,
    Set,
    Count,
    Atomic,
}

impl CoverMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "default" => Some(CoverMode::Default),
            "set" => Some(CoverMode::Set),
            "count" => Some(CoverMode::Count),
            "atomic" => Some(CoverMode::Atomic),
            _ => None,
        }
    }

    /// Value for `-covermode=`, `None` when the runner default applies.
    pub fn flag_value(self) -> Option<&'static str> {
        match self {
            CoverMode::Default => None,
            CoverMode::Set => Some("set"),
            CoverMode::Count => Some("count"),
            CoverMode::Atomic => Some("atomic"),
        }
    }
}

/// Every option the runner understands, with defaults applied on load.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestConfig {
    pub test_flags: Vec<String>,
    pub build_flags: Vec<String>,
    pub test_tags: Option<String>,
    pub build_tags: Option<String>,
    pub test_timeout: String,
    pub cover_mode: String,
    pub test_env_vars: BTreeMap<String, String>,
    pub test_env_file: Option<String>,
    pub tools_env_vars: BTreeMap<String, String>,
    pub gopath: Option<String>,
    pub go_binary: Option<PathBuf>,
    pub concurrency: Concurrency,
    #[serde(skip)]
    pub workspace_folder: Option<PathBuf>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            test_flags: Vec::new(),
            build_flags: Vec::new(),
            test_tags: None,
            build_tags: None,
            test_timeout: DEFAULT_TEST_TIMEOUT.to_owned(),
            cover_mode: "default".to_owned(),
            test_env_vars: BTreeMap::new(),
            test_env_file: None,
            tools_env_vars: BTreeMap::new(),
            gopath: None,
            go_binary: None,
            concurrency: Concurrency::Parallel,
            workspace_folder: None,
        }
    }
}

impl TestConfig {
    pub fn from_toml_str(raw: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str::<TestConfig>(raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw, path)
    }

    /// Loads `explicit` when given, else `<dir>/gotest-relay.toml` when it
    /// exists, else defaults. `dir` becomes the `${workspaceFolder}`.
    pub fn discover(dir: &Path, explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let candidate = explicit
            .map(Path::to_path_buf)
            .unwrap_or_else(|| dir.join(CONFIG_FILE));
        let mut config = if explicit.is_some() || candidate.is_file() {
            debug!(path = %candidate.display(), "loading test configuration");
            Self::load(&candidate)?
        } else {
            Self::default()
        };
        config.workspace_folder = Some(dir.to_path_buf());
        Ok(config)
    }

    /// Flags used when the caller gives none: test flags, else build flags.
    pub fn default_flags(&self) -> Vec<String> {
        let source = if self.test_flags.is_empty() {
            &self.build_flags
        } else {
            &self.test_flags
        };
        source.iter().map(|flag| self.resolve_path(flag)).collect()
    }

    /// Test tags win over build tags, even when set to an empty string.
    pub fn tags(&self) -> Option<&str> {
        self.test_tags
            .as_deref()
            .or(self.build_tags.as_deref())
            .filter(|tags| !tags.trim().is_empty())
    }

    pub fn resolve_path(&self, raw: &str) -> String {
        let mut resolved = raw.to_owned();
        if let Some(folder) = self.workspace_folder.as_ref() {
            let folder = folder.display().to_string();
            resolved = resolved
                .replace("${workspaceFolder}", &folder)
                .replace("${workspaceRoot}", &folder);
        }
        if resolved == "~" || resolved.starts_with("~/") {
            if let Some(home) = dirs::home_dir() {
                resolved = format!("{}{}", home.display(), &resolved[1..]);
            }
        }
        resolved
    }

    /// GOPATH entries, from configuration, the environment, or `~/go`.
    pub fn gopath_entries(&self) -> Vec<PathBuf> {
        let raw = self
            .gopath
            .as_deref()
            .map(|gopath| self.resolve_path(gopath))
            .or_else(|| std::env::var("GOPATH").ok())
            .filter(|gopath| !gopath.is_empty());
        match raw {
            Some(raw) => std::env::split_paths(&raw).collect(),
            None => dirs::home_dir()
                .map(|home| vec![home.join("go")])
                .unwrap_or_default(),
        }
    }

    /// Process environment, overlaid with tool variables, GOPATH, the env file
    /// and finally the inline test variables. Later layers win.
    pub fn test_env(&self) -> BTreeMap<String, String> {
        let mut env = std::env::vars().collect::<BTreeMap<String, String>>();
        for (key, value) in &self.tools_env_vars {
            env.insert(key.clone(), self.resolve_path(value));
        }
        if let Some(gopath) = self.gopath.as_deref() {
            env.insert("GOPATH".to_owned(), self.resolve_path(gopath));
        }
        if let Some(file) = self.test_env_file.as_deref() {
            let path = PathBuf::from(self.resolve_path(file));
            match parse_env_file(&path) {
                Ok(file_env) => {
                    for (key, value) in file_env {
                        env.insert(key, self.resolve_path(&value));
                    }
                }
                Err(error) => warn!(%error, "ignoring test env file"),
            }
        }
        for (key, value) in &self.test_env_vars {
            env.insert(key.clone(), self.resolve_path(value));
        }
        env
    }
}

pub fn parse_env_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_env(&raw))
}

/// Parses `KEY=VALUE` lines. Lines that are not assignments, comments
/// included, are skipped.
pub fn parse_env(raw: &str) -> BTreeMap<String, String> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let mut env = BTreeMap::new();
    for line in raw.lines() {
        let Some(captures) = ENV_LINE.captures(line) else {
            continue;
        };
        let key = captures[1].to_owned();
        let mut value = captures
            .get(2)
            .map(|value| value.as_str().to_owned())
            .unwrap_or_default();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = value.replace("\\n", "\n");
        }
        let value = value
            .strip_prefix(['"', '\''])
            .unwrap_or(&value)
            .to_owned();
        let value = value
            .strip_suffix(['"', '\''])
            .unwrap_or(&value)
            .to_owned();
        env.insert(key, value);
    }
    env
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
