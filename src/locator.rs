use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Finds tool executables on the host.
pub trait BinaryLocator: Send + Sync {
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Looks in `$GOROOT/bin` first, then every `$PATH` entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchPath;

impl BinaryLocator for SearchPath {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let goroot_bin = std::env::var_os("GOROOT").map(|root| PathBuf::from(root).join("bin"));
        let path_dirs = std::env::var_os("PATH")
            .map(|value| std::env::split_paths(&value).collect::<Vec<PathBuf>>())
            .unwrap_or_default();
        goroot_bin
            .into_iter()
            .chain(path_dirs)
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }
}

/// Always answers with one path. Handy when the binary is configured.
#[derive(Debug, Clone)]
pub struct FixedPath(pub PathBuf);

impl BinaryLocator for FixedPath {
    fn locate(&self, _name: &str) -> Option<PathBuf> {
        is_executable(&self.0).then(|| self.0.clone())
    }
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
#[path = "tests/locator_tests.rs"]
mod tests;
