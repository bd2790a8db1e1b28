use super::{BinaryLocator, FixedPath, SearchPath};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

fn write_executable(path: &Path) {
    fs::write(path, "#!/bin/sh\nexit 0\n").expect("write script");
    let mut perms = fs::metadata(path).expect("stat").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(path, perms).expect("chmod");
}

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

struct EnvGuard {
    original: Vec<(String, Option<String>)>,
}

impl EnvGuard {
    fn set_many(entries: &[(&str, Option<String>)]) -> Self {
        let mut original = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            original.push(((*key).to_owned(), std::env::var(key).ok()));
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
        Self { original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.original {
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
        }
    }
}

#[test]
fn search_path_finds_executables_on_path() {
    let _guard = env_lock().lock().expect("lock");
    let dir = tempfile::tempdir().expect("tempdir");
    write_executable(&dir.path().join("go"));
    let _env = EnvGuard::set_many(&[
        ("PATH", Some(dir.path().display().to_string())),
        ("GOROOT", None),
    ]);
    assert_eq!(SearchPath.locate("go"), Some(dir.path().join("go")));
}

#[test]
fn search_path_prefers_goroot_bin() {
    let _guard = env_lock().lock().expect("lock");
    let goroot = tempfile::tempdir().expect("goroot");
    let bin = goroot.path().join("bin");
    fs::create_dir_all(&bin).expect("mkdir bin");
    write_executable(&bin.join("go"));
    let other = tempfile::tempdir().expect("other");
    write_executable(&other.path().join("go"));
    let _env = EnvGuard::set_many(&[
        ("PATH", Some(other.path().display().to_string())),
        ("GOROOT", Some(goroot.path().display().to_string())),
    ]);
    assert_eq!(SearchPath.locate("go"), Some(bin.join("go")));
}

#[test]
fn search_path_skips_non_executable_files() {
    let _guard = env_lock().lock().expect("lock");
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(dir.path().join("go"), "not a program").expect("write");
    let _env = EnvGuard::set_many(&[
        ("PATH", Some(dir.path().display().to_string())),
        ("GOROOT", None),
    ]);
    assert_eq!(SearchPath.locate("go"), None);
}

#[test]
fn fixed_path_requires_an_existing_binary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let go = dir.path().join("go");
    assert_eq!(FixedPath(go.clone()).locate("go"), None);
    write_executable(&go);
    assert_eq!(FixedPath(go.clone()).locate("go"), Some(go));
    assert_eq!(FixedPath(PathBuf::from("/nope/go")).locate("go"), None);
}
