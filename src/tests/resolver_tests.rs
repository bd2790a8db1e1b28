use super::{
    current_go_workspace, find_module_root, parse_package_listing, resolve_targets, PackageMap,
    PackageQuery, QueryError,
};
use crate::command::RunRequest;
use crate::config::TestConfig;
use std::fs;
use std::path::{Path, PathBuf};

struct FakeQuery {
    current: Option<String>,
    packages: Option<PackageMap>,
}

impl FakeQuery {
    fn failing() -> Self {
        Self {
            current: None,
            packages: None,
        }
    }
}

fn failure() -> QueryError {
    QueryError::Launch {
        command: "go list".to_owned(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no go"),
    }
}

impl PackageQuery for FakeQuery {
    fn current_package(&self, _dir: &Path) -> Result<String, QueryError> {
        self.current.clone().ok_or_else(failure)
    }

    fn non_vendor_packages(&self, _dir: &Path, _recursive: bool) -> Result<PackageMap, QueryError> {
        self.packages.clone().ok_or_else(failure)
    }
}

fn request(dir: &str) -> RunRequest {
    RunRequest::new(dir, TestConfig::default())
}

#[test]
fn subdirectories_target_everything_and_map_packages() {
    let mut map = PackageMap::new();
    map.insert("example.com/app".to_owned(), PathBuf::from("/src/app"));
    map.insert("example.com/app/db".to_owned(), PathBuf::from("/src/app/db"));
    let query = FakeQuery {
        current: Some("ignored".to_owned()),
        packages: Some(map.clone()),
    };
    let mut req = request("/src/app");
    req.include_subdirectories = true;

    let resolved = resolve_targets(&req, &query);
    assert_eq!(resolved.targets, vec!["./...".to_owned()]);
    assert_eq!(resolved.packages.map, map);
}

#[test]
fn subdirectory_listing_failure_is_not_fatal() {
    let mut req = request("/src/app");
    req.include_subdirectories = true;
    let resolved = resolve_targets(&req, &FakeQuery::failing());
    assert_eq!(resolved.targets, vec!["./...".to_owned()]);
    assert!(resolved.packages.map.is_empty());
}

#[test]
fn module_mode_targets_the_current_package() {
    let query = FakeQuery {
        current: Some("example.com/app/api".to_owned()),
        packages: None,
    };
    let resolved = resolve_targets(&request("/src/app/api"), &query);
    assert_eq!(resolved.targets, vec!["example.com/app/api".to_owned()]);
    assert_eq!(
        resolved.packages.base_dir("example.com/app/api"),
        Some(PathBuf::from("/src/app/api"))
    );
    assert_eq!(resolved.packages.workspace_root, None);
}

#[test]
fn unknown_current_package_leaves_targets_empty() {
    let resolved = resolve_targets(&request("/src/app"), &FakeQuery::failing());
    assert!(resolved.targets.is_empty());
    assert!(resolved.packages.map.is_empty());
}

#[test]
fn legacy_mode_derives_the_package_from_gopath() {
    let mut req = request("/home/dev/go/src/github.com/acme/tool");
    req.module_mode = false;
    req.config.gopath = Some("/opt/go:/home/dev/go".to_owned());

    let resolved = resolve_targets(&req, &FakeQuery::failing());
    assert_eq!(resolved.targets, vec!["github.com/acme/tool".to_owned()]);
    assert_eq!(
        resolved.packages.workspace_root,
        Some(PathBuf::from("/home/dev/go/src"))
    );
    assert_eq!(
        resolved.packages.base_dir("github.com/acme/tool/sub"),
        Some(PathBuf::from("/home/dev/go/src/github.com/acme/tool/sub"))
    );
}

#[test]
fn longest_gopath_workspace_wins() {
    let gopath = vec![PathBuf::from("/a"), PathBuf::from("/a/src/nested")];
    assert_eq!(
        current_go_workspace(&gopath, Path::new("/a/src/nested/src/pkg")),
        Some(PathBuf::from("/a/src/nested/src"))
    );
    assert_eq!(current_go_workspace(&gopath, Path::new("/elsewhere")), None);
}

#[test]
fn package_listing_drops_vendor_and_malformed_lines() {
    let listing = "example.com/app;/src/app\n\
                   example.com/app/vendor/x/y;/src/app/vendor/x/y\n\
                   vendor/golang.org/x/net;/goroot/src/vendor/golang.org/x/net\n\
                   garbage line\n\
                   example.com/app/db;/src/app/db\n";
    let map = parse_package_listing(listing);
    assert_eq!(
        map.keys().map(String::as_str).collect::<Vec<&str>>(),
        vec!["example.com/app", "example.com/app/db"]
    );
}

#[test]
fn module_root_is_the_nearest_go_mod() {
    let base = tempfile::tempdir().expect("tempdir");
    let module = base.path().join("svc");
    let nested = module.join("internal/store");
    fs::create_dir_all(&nested).expect("mkdir");
    fs::write(module.join("go.mod"), "module example.com/svc\n").expect("write go.mod");

    let expected = fs::canonicalize(&module).expect("canonicalize");
    assert_eq!(find_module_root(&nested), Some(expected));
}

#[test]
fn no_go_mod_means_no_module_root() {
    let base = tempfile::tempdir().expect("tempdir");
    // A go.mod above the temp dir would make this ambiguous; only check
    // the answer is not inside the temp dir.
    let found = find_module_root(base.path());
    let canonical = fs::canonicalize(base.path()).expect("canonicalize");
    assert!(found.map_or(true, |root| !root.starts_with(&canonical)));
}
