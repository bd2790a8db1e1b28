use std::sync::LazyLock;

use regex::Regex;

use super::{expand_file_path, OutputProcessor, PackageDirs};
use crate::sink::LineSink;

// 1 = ok/FAIL/?, 2 = package, 3 = elapsed, (cached) or [no test files]
static PACKAGE_RESULT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(ok|FAIL|\?)[ \t]+(.+?)[ \t]+([0-9.]+s|\(cached\)|\[no test files\])")
        .expect("package result pattern is valid")
});
static INDENTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\t| {4})\S").expect("indented line pattern is valid"));

/// Holds lines until the package summary that owns them arrives, then
/// replays them with source paths made absolute.
#[derive(Debug)]
pub struct StandardOutput {
    packages: PackageDirs,
    pending: Vec<String>,
}

impl StandardOutput {
    pub fn new(packages: PackageDirs) -> Self {
        Self {
            packages,
            pending: Vec::new(),
        }
    }
}

impl OutputProcessor for StandardOutput {
    fn process_line(&mut self, line: &str, sink: &dyn LineSink) {
        self.pending.push(line.to_owned());
        let Some(captures) = PACKAGE_RESULT.captures(line) else {
            return;
        };
        let Some(base) = self.packages.base_dir(&captures[2]) else {
            return;
        };
        for pending in self.pending.drain(..) {
            if INDENTED.is_match(&pending) {
                sink.line(&expand_file_path(&pending, &base));
            } else {
                sink.line(&pending);
            }
        }
    }

    fn finish(&mut self, sink: &dyn LineSink) {
        for pending in self.pending.drain(..) {
            sink.line(&pending);
        }
    }
}
