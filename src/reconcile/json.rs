use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::trace;

use super::{expand_file_path, EventSink, GoTestEvent, OutputProcessor, PackageDirs, TestAction};
use crate::sink::LineSink;

/// Decodes `go test -json` events. Lines that are not events, such as build
/// errors from older toolchains, are relayed as they are.
pub struct JsonOutput {
    packages: PackageDirs,
    events: Option<Arc<dyn EventSink>>,
    working_dir: Option<PathBuf>,
}

impl JsonOutput {
    pub fn new(packages: PackageDirs, events: Option<Arc<dyn EventSink>>) -> Self {
        Self {
            packages,
            events,
            working_dir: None,
        }
    }

    /// Directory `go` ran in; `build-output` paths are relative to it.
    pub fn with_working_dir(mut self, dir: &Path) -> Self {
        self.working_dir = Some(dir.to_path_buf());
        self
    }
}

impl OutputProcessor for JsonOutput {
    fn process_line(&mut self, line: &str, sink: &dyn LineSink) {
        let event = match serde_json::from_str::<GoTestEvent>(line) {
            Ok(event) => event,
            Err(error) => {
                trace!(%error, "relaying non-event line");
                sink.line(line);
                return;
            }
        };
        if let Some(events) = self.events.as_ref() {
            events.event(&event);
        }
        let Some(output) = event.output.as_deref() else {
            return;
        };
        let base = match event.action {
            TestAction::Output => event
                .package
                .as_deref()
                .and_then(|package| self.packages.base_dir(package)),
            TestAction::BuildOutput => self.working_dir.clone(),
            _ => return,
        };
        match base {
            Some(base) => sink.line(expand_file_path(output, &base).trim_end()),
            None => sink.line(output.trim_end()),
        }
    }

    fn finish(&mut self, _sink: &dyn LineSink) {}
}
