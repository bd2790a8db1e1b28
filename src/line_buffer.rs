/// Splits an arbitrary chunked byte stream into `\n`-terminated lines.
///
/// Only the `\n` is removed from a delivered line. A `\r` in front of it and
/// any other control characters stay in the line untouched.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    finished: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the lines it completed, in receipt order.
    pub fn append(&mut self, chunk: &[u8]) -> Vec<String> {
        if self.finished {
            return Vec::new();
        }
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|byte| *byte == b'\n') {
            self.pending.extend_from_slice(&rest[..pos]);
            lines.push(String::from_utf8_lossy(&self.pending).into_owned());
            self.pending.clear();
            rest = &rest[pos + 1..];
        }
        self.pending.extend_from_slice(rest);
        lines
    }

    /// Ends the stream. Returns the trailing unterminated line once; every
    /// later call returns `None`.
    pub fn done(&mut self) -> Option<String> {
        if self.finished {
            return None;
        }
        self.finished = true;
        if self.pending.is_empty() {
            return None;
        }
        let last = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(last)
    }
}

#[cfg(test)]
#[path = "tests/line_buffer_tests.rs"]
mod tests;
