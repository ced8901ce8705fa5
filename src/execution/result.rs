//! Execution result types.

use crate::output::fmtout;

/// Result of executing a stream or a pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CmdResult {
    /// Rendition of the stream that produced this result.
    pub cmd: String,
    /// Captured standard output, trailing newlines trimmed.
    pub out: String,
    /// Captured diagnostic output, trailing newlines trimmed.
    pub log: String,
    /// Exit code. Zero for streams that cannot report one.
    pub code: i32,
}

impl CmdResult {
    /// Create a new result for `cmd` with nothing captured.
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            ..Self::default()
        }
    }

    /// Set the captured output.
    pub fn with_out(mut self, out: impl Into<String>) -> Self {
        self.out = out.into();
        self
    }

    /// Set the captured log.
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// Set the exit code.
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = code;
        self
    }

    /// Check if the command exited zero.
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Check if the command exited non-zero.
    pub fn failed(&self) -> bool {
        !self.success()
    }

    /// Get output lines.
    pub fn output_lines(&self) -> impl Iterator<Item = &str> {
        self.out.lines()
    }

    /// Render the captured output, log and code in the diagnostic block
    /// format used by error reports.
    pub fn report(&self) -> String {
        format!(
            "out:{}log:{}code: {}",
            fmtout(&self.out),
            fmtout(&self.log),
            self.code
        )
    }
}
