//! Error types for cmdstream.
//!
//! Every failure surfaces as a [`CmdStreamError`]: an [`ErrorKind`] naming
//! the cause, plus whatever diagnostic context was available where it
//! happened (the command rendition, captured output and diagnostic log,
//! exit code, and for pipelines the offset of the failing stage).

use std::fmt;
use std::io;

use thiserror::Error;

use crate::output::format::fmtout;

/// The cause of a [`CmdStreamError`].
#[derive(Error, Debug)]
pub enum ErrorKind {
    /// The process could not be created (e.g. executable not found).
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The process ran and exited with a non-zero status.
    #[error("exit status {0}")]
    Exit(i32),

    /// The process was terminated by a signal.
    #[error("terminated by signal {0}")]
    Signal(i32),

    /// Pipe read/write failure unrelated to the exit status.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The cancellation scope fired before the stream completed.
    #[error("cancelled")]
    Cancelled,

    /// Write to a stream in terminal passthrough mode.
    #[error("stream is attached to the terminal and cannot be written to")]
    Attached,

    /// Write to a read-only stream.
    #[error("stream is not writable")]
    NotWritable,

    /// Read from a write-only stream.
    #[error("stream is not readable")]
    NotReadable,

    /// A command was built from an empty argument vector.
    #[error("no command given")]
    EmptyCommand,

    /// Container runtime setup or teardown failed.
    #[error("container error: {0}")]
    Container(String),

    /// Invalid lifecycle transition attempted.
    #[error("invalid lifecycle transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: crate::stream::Lifecycle,
        to: crate::stream::Lifecycle,
    },
}

/// Main error type for cmdstream operations.
#[derive(Debug)]
pub struct CmdStreamError {
    kind: ErrorKind,
    cmd: Option<String>,
    out: String,
    log: String,
    code: Option<i32>,
    stage: Option<usize>,
}

impl CmdStreamError {
    /// Create an error with no diagnostic context.
    pub fn new(kind: ErrorKind) -> Self {
        let code = match kind {
            ErrorKind::Exit(code) => Some(code),
            ErrorKind::Signal(_) => Some(-1),
            _ => None,
        };
        Self {
            kind,
            cmd: None,
            out: String::new(),
            log: String::new(),
            code,
            stage: None,
        }
    }

    /// Attach the rendition of the command that failed.
    ///
    /// An already-attached rendition is kept: the innermost stream knows
    /// best what it was running.
    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        if self.cmd.is_none() {
            self.cmd = Some(cmd.into());
        }
        self
    }

    /// Attach captured standard output.
    pub fn with_out(mut self, out: impl Into<String>) -> Self {
        self.out = out.into();
        self
    }

    /// Attach the captured diagnostic log.
    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = log.into();
        self
    }

    /// Tag the error with the zero-based offset of the pipeline stage
    /// that produced it. `0` is the pipeline's source.
    pub fn with_stage(mut self, stage: usize) -> Self {
        self.stage = Some(stage);
        self
    }

    /// The cause of this error.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Rendition of the command that failed, if known.
    pub fn cmd(&self) -> Option<&str> {
        self.cmd.as_deref()
    }

    /// Captured standard output (may be empty).
    pub fn out(&self) -> &str {
        &self.out
    }

    /// Captured diagnostic log (may be empty).
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Exit code, if the process ran to completion.
    pub fn code(&self) -> Option<i32> {
        self.code
    }

    /// Offset of the failing pipeline stage, for pipeline errors.
    pub fn stage(&self) -> Option<usize> {
        self.stage
    }

    /// Whether the process could not be created.
    pub fn is_spawn(&self) -> bool {
        matches!(self.kind, ErrorKind::Spawn { .. } | ErrorKind::EmptyCommand)
    }

    /// Whether the executable could not be found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            &self.kind,
            ErrorKind::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound
        )
    }

    /// Whether the process ran and exited unsuccessfully.
    pub fn is_exit(&self) -> bool {
        matches!(self.kind, ErrorKind::Exit(_) | ErrorKind::Signal(_))
    }

    /// Whether the cancellation scope fired.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Render the captured output, log and exit code as a diagnostic
    /// block.
    pub fn details(&self) -> String {
        format!(
            "out:{}log:{}code: {}",
            fmtout(&self.out),
            fmtout(&self.log),
            self.code.unwrap_or(0)
        )
    }

    /// Render the error followed by its diagnostic block.
    pub fn report(&self) -> String {
        format!("{}\n{}", self, self.details())
    }
}

impl fmt::Display for CmdStreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)
    }
}

impl std::error::Error for CmdStreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.kind)
    }
}

impl From<ErrorKind> for CmdStreamError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<io::Error> for CmdStreamError {
    fn from(err: io::Error) -> Self {
        Self::new(ErrorKind::Io(err))
    }
}

/// Convenience Result type for cmdstream operations.
pub type Result<T> = std::result::Result<T, CmdStreamError>;
