//! Trace output and diagnostic formatting.
//!
//! This module provides:
//! - The [`Trace`] sink that echoes each command before it runs
//! - Line prefixing for trace writers
//! - Renditions of commands, captured output and failed pipelines
//!
//! # Example
//!
//! ```
//! use cmdstream::output::Trace;
//!
//! let (trace, buf) = Trace::buffer("+ ");
//! trace.line("echo hello");
//! assert_eq!(buf.contents(), "+ echo hello\n");
//! ```

pub mod format;
mod trace;

pub use format::{describe_command, fmtout, render_pipeline, shell_join};
pub use trace::{PrefixWriter, Trace, TraceBuffer, DEFAULT_PREFIX};
