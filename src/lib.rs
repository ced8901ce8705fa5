//! # cmdstream
//!
//! Treat external processes as lazily-started byte streams and chain them
//! into pipelines.
//!
//! A [`Stream`](stream::Stream) is one process invocation: reading yields
//! its standard output, writing feeds its standard input. The process is
//! created on first I/O and reaped when its output is exhausted, and its
//! diagnostic output and exit code are captured along the way.
//!
//! ## Features
//!
//! - **Lazy lifecycle**: start and wait each run once, however many tasks
//!   share the stream
//! - **Pipelines**: any number of stages copied concurrently, with
//!   failures attributed to the stage that produced them
//! - **Pluggable strategies**: local processes, sub-commands of another
//!   tool, or commands inside a container
//! - **Cancellation**: every read races a `CancellationToken`
//!
//! ## Quick Start
//!
//! ```no_run
//! use cmdstream::process::local;
//!
//! #[tokio::main]
//! async fn main() -> cmdstream::Result<()> {
//!     cmdstream::logging::try_init().ok();
//!
//!     let runner = local::runner();
//!     let result = runner.get(["echo", "hello world"]).await?;
//!     assert_eq!(result.out, "hello world");
//!
//!     let upper = runner
//!         .get_pipe(runner.command(["echo", "a"]), &[runner.command(["tr", "a-z", "A-Z"])])
//!         .await?;
//!     assert_eq!(upper.out, "A");
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod execution;
pub mod logging;
pub mod output;
pub mod pipe;
pub mod process;
pub mod stream;

// Re-export commonly used types
pub use error::{CmdStreamError, ErrorKind, Result};
pub use execution::{CmdResult, Commander, Enver, Runner};
pub use output::Trace;
pub use pipe::{copy, CopyStats};
pub use process::{ContainerCommander, LocalCommander, ProcessStream, SubCommander};
pub use stream::{
    Attacher, Buffer, Coder, Env, Lifecycle, Logger, Reader, SharedStream, Stream, Writer,
};
