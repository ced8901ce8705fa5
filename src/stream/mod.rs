//! The stream abstraction.
//!
//! A [`Stream`] is one external process seen as a byte stream: reading
//! yields its standard output, writing feeds its standard input, and
//! [`Stream::close`] signals that no more input will come. Nothing above
//! this trait knows how the process is created.
//!
//! Optional behaviors are exposed as capabilities a concrete stream may
//! or may not support:
//! - [`Logger`]: the captured diagnostic (stderr) output
//! - [`Coder`]: the exit code, valid once the stream has been waited on
//! - [`Attacher`]: terminal passthrough mode
//!
//! Capabilities are probed through the `logger()`, `coder()` and
//! `attacher()` accessors, each of which answers `None` by default.

mod adapter;
mod env;
mod state;

pub use adapter::{Buffer, Reader, Writer};
pub use env::{Env, PWD};
pub use state::Lifecycle;

use std::io;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CmdStreamError, ErrorKind};
use crate::Result;

/// Label used for streams that cannot describe themselves.
pub const UNNAMED: &str = "<stream>";

/// A lazily-started, bidirectional byte stream over one process.
#[async_trait]
pub trait Stream: Send + Sync {
    /// Read standard output. `Ok(0)` is end-of-input.
    async fn read(&self, buf: &mut [u8]) -> Result<usize>;

    /// Write to standard input.
    async fn write(&self, buf: &[u8]) -> Result<usize>;

    /// Signal that no more input will be written.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    /// Human-readable rendition of the invocation.
    fn describe(&self) -> Option<String> {
        None
    }

    /// Whether a read reported end-of-input because the stream's
    /// cancellation scope fired. The exit status is then indeterminate.
    fn is_cancelled(&self) -> bool {
        false
    }

    fn logger(&self) -> Option<&dyn Logger> {
        None
    }

    fn coder(&self) -> Option<&dyn Coder> {
        None
    }

    fn attacher(&self) -> Option<&dyn Attacher> {
        None
    }
}

/// Shared handle to a stream.
pub type SharedStream = Arc<dyn Stream>;

/// Exposes captured diagnostic output.
pub trait Logger: Send + Sync {
    /// Diagnostic bytes captured so far. Complete once the stream has
    /// been waited on.
    fn log(&self) -> Vec<u8>;
}

/// Exposes the exit code of the underlying process.
pub trait Coder: Send + Sync {
    /// `None` until the stream has been waited on, and when the outcome
    /// is indeterminate (cancelled or never started).
    fn code(&self) -> Option<i32>;
}

/// Switches a stream into terminal passthrough mode.
///
/// An attached stream cannot be written to. It is read exactly once; that
/// read blocks for the whole life of the process and returns zero bytes.
#[async_trait]
pub trait Attacher: Send + Sync {
    async fn attach(&self) -> Result<()>;
}

/// Rendition of a stream for traces and diagnostics.
pub fn label(stream: &dyn Stream) -> String {
    stream.describe().unwrap_or_else(|| UNNAMED.to_string())
}

/// Read until end-of-input, appending to `out`.
///
/// Bytes read before a failure stay in `out`.
pub async fn read_to_end(stream: &dyn Stream, out: &mut Vec<u8>) -> Result<usize> {
    let mut buf = vec![0u8; 8192];
    let mut total = 0;
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        out.extend_from_slice(&buf[..n]);
        total += n;
    }
}

/// Write the whole buffer.
pub async fn write_all(stream: &dyn Stream, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = stream.write(buf).await?;
        if n == 0 {
            return Err(CmdStreamError::new(ErrorKind::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "failed to write whole buffer",
            ))));
        }
        buf = &buf[n..];
    }
    Ok(())
}
