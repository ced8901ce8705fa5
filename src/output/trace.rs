//! Trace sink for echoing commands before they execute.
//!
//! A [`Trace`] is a cheap, clonable handle to a shared writer. It is set
//! when a [`Runner`](crate::execution::Runner) is constructed and only
//! read afterwards; derived runners share it unless replaced with
//! [`Runner::with_trace`](crate::execution::Runner::with_trace).

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::format::render_pipeline;

/// Default prefix for trace lines.
pub const DEFAULT_PREFIX: &str = "+ ";

/// Writer that prefixes every line it writes.
pub struct PrefixWriter<W: Write> {
    prefix: String,
    inner: W,
    at_line_start: bool,
}

impl<W: Write> PrefixWriter<W> {
    /// Create a new PrefixWriter.
    pub fn new(prefix: impl Into<String>, inner: W) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
            at_line_start: true,
        }
    }
}

impl<W: Write> Write for PrefixWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::with_capacity(buf.len() + self.prefix.len());
        for &b in buf {
            if self.at_line_start {
                out.extend_from_slice(self.prefix.as_bytes());
                self.at_line_start = false;
            }
            out.push(b);
            if b == b'\n' {
                self.at_line_start = true;
            }
        }
        self.inner.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// In-memory writer shared between clones; useful for capturing traces.
#[derive(Clone, Default)]
pub struct TraceBuffer(Arc<Mutex<Vec<u8>>>);

impl TraceBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(|e| e.into_inner());
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl Write for TraceBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.0.lock().unwrap_or_else(|e| e.into_inner());
        inner.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Destination for one-line command traces.
#[derive(Clone)]
pub struct Trace {
    sink: Option<Arc<Mutex<Box<dyn Write + Send>>>>,
}

impl Trace {
    /// Trace to an arbitrary writer, prefixing lines with `prefix`.
    pub fn new<W: Write + Send + 'static>(prefix: &str, writer: W) -> Self {
        Self {
            sink: Some(Arc::new(Mutex::new(Box::new(PrefixWriter::new(
                prefix, writer,
            ))))),
        }
    }

    /// Trace to standard error with the default prefix.
    pub fn stderr() -> Self {
        Self::new(DEFAULT_PREFIX, io::stderr())
    }

    /// Discard all trace output.
    pub fn discard() -> Self {
        Self { sink: None }
    }

    /// Trace into a fresh in-memory buffer.
    pub fn buffer(prefix: &str) -> (Self, TraceBuffer) {
        let buf = TraceBuffer::new();
        (Self::new(prefix, buf.clone()), buf)
    }

    /// Whether anything is written at all.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Emit a single trace line.
    pub fn line(&self, line: &str) {
        debug!(trace = %line, "executing");
        let Some(sink) = &self.sink else {
            return;
        };
        let mut w = sink.lock().unwrap_or_else(|e| e.into_inner());
        // Trace output is best effort; a broken sink never fails a command.
        let _ = writeln!(w, "{}", line.trim_end_matches('\n'));
        let _ = w.flush();
    }

    /// Emit the trace line for a pipeline.
    pub fn pipeline(&self, stages: &[String]) {
        self.line(&render_pipeline(stages, None));
    }
}

impl Default for Trace {
    fn default() -> Self {
        Self::stderr()
    }
}

impl fmt::Debug for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trace")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_writer_prefixes_each_line() {
        let buf = TraceBuffer::new();
        let mut w = PrefixWriter::new("+ ", buf.clone());
        w.write_all(b"one\ntw").unwrap();
        w.write_all(b"o\nthree\n").unwrap();
        assert_eq!(buf.contents(), "+ one\n+ two\n+ three\n");
    }

    #[test]
    fn test_trace_line() {
        let (trace, buf) = Trace::buffer("+ ");
        trace.line("echo 'hello world'\n");
        assert_eq!(buf.contents(), "+ echo 'hello world'\n");
    }

    #[test]
    fn test_trace_pipeline() {
        let (trace, buf) = Trace::buffer("> ");
        trace.pipeline(&["<stream>".to_string(), "tr a-z A-Z".to_string()]);
        assert_eq!(buf.contents(), "> <stream> | tr a-z A-Z\n");
    }

    #[test]
    fn test_discard() {
        let trace = Trace::discard();
        assert!(!trace.is_enabled());
        trace.line("nothing happens");
    }

    #[test]
    fn test_clones_share_sink() {
        let (trace, buf) = Trace::buffer("");
        let other = trace.clone();
        trace.line("a");
        other.line("b");
        assert_eq!(buf.contents(), "a\nb\n");
    }
}
