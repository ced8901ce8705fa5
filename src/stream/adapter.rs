//! Adapters from plain async I/O to the [`Stream`] interface.
//!
//! These let an arbitrary reader act as a pipeline source and an arbitrary
//! writer (or an in-memory buffer) act as a pipeline sink.

use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::trace;

use super::Stream;
use crate::error::ErrorKind;
use crate::Result;

/// Read-only stream over any [`AsyncRead`].
pub struct Reader<R> {
    inner: Mutex<R>,
    label: String,
}

impl<R: AsyncRead + Unpin + Send> Reader<R> {
    /// Create a new Reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner: Mutex::new(inner),
            label: "<reader>".to_string(),
        }
    }

    /// Set the rendition used in traces.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> Stream for Reader<R> {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        let n = inner.read(buf).await?;
        trace!("reader: read {} bytes", n);
        Ok(n)
    }

    async fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(ErrorKind::NotWritable.into())
    }

    fn describe(&self) -> Option<String> {
        Some(self.label.clone())
    }
}

/// Write-only stream over any [`AsyncWrite`].
///
/// Closing the stream shuts the writer down.
pub struct Writer<W> {
    inner: Mutex<W>,
    label: String,
}

impl<W: AsyncWrite + Unpin + Send> Writer<W> {
    /// Create a new Writer.
    pub fn new(inner: W) -> Self {
        Self {
            inner: Mutex::new(inner),
            label: "<writer>".to_string(),
        }
    }

    /// Set the rendition used in traces.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Stream for Writer<W> {
    async fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(ErrorKind::NotReadable.into())
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        inner.write_all(buf).await?;
        inner.flush().await?;
        trace!("writer: wrote {} bytes", buf.len());
        Ok(buf.len())
    }

    async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.shutdown().await?;
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(self.label.clone())
    }
}

/// In-memory sink shared between clones.
#[derive(Clone, Default)]
pub struct Buffer {
    data: Arc<StdMutex<Vec<u8>>>,
}

impl Buffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Stream for Buffer {
    async fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        Err(ErrorKind::NotReadable.into())
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        self.data
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn describe(&self) -> Option<String> {
        Some("<buffer>".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[tokio::test]
    async fn test_reader_basic() {
        let mock = tokio_test::io::Builder::new()
            .read(b"Hello, ")
            .read(b"World!")
            .build();
        let reader = Reader::new(mock);

        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Hello, ");
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"World!");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reader_error() {
        let mock = tokio_test::io::Builder::new()
            .read_error(io::Error::new(io::ErrorKind::Other, "boom"))
            .build();
        let reader = Reader::new(mock);

        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
    }

    #[tokio::test]
    async fn test_reader_not_writable() {
        let reader = Reader::new(&b"data"[..]);
        let err = reader.write(b"x").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotWritable));
    }

    #[tokio::test]
    async fn test_writer_basic() {
        let mock = tokio_test::io::Builder::new()
            .write(b"Hello")
            .write(b", World!")
            .build();
        let writer = Writer::new(mock);

        assert_eq!(writer.write(b"Hello").await.unwrap(), 5);
        assert_eq!(writer.write(b", World!").await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_writer_not_readable() {
        let writer = Writer::new(Vec::<u8>::new());
        let mut buf = [0u8; 4];
        let err = writer.read(&mut buf).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::NotReadable));
    }

    #[tokio::test]
    async fn test_buffer_clones_share_data() {
        let buf = Buffer::new();
        let other = buf.clone();
        other.write(b"shared").await.unwrap();
        assert_eq!(buf.contents(), b"shared");
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            Reader::new(&b""[..]).describe().as_deref(),
            Some("<reader>")
        );
        assert_eq!(
            Writer::new(Vec::<u8>::new())
                .with_label("<stdout>")
                .describe()
                .as_deref(),
            Some("<stdout>")
        );
    }
}
