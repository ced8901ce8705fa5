//! Concurrent multi-stage copy.

use std::io;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::error::CmdStreamError;
use crate::stream::{label, SharedStream, Stream};
use crate::Result;

/// Size of the buffer each copier moves bytes through.
pub const BUFFER_SIZE: usize = 32 * 1024;

/// Byte counts reported by [`copy`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Bytes delivered to the sink.
    pub written: u64,
    /// Bytes moved by every copier, summed.
    pub transferred: u64,
}

/// Copy `src` through every stream in `mid` and into `dst`.
///
/// One copier task runs per adjacent pair of the chain
/// `[src, mid.., dst]`, all concurrently, so a slow stage holds back its
/// producer instead of the engine buffering. Each copier closes its writer
/// once when it is done, whether or not the copy succeeded.
///
/// The call returns after every copier has finished. If any failed, the
/// first failure to be observed is returned, tagged with the offset of
/// the stage it was reading from (`0` is `src`); later failures are
/// dropped.
pub async fn copy(dst: SharedStream, src: SharedStream, mid: &[SharedStream]) -> Result<CopyStats> {
    let mut chain = Vec::with_capacity(mid.len() + 2);
    chain.push(src);
    chain.extend(mid.iter().cloned());
    chain.push(dst);
    let last = chain.len() - 2;

    let (count_tx, mut count_rx) = mpsc::unbounded_channel::<(usize, u64)>();
    let aggregator = tokio::spawn(async move {
        let mut stats = CopyStats::default();
        while let Some((offset, n)) = count_rx.recv().await {
            stats.transferred += n;
            if offset == last {
                stats.written += n;
            }
        }
        stats
    });

    let mut copiers = JoinSet::new();
    for (offset, pair) in chain.windows(2).enumerate() {
        let reader = Arc::clone(&pair[0]);
        let writer = Arc::clone(&pair[1]);
        let count_tx = count_tx.clone();
        copiers.spawn(async move {
            let (n, res) = copy_stage(offset, reader.as_ref(), writer.as_ref()).await;
            let _ = count_tx.send((offset, n));
            res
        });
    }
    drop(count_tx);

    let mut first: Option<CmdStreamError> = None;
    while let Some(joined) = copiers.join_next().await {
        let res = joined.unwrap_or_else(|e| {
            Err(CmdStreamError::from(io::Error::other(format!(
                "copier task failed: {e}"
            ))))
        });
        if let Err(err) = res {
            match first {
                None => first = Some(err),
                Some(_) => {
                    debug!(stage = ?err.stage(), error = %err, "discarding later pipeline error")
                }
            }
        }
    }

    let stats = aggregator
        .await
        .map_err(|e| CmdStreamError::from(io::Error::other(format!("aggregator failed: {e}"))))?;
    match first {
        Some(err) => Err(err),
        None => Ok(stats),
    }
}

async fn copy_stage(offset: usize, reader: &dyn Stream, writer: &dyn Stream) -> (u64, Result<()>) {
    let (n, copied) = copy_bytes(reader, writer).await;
    let copied = copied
        .map_err(|e| e.with_cmd(label(reader)).with_stage(offset))
        .and_then(|()| {
            if reader.is_cancelled() {
                Err(CmdStreamError::from(crate::error::ErrorKind::Cancelled)
                    .with_cmd(label(reader))
                    .with_stage(offset))
            } else {
                Ok(())
            }
        });

    let closed = writer
        .close()
        .await
        .map_err(|e| e.with_cmd(label(writer)).with_stage(offset + 1));
    trace!(offset, bytes = n, "copier finished");

    (n, copied.and(closed))
}

async fn copy_bytes(reader: &dyn Stream, writer: &dyn Stream) -> (u64, Result<()>) {
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return (total, Ok(())),
            Ok(n) => n,
            Err(e) => return (total, Err(e)),
        };
        if let Err(e) = crate::stream::write_all(writer, &buf[..n]).await {
            return (total, Err(e));
        }
        total += n as u64;
    }
}
