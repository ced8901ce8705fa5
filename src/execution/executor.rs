//! Execution entry points for single streams and pipelines.
//!
//! Every entry point writes one trace line before any I/O happens. A read
//! that ended because the cancellation scope fired is reported as
//! [`ErrorKind::Cancelled`], never as a completed run.

use std::sync::Arc;

use tracing::{debug, info};

use super::result::CmdResult;
use crate::error::{CmdStreamError, ErrorKind};
use crate::output::format::trim_output;
use crate::output::{render_pipeline, Trace};
use crate::pipe::{copy, BUFFER_SIZE};
use crate::stream::{label, read_to_end, write_all, Buffer, SharedStream, Stream, Writer, UNNAMED};
use crate::Result;

/// Run a stream, passing its I/O through to the terminal.
///
/// Streams that support attaching are attached; others are copied to
/// standard output and their captured log is written to standard error
/// afterwards.
pub async fn run(stream: SharedStream, trace: &Trace) -> Result<()> {
    let cmd = label(stream.as_ref());
    trace.line(&cmd);

    let res = match stream.attacher() {
        Some(attacher) => match attacher.attach().await {
            Ok(()) => {
                let mut buf = [0u8; 0];
                stream.read(&mut buf).await.map(|_| ())
            }
            Err(err) => Err(err),
        },
        None => {
            let stdout = Writer::new(tokio::io::stdout()).with_label("<stdout>");
            let res = forward(stream.as_ref(), &stdout).await;
            if let Some(logger) = stream.logger() {
                let log = logger.log();
                if !log.is_empty() {
                    let stderr = Writer::new(tokio::io::stderr()).with_label("<stderr>");
                    write_all(&stderr, &log).await?;
                }
            }
            res
        }
    };

    let res = res.and_then(|()| cancelled(stream.as_ref()));
    finish(&cmd, res.map_err(|e| e.with_cmd(&cmd)))
}

/// Execute a stream and capture its output.
///
/// Fails if the process could not be run or exited unsuccessfully. The
/// error then carries whatever output, log and exit code were captured.
pub async fn get(stream: SharedStream, trace: &Trace) -> Result<CmdResult> {
    let cmd = label(stream.as_ref());
    trace.line(&cmd);

    let mut out = Vec::new();
    let res = read_to_end(stream.as_ref(), &mut out)
        .await
        .and_then(|_| cancelled(stream.as_ref()));
    let result = collect(stream.as_ref(), cmd, &out);

    match res {
        Ok(()) => {
            debug!(cmd = %result.cmd, code = result.code, "command finished");
            Ok(result)
        }
        Err(err) => {
            let err = err
                .with_cmd(&result.cmd)
                .with_out(result.out)
                .with_log(result.log);
            info!(cmd = %result.cmd, error = %err, "command failed");
            Err(err)
        }
    }
}

/// Execute a stream and capture its output, treating a clean non-zero
/// exit as a result rather than an error.
pub async fn check(stream: SharedStream, trace: &Trace) -> Result<CmdResult> {
    get(stream, trace).await.or_else(exit_as_result)
}

/// Chain `src` through `stages` to standard output.
pub async fn pipe(src: SharedStream, stages: &[SharedStream], trace: &Trace) -> Result<()> {
    trace.pipeline(&pipeline_labels(&src, stages));
    let stdout: SharedStream = Arc::new(Writer::new(tokio::io::stdout()).with_label("<stdout>"));
    let stats = copy(stdout, src, stages).await?;
    debug!(written = stats.written, "pipeline finished");
    Ok(())
}

/// Chain `src` through `stages` and capture the final output.
///
/// The log and exit code of the result are those of the last stage.
pub async fn get_pipe(
    src: SharedStream,
    stages: &[SharedStream],
    trace: &Trace,
) -> Result<CmdResult> {
    trace.pipeline(&pipeline_labels(&src, stages));

    let out = Buffer::new();
    let res = copy(Arc::new(out.clone()), Arc::clone(&src), stages).await;
    let last = stages.last().unwrap_or(&src);
    let result = collect(last.as_ref(), label(last.as_ref()), &out.contents());

    match res {
        Ok(_) => Ok(result),
        Err(err) => {
            info!(stage = ?err.stage(), error = %err, "pipeline failed");
            Err(err.with_out(result.out))
        }
    }
}

/// Like [`get_pipe`], but a clean non-zero exit of the failing stage is
/// returned as a result carrying that stage's code.
pub async fn check_pipe(
    src: SharedStream,
    stages: &[SharedStream],
    trace: &Trace,
) -> Result<CmdResult> {
    get_pipe(src, stages, trace).await.or_else(exit_as_result)
}

/// Render a failed single-stream execution for script-style aborts.
pub fn render_failure(err: &CmdStreamError) -> String {
    let mut ret = format!("exec failed: {}: {}", err.cmd().unwrap_or(UNNAMED), err);
    if !err.log().is_empty() {
        ret.push_str("\n\nstderr:\n---\n");
        ret.push_str(err.log());
        ret.push_str("\n---");
    }
    ret
}

/// Render a failed pipeline for script-style aborts: the chain with the
/// error marked after the failing stage, followed by the captured output
/// block.
pub fn render_pipeline_failure(stages: &[String], err: &CmdStreamError) -> String {
    let msg = err.to_string();
    let chain = render_pipeline(stages, err.stage().map(|s| (s, msg.as_str())));
    format!("pipeline failed:\n{}\n{}", chain, err.details())
}

/// Renditions of every stage of a pipeline, source first.
pub fn pipeline_labels(src: &SharedStream, stages: &[SharedStream]) -> Vec<String> {
    std::iter::once(src)
        .chain(stages)
        .map(|s| label(s.as_ref()))
        .collect()
}

fn collect(stream: &dyn Stream, cmd: String, out: &[u8]) -> CmdResult {
    CmdResult {
        cmd,
        out: trim_output(out),
        log: stream
            .logger()
            .map(|l| trim_output(&l.log()))
            .unwrap_or_default(),
        code: stream.coder().and_then(|c| c.code()).unwrap_or(0),
    }
}

fn exit_as_result(err: CmdStreamError) -> Result<CmdResult> {
    match err.kind() {
        ErrorKind::Exit(code) => Ok(CmdResult {
            cmd: err.cmd().unwrap_or(UNNAMED).to_string(),
            out: err.out().to_string(),
            log: err.log().to_string(),
            code: *code,
        }),
        _ => Err(err),
    }
}

fn cancelled(stream: &dyn Stream) -> Result<()> {
    if stream.is_cancelled() {
        return Err(ErrorKind::Cancelled.into());
    }
    Ok(())
}

fn finish(cmd: &str, res: Result<()>) -> Result<()> {
    match &res {
        Ok(()) => debug!(cmd, "command finished"),
        Err(err) => info!(cmd, error = %err, "command failed"),
    }
    res
}

async fn forward(stream: &dyn Stream, sink: &dyn Stream) -> Result<()> {
    let mut buf = vec![0u8; BUFFER_SIZE];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        write_all(sink, &buf[..n]).await?;
    }
}
