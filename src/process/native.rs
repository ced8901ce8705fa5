//! Process streams over native OS processes.
//!
//! The process is not created until the first read or write. Start and
//! wait each happen at most once no matter how many tasks read and write
//! concurrently; every caller observes the same outcome.

use std::io;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{Mutex, OnceCell};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::error::{CmdStreamError, ErrorKind};
use crate::output::describe_command;
use crate::output::format::trim_output;
use crate::stream::{Attacher, Coder, Env, Lifecycle, Logger, Stream};
use crate::Result;

/// Why a process could not be created. Kept so every caller of start
/// gets an equivalent error.
#[derive(Debug, Clone)]
enum SpawnFailure {
    Empty,
    Io { kind: io::ErrorKind, message: String },
}

/// How a reaped process ended.
#[derive(Debug, Clone)]
enum Outcome {
    Success,
    Exit(i32),
    Signal(i32),
    Failed { kind: io::ErrorKind, message: String },
}

/// A [`Stream`] over one local OS process.
pub struct ProcessStream {
    args: Vec<String>,
    env: Env,
    token: CancellationToken,

    attached: AtomicBool,
    stdin_closed: AtomicBool,
    cancelled: AtomicBool,

    lifecycle: StdMutex<Lifecycle>,
    start_gate: Mutex<()>,
    spawn_failure: OnceLock<SpawnFailure>,
    outcome: OnceCell<Outcome>,

    child: Mutex<Option<Child>>,
    stdin: Mutex<Option<ChildStdin>>,
    stdout: Mutex<Option<ChildStdout>>,
    stderr_task: Mutex<Option<JoinHandle<io::Result<()>>>>,

    log: Arc<StdMutex<Vec<u8>>>,
    code: StdMutex<Option<i32>>,
}

impl ProcessStream {
    /// Create a stream for `args`. Nothing runs until the first I/O call.
    pub fn new(token: CancellationToken, env: Env, args: Vec<String>) -> Self {
        Self {
            args,
            env,
            token,
            attached: AtomicBool::new(false),
            stdin_closed: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            lifecycle: StdMutex::new(Lifecycle::Unstarted),
            start_gate: Mutex::new(()),
            spawn_failure: OnceLock::new(),
            outcome: OnceCell::new(),
            child: Mutex::new(None),
            stdin: Mutex::new(None),
            stdout: Mutex::new(None),
            stderr_task: Mutex::new(None),
            log: Arc::new(StdMutex::new(Vec::new())),
            code: StdMutex::new(None),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        *self.lifecycle.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn transition(&self, to: Lifecycle) -> Result<()> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .transition_to(to)
    }

    fn rendition(&self) -> String {
        describe_command(&self.env, &self.args)
    }

    fn log_bytes(&self) -> Vec<u8> {
        self.log.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn spawn_error(&self) -> CmdStreamError {
        let kind = match self.spawn_failure.get() {
            Some(SpawnFailure::Io { kind, message }) => ErrorKind::Spawn {
                program: self.args.first().cloned().unwrap_or_default(),
                source: io::Error::new(*kind, message.clone()),
            },
            Some(SpawnFailure::Empty) | None => ErrorKind::EmptyCommand,
        };
        CmdStreamError::new(kind).with_cmd(self.rendition())
    }

    fn start_result(&self) -> Option<Result<()>> {
        match self.state() {
            Lifecycle::Unstarted => None,
            Lifecycle::Failed => Some(Err(self.spawn_error())),
            Lifecycle::Started | Lifecycle::Waited => Some(Ok(())),
        }
    }

    async fn start(&self) -> Result<()> {
        if let Some(res) = self.start_result() {
            return res;
        }
        let _gate = self.start_gate.lock().await;
        // Another caller may have won the race while we were parked.
        if let Some(res) = self.start_result() {
            return res;
        }
        match self.spawn().await {
            Ok(()) => self.transition(Lifecycle::Started),
            Err(failure) => {
                let _ = self.spawn_failure.set(failure);
                self.transition(Lifecycle::Failed)?;
                Err(self.spawn_error())
            }
        }
    }

    async fn spawn(&self) -> std::result::Result<(), SpawnFailure> {
        let Some((program, rest)) = self.args.split_first() else {
            return Err(SpawnFailure::Empty);
        };

        let mut cmd = Command::new(program);
        cmd.args(rest).envs(self.env.iter()).kill_on_drop(true);
        if let Some(dir) = self.env.working_dir() {
            cmd.current_dir(dir);
        }

        let attached = self.attached.load(Ordering::Acquire);
        if attached {
            cmd.stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit());
        } else {
            let stdin = if self.stdin_closed.load(Ordering::Acquire) {
                Stdio::null()
            } else {
                Stdio::piped()
            };
            cmd.stdin(stdin)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|e| {
            debug!(cmd = %self.rendition(), error = %e, "failed to start process");
            SpawnFailure::Io {
                kind: e.kind(),
                message: e.to_string(),
            }
        })?;
        debug!(cmd = %self.rendition(), pid = ?child.id(), attached, "process started");

        *self.stdin.lock().await = child.stdin.take();
        *self.stdout.lock().await = child.stdout.take();
        if let Some(mut stderr) = child.stderr.take() {
            let log = Arc::clone(&self.log);
            *self.stderr_task.lock().await = Some(tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                loop {
                    let n = stderr.read(&mut buf).await?;
                    if n == 0 {
                        return Ok(());
                    }
                    log.lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(&buf[..n]);
                }
            }));
        }
        *self.child.lock().await = Some(child);
        Ok(())
    }

    async fn wait(&self) -> Result<()> {
        let outcome = self.outcome.get_or_init(|| self.reap()).await;
        let kind = match outcome {
            Outcome::Success => return Ok(()),
            Outcome::Exit(code) => ErrorKind::Exit(*code),
            Outcome::Signal(sig) => ErrorKind::Signal(*sig),
            Outcome::Failed { kind, message } => {
                ErrorKind::Io(io::Error::new(*kind, message.clone()))
            }
        };
        Err(CmdStreamError::new(kind)
            .with_cmd(self.rendition())
            .with_log(trim_output(&self.log_bytes())))
    }

    /// Drain the diagnostic pipe and block for process completion.
    ///
    /// Handles stay in their slots until they complete, so a reap that is
    /// abandoned by a cancelled caller leaves the process untouched.
    async fn reap(&self) -> Outcome {
        {
            let mut task = self.stderr_task.lock().await;
            if let Some(handle) = task.as_mut() {
                let drained = handle.await;
                task.take();
                let failure = match drained {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e),
                    Err(e) => Some(io::Error::other(e.to_string())),
                };
                if let Some(e) = failure {
                    warn!(cmd = %self.rendition(), error = %e, "failed to read stderr");
                    return self.finish(Outcome::Failed {
                        kind: e.kind(),
                        message: format!("failed to read stderr: {e}"),
                    });
                }
            }
        }

        let mut child = self.child.lock().await;
        let outcome = match child.as_mut() {
            None => Outcome::Success,
            Some(child) => match self.wait_child(child).await {
                Ok(status) if status.success() => Outcome::Success,
                Ok(status) => match status.code() {
                    Some(code) => Outcome::Exit(code),
                    None => Outcome::Signal(signal_of(&status)),
                },
                Err(e) => Outcome::Failed {
                    kind: e.kind(),
                    message: format!("failed to wait: {e}"),
                },
            },
        };
        child.take();
        self.finish(outcome)
    }

    /// Wait for the child, killing it if the scope fires first.
    async fn wait_child(&self, child: &mut Child) -> io::Result<ExitStatus> {
        tokio::select! {
            biased;
            status = child.wait() => status,
            _ = self.token.cancelled() => {
                if let Err(e) = child.start_kill() {
                    debug!(cmd = %self.rendition(), error = %e, "failed to kill process");
                }
                child.wait().await
            }
        }
    }

    fn finish(&self, outcome: Outcome) -> Outcome {
        let code = match &outcome {
            Outcome::Success => Some(0),
            Outcome::Exit(code) => Some(*code),
            Outcome::Signal(_) => Some(-1),
            Outcome::Failed { .. } => None,
        };
        *self.code.lock().unwrap_or_else(|e| e.into_inner()) = code;
        if let Err(e) = self.transition(Lifecycle::Waited) {
            warn!(cmd = %self.rendition(), error = %e, "unexpected lifecycle state");
        }
        debug!(cmd = %self.rendition(), ?code, "process reaped");
        outcome
    }

    /// The cancellation scope fired: stop feeding the process and give up
    /// on its exit status.
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!(cmd = %self.rendition(), "cancelled; exit status is indeterminate");
        }
        self.stdin_closed.store(true, Ordering::Release);
        if let Ok(mut stdin) = self.stdin.try_lock() {
            stdin.take();
        }
        // A reap in progress holds the child and kills it itself.
        if let Ok(mut child) = self.child.try_lock() {
            if let Some(child) = child.as_mut() {
                if let Err(e) = child.start_kill() {
                    debug!(cmd = %self.rendition(), error = %e, "failed to kill process");
                }
            }
        }
    }

    /// Wait for the process unless the scope fires first, in which case
    /// the stream is marked cancelled and reports end-of-input.
    async fn wait_or_cancel(&self) -> Result<usize> {
        let waited = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            res = self.wait() => Some(res),
        };
        match waited {
            None => {
                self.cancel();
                Ok(0)
            }
            Some(res) => res.map(|()| 0),
        }
    }
}

#[async_trait]
impl Stream for ProcessStream {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if self.token.is_cancelled() {
            self.cancel();
            return Ok(0);
        }
        self.start().await?;
        if self.attached.load(Ordering::Acquire) {
            return self.wait_or_cancel().await;
        }

        // The losing read is abandoned: its future is dropped. ChildStdout
        // reads are cancel-safe, so no output is lost by dropping it.
        let read = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            res = async {
                let mut stdout = self.stdout.lock().await;
                match stdout.as_mut() {
                    Some(stdout) => stdout.read(buf).await,
                    None => Ok(0),
                }
            } => Some(res),
        };

        match read {
            None => {
                self.cancel();
                Ok(0)
            }
            Some(Ok(0)) => self.wait_or_cancel().await,
            Some(Ok(n)) => {
                trace!("read {} bytes from {}", n, self.args[0]);
                Ok(n)
            }
            Some(Err(e)) => {
                let err = CmdStreamError::from(e).with_cmd(self.rendition());
                match self.wait_or_cancel().await {
                    Err(waited) => Err(waited),
                    Ok(_) => Err(err),
                }
            }
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.attached.load(Ordering::Acquire) {
            return Err(CmdStreamError::new(ErrorKind::Attached).with_cmd(self.rendition()));
        }
        self.start().await?;

        let written = tokio::select! {
            biased;
            _ = self.token.cancelled() => None,
            res = async {
                let mut stdin = self.stdin.lock().await;
                match stdin.as_mut() {
                    Some(stdin) => stdin.write(buf).await,
                    None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "stdin is closed")),
                }
            } => Some(res),
        };

        match written {
            None => {
                self.cancel();
                Err(CmdStreamError::new(ErrorKind::Cancelled).with_cmd(self.rendition()))
            }
            Some(Ok(n)) => Ok(n),
            Some(Err(e)) => Err(CmdStreamError::from(e).with_cmd(self.rendition())),
        }
    }

    async fn close(&self) -> Result<()> {
        self.stdin_closed.store(true, Ordering::Release);
        // Serialize with an in-flight start so a freshly spawned stdin is
        // not missed.
        let _gate = self.start_gate.lock().await;
        if let Some(mut stdin) = self.stdin.lock().await.take() {
            stdin
                .shutdown()
                .await
                .map_err(|e| CmdStreamError::from(e).with_cmd(self.rendition()))?;
        }
        trace!(cmd = %self.rendition(), "stdin closed");
        Ok(())
    }

    fn describe(&self) -> Option<String> {
        Some(self.rendition())
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn logger(&self) -> Option<&dyn Logger> {
        Some(self)
    }

    fn coder(&self) -> Option<&dyn Coder> {
        Some(self)
    }

    fn attacher(&self) -> Option<&dyn Attacher> {
        Some(self)
    }
}

impl Logger for ProcessStream {
    fn log(&self) -> Vec<u8> {
        self.log_bytes()
    }
}

impl Coder for ProcessStream {
    fn code(&self) -> Option<i32> {
        if self.is_cancelled() {
            return None;
        }
        *self.code.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Attacher for ProcessStream {
    async fn attach(&self) -> Result<()> {
        let _gate = self.start_gate.lock().await;
        if self.state().has_started() {
            return Err(CmdStreamError::new(ErrorKind::Io(io::Error::other(
                "cannot attach a started stream",
            )))
            .with_cmd(self.rendition()));
        }
        self.attached.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(unix)]
fn signal_of(status: &ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().unwrap_or(-1)
}

#[cfg(not(unix))]
fn signal_of(_status: &ExitStatus) -> i32 {
    -1
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::stream::{read_to_end, write_all};
    use std::time::Duration;

    fn stream(args: &[&str]) -> ProcessStream {
        ProcessStream::new(
            CancellationToken::new(),
            Env::new(),
            args.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[tokio::test]
    async fn test_lazy_start() {
        let s = stream(&["echo", "hi"]);
        assert_eq!(s.state(), Lifecycle::Unstarted);
        assert!(s.code().is_none());

        let mut out = Vec::new();
        read_to_end(&s, &mut out).await.unwrap();
        assert_eq!(out, b"hi\n");
        assert_eq!(s.state(), Lifecycle::Waited);
        assert_eq!(s.code(), Some(0));
    }

    #[tokio::test]
    async fn test_code_unavailable_before_completion() {
        let s = stream(&["sh", "-c", "echo first; exit 3"]);
        let mut buf = [0u8; 6];
        let n = s.read(&mut buf).await.unwrap();
        assert!(n > 0);
        assert!(s.code().is_none());

        let mut rest = Vec::new();
        let err = read_to_end(&s, &mut rest).await.unwrap_err();
        assert_eq!(err.code(), Some(3));
        assert_eq!(s.code(), Some(3));
    }

    #[tokio::test]
    async fn test_write_then_close() {
        let s = stream(&["tr", "a-z", "A-Z"]);
        write_all(&s, b"hello").await.unwrap();
        s.close().await.unwrap();

        let mut out = Vec::new();
        read_to_end(&s, &mut out).await.unwrap();
        assert_eq!(out, b"HELLO");
    }

    #[tokio::test]
    async fn test_close_before_start_gives_null_stdin() {
        let s = stream(&["cat"]);
        s.close().await.unwrap();

        let mut out = Vec::new();
        let res = tokio::time::timeout(Duration::from_secs(5), read_to_end(&s, &mut out)).await;
        assert!(res.is_ok(), "cat should see end-of-input immediately");
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_failure_is_cached() {
        let s = stream(&["this-command-does-not-exist"]);
        let mut buf = [0u8; 8];
        let first = s.read(&mut buf).await.unwrap_err();
        let second = s.write(b"x").await.unwrap_err();

        assert!(first.is_not_found());
        assert!(second.is_not_found());
        assert_eq!(s.state(), Lifecycle::Failed);
        assert!(s.code().is_none());
    }

    #[tokio::test]
    async fn test_empty_command() {
        let s = stream(&[]);
        let mut buf = [0u8; 8];
        let err = s.read(&mut buf).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::EmptyCommand));
    }

    #[tokio::test]
    async fn test_stderr_is_captured() {
        let s = stream(&["sh", "-c", "echo oops >&2; exit 2"]);
        let mut out = Vec::new();
        let err = read_to_end(&s, &mut out).await.unwrap_err();

        assert_eq!(err.log(), "oops");
        assert_eq!(s.log(), b"oops\n");
        assert!(matches!(err.kind(), ErrorKind::Exit(2)));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_read() {
        let token = CancellationToken::new();
        let s = ProcessStream::new(
            token.clone(),
            Env::new(),
            vec!["sleep".to_string(), "30".to_string()],
        );

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            canceller.cancel();
        });

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), s.read(&mut buf))
            .await
            .expect("read should be unblocked by cancellation")
            .unwrap();
        assert_eq!(n, 0);
        assert!(s.is_cancelled());
        assert!(s.code().is_none());
    }

    #[tokio::test]
    async fn test_cancel_unblocks_wait() {
        let token = CancellationToken::new();
        // Output closes immediately, so the read is parked in wait.
        let s = ProcessStream::new(
            token.clone(),
            Env::new(),
            vec!["sh".to_string(), "-c".to_string(), "exec >&-; sleep 30".to_string()],
        );

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), s.read(&mut buf))
            .await
            .expect("wait should be unblocked by cancellation")
            .unwrap();
        assert_eq!(n, 0);
        assert!(s.is_cancelled());
        assert!(s.code().is_none());
    }

    #[tokio::test]
    async fn test_attached_failure_carries_exit_status() {
        let s = stream(&["sh", "-c", "exit 3"]);
        s.attach().await.unwrap();

        let mut buf = [0u8; 0];
        let err = s.read(&mut buf).await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Exit(3)));
        assert_eq!(s.code(), Some(3));
    }

    #[tokio::test]
    async fn test_attached_stream_rejects_writes() {
        let s = stream(&["true"]);
        s.attach().await.unwrap();
        let err = s.write(b"x").await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Attached));

        let mut buf = [0u8; 0];
        assert_eq!(s.read(&mut buf).await.unwrap(), 0);
        assert_eq!(s.code(), Some(0));
    }

    #[tokio::test]
    async fn test_attach_after_start_fails() {
        let s = stream(&["true"]);
        let mut out = Vec::new();
        read_to_end(&s, &mut out).await.unwrap();
        assert!(s.attach().await.is_err());
    }

    #[tokio::test]
    async fn test_working_dir_from_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().canonicalize().unwrap();
        let mut env = Env::new();
        env.set(crate::stream::PWD, path.to_string_lossy());
        let s = ProcessStream::new(CancellationToken::new(), env, vec!["pwd".to_string()]);

        let mut out = Vec::new();
        read_to_end(&s, &mut out).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&out).trim_end(), path.to_string_lossy());
    }

    #[test]
    fn test_describe() {
        let mut env = Env::new();
        env.set("B", "2");
        env.set("A", "1");
        let s = ProcessStream::new(
            CancellationToken::new(),
            env,
            vec!["echo".to_string(), "hello world".to_string()],
        );
        assert_eq!(s.describe().as_deref(), Some("A=1 B=2 echo 'hello world'"));
    }
}
