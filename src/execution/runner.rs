//! Runners: configuration-carrying stream factories.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::executor;
use super::result::CmdResult;
use crate::output::Trace;
use crate::stream::{Env, SharedStream};
use crate::Result;

/// A process-creation strategy.
///
/// Implementations must not begin execution before the first I/O call on
/// the returned stream.
#[async_trait]
pub trait Commander: Send + Sync {
    /// Create a stream for `args` in the given scope and environment.
    fn command(&self, token: CancellationToken, env: &Env, args: &[String]) -> SharedStream;

    /// Environment lookups answered without running a process.
    fn enver(&self) -> Option<&dyn Enver> {
        None
    }

    /// Release whatever the strategy holds.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Answers environment queries for a [`Commander`].
pub trait Enver: Send + Sync {
    fn env(&self, name: &str) -> Option<String>;
}

/// Turns argument vectors into streams.
///
/// A Runner is a snapshot of configuration: a cancellation scope, an
/// environment layer, a table of command names redirected to other
/// Runners, a trace sink and a [`Commander`]. The `with_*` methods return
/// new Runners that share the commander and copy everything else.
#[derive(Clone)]
pub struct Runner {
    token: CancellationToken,
    env: Env,
    commands: HashMap<String, Runner>,
    commander: Arc<dyn Commander>,
    trace: Trace,
}

impl Runner {
    /// Create a Runner over `commander` with a fresh scope, an empty
    /// environment layer and tracing to standard error.
    pub fn new(commander: Arc<dyn Commander>) -> Self {
        Self {
            token: CancellationToken::new(),
            env: Env::new(),
            commands: HashMap::new(),
            commander,
            trace: Trace::default(),
        }
    }

    /// Same Runner, different cancellation scope.
    pub fn with_context(&self, token: CancellationToken) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }

    /// Layer `vars` over this Runner's environment. `PWD` sets the
    /// working directory.
    pub fn with_env<I, K, V>(&self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut ret = self.clone();
        for (k, v) in vars {
            ret.env.set(k, v);
        }
        ret
    }

    /// Same Runner, different process-creation strategy.
    pub fn with_commander(&self, commander: Arc<dyn Commander>) -> Self {
        Self {
            commander,
            ..self.clone()
        }
    }

    /// Route commands named `name` to `runner`.
    pub fn with_command(&self, name: impl Into<String>, runner: Runner) -> Self {
        let mut ret = self.clone();
        ret.commands.insert(name.into(), runner);
        ret
    }

    /// Same Runner, different trace sink.
    pub fn with_trace(&self, trace: Trace) -> Self {
        Self {
            trace,
            ..self.clone()
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn env_vars(&self) -> &Env {
        &self.env
    }

    pub fn commander(&self) -> &Arc<dyn Commander> {
        &self.commander
    }

    pub fn trace(&self) -> &Trace {
        &self.trace
    }

    /// Create a stream for a command. Nothing runs until it is read from
    /// or written to.
    ///
    /// A redirected command is created by its target Runner, with this
    /// Runner's scope and environment layered on top.
    pub fn command<I, S>(&self, args: I) -> SharedStream
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        if let Some(target) = args.first().and_then(|name| self.commands.get(name)) {
            debug!(command = %args[0], "redirecting command");
            return target
                .with_context(self.token.clone())
                .with_env(self.env.iter())
                .command(args);
        }
        self.commander.command(self.token.clone(), &self.env, &args)
    }

    /// Run a command attached to the terminal.
    pub async fn run<I, S>(&self, args: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        executor::run(self.command(args), &self.trace).await
    }

    /// Run a command and capture its output. A non-zero exit is an error.
    pub async fn get<I, S>(&self, args: I) -> Result<CmdResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        executor::get(self.command(args), &self.trace).await
    }

    /// Run a command and capture its output. A non-zero exit is recorded
    /// in the result.
    pub async fn check<I, S>(&self, args: I) -> Result<CmdResult>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        executor::check(self.command(args), &self.trace).await
    }

    /// Chain `src` through `stages` to standard output.
    pub async fn pipe(&self, src: SharedStream, stages: &[SharedStream]) -> Result<()> {
        executor::pipe(src, stages, &self.trace).await
    }

    /// Chain `src` through `stages` and capture the output.
    pub async fn get_pipe(&self, src: SharedStream, stages: &[SharedStream]) -> Result<CmdResult> {
        executor::get_pipe(src, stages, &self.trace).await
    }

    /// Chain `src` through `stages`; a non-zero exit is recorded in the
    /// result.
    pub async fn check_pipe(
        &self,
        src: SharedStream,
        stages: &[SharedStream],
    ) -> Result<CmdResult> {
        executor::check_pipe(src, stages, &self.trace).await
    }

    /// [`run`](Self::run), panicking with a rendered diagnostic on failure.
    pub async fn must_run<I, S>(&self, args: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Err(err) = self.run(args).await {
            panic!("{}", executor::render_failure(&err));
        }
    }

    /// [`get`](Self::get), panicking with a rendered diagnostic on failure.
    pub async fn must_get<I, S>(&self, args: I) -> CmdResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get(args)
            .await
            .unwrap_or_else(|err| panic!("{}", executor::render_failure(&err)))
    }

    /// [`check`](Self::check), panicking if the command could not run.
    pub async fn must_check<I, S>(&self, args: I) -> CmdResult
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check(args)
            .await
            .unwrap_or_else(|err| panic!("{}", executor::render_failure(&err)))
    }

    pub async fn must_pipe(&self, src: SharedStream, stages: &[SharedStream]) {
        let labels = executor::pipeline_labels(&src, stages);
        if let Err(err) = self.pipe(src, stages).await {
            panic!("{}", executor::render_pipeline_failure(&labels, &err));
        }
    }

    pub async fn must_get_pipe(&self, src: SharedStream, stages: &[SharedStream]) -> CmdResult {
        let labels = executor::pipeline_labels(&src, stages);
        self.get_pipe(src, stages)
            .await
            .unwrap_or_else(|err| panic!("{}", executor::render_pipeline_failure(&labels, &err)))
    }

    pub async fn must_check_pipe(&self, src: SharedStream, stages: &[SharedStream]) -> CmdResult {
        let labels = executor::pipeline_labels(&src, stages);
        self.check_pipe(src, stages)
            .await
            .unwrap_or_else(|err| panic!("{}", executor::render_pipeline_failure(&labels, &err)))
    }

    /// Look up an environment variable as commands created by this Runner
    /// would see it.
    ///
    /// The Runner's own environment layer answers first, then the
    /// commander's [`Enver`], and finally the output of `env`.
    pub async fn env(&self, name: &str) -> Result<Option<String>> {
        if let Some(value) = self.env.get(name) {
            return Ok(Some(value.to_string()));
        }
        if let Some(enver) = self.commander.enver() {
            return Ok(enver.env(name));
        }
        let result = executor::get(self.command(["env"]), &Trace::discard()).await?;
        let value = result
            .output_lines()
            .filter_map(|line| line.split_once('='))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.to_string());
        Ok(value)
    }

    /// Close the commander.
    pub async fn close(&self) -> Result<()> {
        self.commander.close().await
    }
}

impl fmt::Debug for Runner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut commands: Vec<_> = self.commands.keys().collect();
        commands.sort();
        f.debug_struct("Runner")
            .field("env", &self.env)
            .field("commands", &commands)
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Reader;
    use std::sync::Mutex;

    /// Records every command it is asked to create and answers with the
    /// rendered invocation as output.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(Env, Vec<String>)>>,
        env: Option<&'static str>,
    }

    impl Enver for Recorder {
        fn env(&self, _name: &str) -> Option<String> {
            self.env.map(str::to_string)
        }
    }

    #[async_trait]
    impl Commander for Recorder {
        fn command(&self, _token: CancellationToken, env: &Env, args: &[String]) -> SharedStream {
            self.seen
                .lock()
                .unwrap()
                .push((env.clone(), args.to_vec()));
            let out = format!("{}\n", args.join(" "));
            Arc::new(Reader::new(std::io::Cursor::new(out.into_bytes())))
        }

        fn enver(&self) -> Option<&dyn Enver> {
            self.env.is_some().then_some(self as &dyn Enver)
        }
    }

    #[test]
    fn test_with_env_copies() {
        let base = Runner::new(Arc::new(Recorder::default())).with_env([("A", "1")]);
        let child = base.with_env([("A", "2"), ("B", "3")]);
        assert_eq!(base.env_vars().get("A"), Some("1"));
        assert_eq!(base.env_vars().get("B"), None);
        assert_eq!(child.env_vars().get("A"), Some("2"));
        assert_eq!(child.env_vars().get("B"), Some("3"));
    }

    #[tokio::test]
    async fn test_command_redirect_layers_env() {
        let target = Arc::new(Recorder::default());
        let other = Runner::new(target.clone())
            .with_trace(Trace::discard())
            .with_env([("X", "target")]);
        let runner = Runner::new(Arc::new(Recorder::default()))
            .with_trace(Trace::discard())
            .with_env([("X", "caller"), ("Y", "caller")])
            .with_command("dos2unix", other);

        let result = runner.get(["dos2unix", "file.txt"]).await.unwrap();
        assert_eq!(result.out, "dos2unix file.txt");

        let seen = target.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.get("X"), Some("caller"));
        assert_eq!(seen[0].0.get("Y"), Some("caller"));
    }

    #[tokio::test]
    async fn test_with_context_replaces_scope() {
        let runner = Runner::new(Arc::new(Recorder::default()));
        let token = CancellationToken::new();
        let child = runner.with_context(token.child_token());
        token.cancel();
        assert!(child.token().is_cancelled());
        assert!(!runner.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_env_prefers_own_layer() {
        let runner = Runner::new(Arc::new(Recorder {
            env: Some("from-enver"),
            ..Recorder::default()
        }))
        .with_env([("HOME", "/layer")]);
        assert_eq!(runner.env("HOME").await.unwrap().as_deref(), Some("/layer"));
        assert_eq!(
            runner.env("OTHER").await.unwrap().as_deref(),
            Some("from-enver")
        );
    }

    #[tokio::test]
    async fn test_runner_trace() {
        let (trace, buf) = Trace::buffer("+ ");
        let runner = Runner::new(Arc::new(Recorder::default())).with_trace(trace);
        runner.get(["echo", "hi"]).await.unwrap();
        assert_eq!(buf.contents(), "+ <reader>\n");
    }

    #[tokio::test]
    #[should_panic(expected = "pipeline failed")]
    async fn test_must_get_pipe_panics() {
        let runner = Runner::new(Arc::new(Recorder::default())).with_trace(Trace::discard());
        let src: SharedStream = Arc::new(Reader::new(&b"payload"[..]));
        // A read-only middle stage rejects the source's bytes.
        let stage: SharedStream = Arc::new(Reader::new(&b""[..]));
        runner.must_get_pipe(src, &[stage]).await;
    }

    /// Answers every command with a fixed `env`-style dump.
    struct EnvDump;

    #[async_trait]
    impl Commander for EnvDump {
        fn command(&self, _token: CancellationToken, _env: &Env, _args: &[String]) -> SharedStream {
            let out = b"HOME=/root\nEQ=a=b\nPATH=/bin:/usr/bin\n";
            Arc::new(Reader::new(&out[..]))
        }
    }

    #[tokio::test]
    async fn test_env_parses_env_command() {
        let runner = Runner::new(Arc::new(EnvDump)).with_trace(Trace::discard());
        assert_eq!(runner.env("EQ").await.unwrap().as_deref(), Some("a=b"));
        assert_eq!(
            runner.env("PATH").await.unwrap().as_deref(),
            Some("/bin:/usr/bin")
        );
        assert_eq!(runner.env("MISSING").await.unwrap(), None);
    }
}
