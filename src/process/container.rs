//! Commands run inside a container.
//!
//! [`new`] finds a container CLI, optionally builds an image from a
//! Containerfile, and starts a long-lived container. Every command is then
//! a `container exec` into it. Closing the Runner removes the container.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{local, sub};
use crate::error::{CmdStreamError, ErrorKind};
use crate::execution::{Commander, Runner};
use crate::output::describe_command;
use crate::stream::{Attacher, Coder, Env, Logger, SharedStream, Stream, PWD};
use crate::Result;

/// Container CLIs, in order of preference.
pub const CLIS: &[&[&str]] = &[
    &["docker"],
    &["podman"],
    &["nerdctl"],
    &["lima", "nerdctl"],
];

/// Runs commands in one running container.
pub struct ContainerCommander {
    runner: Runner,
    id: String,
}

impl ContainerCommander {
    /// `runner` must create commands of the container CLI; `id` names a
    /// running container.
    pub fn new(runner: Runner, id: impl Into<String>) -> Self {
        Self {
            runner,
            id: id.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Commander for ContainerCommander {
    fn command(&self, token: CancellationToken, env: &Env, args: &[String]) -> SharedStream {
        Arc::new(ContainerStream::new(
            self.runner.clone(),
            self.id.clone(),
            token,
            env.clone(),
            args.to_vec(),
        ))
    }

    async fn close(&self) -> Result<()> {
        info!(id = %self.id, "removing container");
        self.runner
            .get(["container", "rm", "-f", self.id.as_str()])
            .await
            .map(|_| ())
    }
}

/// A command executed in a container.
///
/// The exec invocation depends on whether the stream is attached, so the
/// attached variant is created when [`Attacher::attach`] is called.
pub struct ContainerStream {
    runner: Runner,
    id: String,
    token: CancellationToken,
    env: Env,
    args: Vec<String>,
    detached: SharedStream,
    attached: OnceLock<SharedStream>,
    touched: AtomicBool,
}

impl ContainerStream {
    fn new(
        runner: Runner,
        id: String,
        token: CancellationToken,
        env: Env,
        args: Vec<String>,
    ) -> Self {
        let detached = exec(&runner, &id, &token, &env, &args, false);
        Self {
            runner,
            id,
            token,
            env,
            args,
            detached,
            attached: OnceLock::new(),
            touched: AtomicBool::new(false),
        }
    }

    fn current(&self) -> &SharedStream {
        self.attached.get().unwrap_or(&self.detached)
    }
}

/// Build the `container exec` stream for a command.
fn exec(
    runner: &Runner,
    id: &str,
    token: &CancellationToken,
    env: &Env,
    args: &[String],
    attach: bool,
) -> SharedStream {
    let interactive = if attach && std::io::stdin().is_terminal() {
        "-it"
    } else {
        "-i"
    };
    let mut cmd = vec![
        "container".to_string(),
        "exec".to_string(),
        interactive.to_string(),
    ];
    for (k, v) in env.iter().filter(|(k, _)| *k != PWD) {
        cmd.push("-e".to_string());
        cmd.push(format!("{k}={v}"));
    }
    if let Some(dir) = env.working_dir() {
        cmd.push("-w".to_string());
        cmd.push(dir.to_string());
    }
    cmd.push(id.to_string());
    cmd.extend_from_slice(args);
    runner.commander().command(token.clone(), &Env::new(), &cmd)
}

#[async_trait]
impl Stream for ContainerStream {
    async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.touched.store(true, Ordering::Release);
        self.current().read(buf).await
    }

    async fn write(&self, buf: &[u8]) -> Result<usize> {
        if self.attached.get().is_some() {
            return Err(CmdStreamError::new(ErrorKind::Attached).with_cmd(self.describe_inner()));
        }
        self.touched.store(true, Ordering::Release);
        self.detached.write(buf).await
    }

    async fn close(&self) -> Result<()> {
        self.current().close().await
    }

    fn describe(&self) -> Option<String> {
        Some(self.describe_inner())
    }

    fn is_cancelled(&self) -> bool {
        self.current().is_cancelled()
    }

    fn logger(&self) -> Option<&dyn Logger> {
        self.current().logger()
    }

    fn coder(&self) -> Option<&dyn Coder> {
        self.current().coder()
    }

    fn attacher(&self) -> Option<&dyn Attacher> {
        Some(self)
    }
}

impl ContainerStream {
    fn describe_inner(&self) -> String {
        describe_command(&self.env, &self.args)
    }
}

#[async_trait]
impl Attacher for ContainerStream {
    async fn attach(&self) -> Result<()> {
        if self.touched.load(Ordering::Acquire) {
            return Err(CmdStreamError::new(ErrorKind::Container(
                "cannot attach a started stream".to_string(),
            ))
            .with_cmd(self.describe_inner()));
        }
        let stream = self
            .attached
            .get_or_init(|| exec(&self.runner, &self.id, &self.token, &self.env, &self.args, true));
        match stream.attacher() {
            Some(attacher) => attacher.attach().await,
            None => Ok(()),
        }
    }
}

/// Start a container from `name` using local commands.
///
/// A `name` beginning with `/` or `.` is a path to a Containerfile, which
/// is built first.
pub async fn new(name: &str) -> Result<Runner> {
    with_runner(local::runner(), name).await
}

/// Start a container from `name` using commands created by `runner`.
pub async fn with_runner(runner: Runner, name: &str) -> Result<Runner> {
    let cli = detect_cli(&runner).await?;
    debug!(cli = ?cli, "found container CLI");
    let ctr = sub::with_runner(runner.clone(), cli.iter().copied());

    let image = if name.starts_with('/') || name.starts_with('.') {
        build_image(&ctr, Path::new(name)).await?
    } else {
        name.to_string()
    };

    let started = ctr
        .get(["container", "run", "--rm", "-d", "-i", image.as_str(), "cat"])
        .await
        .map_err(|e| container_error(format!("failed to start container: {e}")))?;
    info!(image = %image, id = %started.out, "container started");

    Ok(Runner::new(Arc::new(ContainerCommander::new(ctr, started.out)))
        .with_trace(runner.trace().clone()))
}

async fn detect_cli(runner: &Runner) -> Result<&'static [&'static str]> {
    for cli in CLIS {
        if runner.get(["which", cli[0]]).await.is_ok() {
            return Ok(*cli);
        }
    }
    Err(container_error("failed to find container CLI"))
}

/// Build the image for a Containerfile unless an image newer than the file
/// already exists. Returns the image tag.
async fn build_image(ctr: &Runner, rpath: &Path) -> Result<String> {
    let path = absolute(rpath).map_err(|e| {
        container_error(format!("bad Containerfile path '{}': {e}", rpath.display()))
    })?;
    let image = image_tag(&path);

    let mtime = std::fs::symlink_metadata(&path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .map_err(|e| container_error(format!("bad Containerfile '{}': {e}", path.display())))?;

    if let Ok(insp) = ctr
        .get(["image", "inspect", "--format", "{{.Created}}", image.as_str()])
        .await
    {
        if !needs_rebuild(&insp.out, mtime)? {
            debug!(image = %image, "image is newer than Containerfile");
            return Ok(image);
        }
    }

    let path_str = path.to_string_lossy().into_owned();
    let context = path
        .parent()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| ".".to_string());
    ctr.run([
        "image",
        "build",
        "--file",
        path_str.as_str(),
        "--no-cache",
        "--tag",
        image.as_str(),
        context.as_str(),
    ])
    .await
    .map_err(|e| container_error(format!("failed to build '{path_str}': {e}")))?;
    Ok(image)
}

/// Image tag for a Containerfile: the hex digest of its absolute path.
pub fn image_tag(path: &Path) -> String {
    blake3::hash(path.to_string_lossy().as_bytes())
        .to_hex()
        .to_string()
}

/// Whether an image created at `created` (RFC 3339) is stale relative to
/// a Containerfile modified at `mtime`. Compared at second granularity.
pub fn needs_rebuild(created: &str, mtime: DateTime<Utc>) -> Result<bool> {
    let ctime = DateTime::parse_from_rfc3339(created.trim()).map_err(|e| {
        container_error(format!(
            "failed to parse container created timestamp '{created}': {e}"
        ))
    })?;
    Ok(ctime.timestamp() <= mtime.timestamp())
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn container_error(msg: impl Into<String>) -> CmdStreamError {
    ErrorKind::Container(msg.into()).into()
}
