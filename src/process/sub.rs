//! Commands run as arguments of another command.
//!
//! A sub-command runner prepends a fixed prefix to every argument vector,
//! so `new(["git"])` turns `command(["status"])` into `git status`.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::local;
use crate::execution::{Commander, Runner};
use crate::stream::{Env, SharedStream};

/// Wraps another Runner's commander behind an argument prefix.
pub struct SubCommander {
    runner: Runner,
    prefix: Vec<String>,
}

impl SubCommander {
    pub fn new(runner: Runner, prefix: Vec<String>) -> Self {
        Self { runner, prefix }
    }
}

#[async_trait]
impl Commander for SubCommander {
    fn command(&self, token: CancellationToken, env: &Env, args: &[String]) -> SharedStream {
        let mut full = Vec::with_capacity(self.prefix.len() + args.len());
        full.extend_from_slice(&self.prefix);
        full.extend_from_slice(args);
        self.runner.commander().command(token, env, &full)
    }
}

/// A Runner for sub-commands of a local command.
pub fn new<I, S>(prefix: I) -> Runner
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    with_runner(local::runner(), prefix)
}

/// A Runner for sub-commands of a command created by `runner`.
pub fn with_runner<I, S>(runner: Runner, prefix: I) -> Runner
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let trace = runner.trace().clone();
    let prefix = prefix.into_iter().map(Into::into).collect();
    Runner::new(Arc::new(SubCommander::new(runner, prefix))).with_trace(trace)
}
