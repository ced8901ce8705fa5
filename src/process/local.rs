//! Commands on the local system.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::native::ProcessStream;
use crate::execution::{Commander, Enver, Runner};
use crate::stream::{Env, SharedStream};

/// Creates [`ProcessStream`]s for local OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCommander;

#[async_trait]
impl Commander for LocalCommander {
    fn command(&self, token: CancellationToken, env: &Env, args: &[String]) -> SharedStream {
        Arc::new(ProcessStream::new(token, env.clone(), args.to_vec()))
    }

    fn enver(&self) -> Option<&dyn Enver> {
        Some(self)
    }
}

impl Enver for LocalCommander {
    fn env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A [`Runner`] that runs commands on the local system.
pub fn runner() -> Runner {
    Runner::new(Arc::new(LocalCommander))
}
