//! Command execution.
//!
//! This module provides:
//! - [`Runner`], which turns argument vectors into streams
//! - The [`Commander`] and [`Enver`] strategy traits
//! - run/get/check entry points for single streams and pipelines
//!
//! # Example
//!
//! ```no_run
//! use cmdstream::process::local;
//!
//! # async fn demo() -> cmdstream::Result<()> {
//! let runner = local::runner();
//!
//! let result = runner.get(["echo", "hello world"]).await?;
//! assert_eq!(result.out, "hello world");
//!
//! // Clean non-zero exits are results, not errors.
//! let result = runner.check(["false"]).await?;
//! assert_eq!(result.code, 1);
//! # Ok(())
//! # }
//! ```

mod executor;
mod result;
mod runner;

pub use executor::{
    check, check_pipe, get, get_pipe, pipe, pipeline_labels, render_failure,
    render_pipeline_failure, run,
};
pub use result::CmdResult;
pub use runner::{Commander, Enver, Runner};
