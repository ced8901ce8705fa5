//! Process-creation strategies.
//!
//! Each strategy is a [`Commander`](crate::execution::Commander) behind a
//! [`Runner`](crate::execution::Runner):
//!
//! - [`local`]: native OS processes
//! - [`sub`]: commands passed as arguments to another command
//! - [`container`]: commands executed inside a running container

pub mod container;
pub mod local;
mod native;
pub mod sub;

pub use container::{ContainerCommander, ContainerStream};
pub use local::LocalCommander;
pub use native::ProcessStream;
pub use sub::SubCommander;
