//! The pipeline engine.
//!
//! [`copy`] wires a source, any number of intermediate streams and a sink
//! together the way a shell pipeline does, with one concurrent copier per
//! link.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmdstream::pipe::copy;
//! use cmdstream::process::local;
//! use cmdstream::stream::{Buffer, Reader};
//!
//! # async fn demo() -> cmdstream::Result<()> {
//! let runner = local::runner();
//! let out = Buffer::new();
//! let stats = copy(
//!     Arc::new(out.clone()),
//!     Arc::new(Reader::new(&b"hello\n"[..])),
//!     &[runner.command(["tr", "a-z", "A-Z"])],
//! )
//! .await?;
//! assert_eq!(out.contents(), b"HELLO\n");
//! assert_eq!(stats.written, 6);
//! # Ok(())
//! # }
//! ```

mod copy;

pub use copy::{copy, CopyStats, BUFFER_SIZE};
