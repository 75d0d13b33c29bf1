//! Line-oriented, callback-driven consumption of a child process's stdout
//! and stderr.
//!
//! The crate separates pure pieces from thread and process handling:
//!
//! - **[`core`]**: decoding, line framing, the cancellation flag and the
//!   per-stream access guard. No threads, no processes.
//! - **[`io`]**: background pumps, the exit/drain synchronizer, blocking
//!   readers and the [`io::process::StreamedProcess`] facade over a
//!   [`io::host::ProcessHost`].
//!
//! ```no_run
//! use std::process::Command;
//!
//! use procstream::core::types::StreamKind;
//! use procstream::io::child::Redirects;
//! use procstream::io::config::StreamConfig;
//! use procstream::io::process::StreamedProcess;
//!
//! # fn main() -> Result<(), procstream::error::StreamError> {
//! let mut process = StreamedProcess::from_command(
//!     Command::new("ls"),
//!     Redirects::output_only(),
//!     StreamConfig::default(),
//! );
//! process.on_line(StreamKind::Output, |event| {
//!     if let Some(line) = event.text() {
//!         println!("{line}");
//!     }
//! })?;
//! process.start()?;
//! process.begin_read(StreamKind::Output)?;
//! process.wait_for_exit(None)?;
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::types::{LineEvent, StreamKind};
pub use crate::error::{StreamError, StreamResult};
