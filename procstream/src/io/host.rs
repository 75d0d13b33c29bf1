//! Seam between stream pumping and whatever owns the OS process.

use std::io::{self, Read};
use std::time::Duration;

use crate::core::types::StreamKind;

/// Raw byte source for one redirected stream.
pub type RawStream = Box<dyn Read + Send + 'static>;

/// Process lifecycle collaborator.
///
/// Implementations own process creation and exit-status retrieval. Stream
/// pumping only asks whether a stream was redirected, takes the raw pipe
/// once, and waits for the OS process to terminate.
pub trait ProcessHost {
    /// Create the OS process. May be called again after a previous run exited.
    fn start(&mut self) -> io::Result<()>;

    fn has_started(&self) -> bool;

    /// Whether `kind` was configured as redirected for the current run.
    fn is_redirected(&self, kind: StreamKind) -> bool;

    /// Hand over the raw pipe for `kind`. `None` if not redirected or already taken.
    fn take_raw_handle(&mut self, kind: StreamKind) -> Option<RawStream>;

    /// Block until the OS process terminates or `timeout` elapses.
    ///
    /// Returns `true` once the process has exited; `None` waits without limit.
    fn wait_for_exit(&mut self, timeout: Option<Duration>) -> io::Result<bool>;

    fn exit_code(&self) -> Option<i32>;
}
