//! Shared types for stream pumping.
//!
//! These types define the contract between the pumps and the caller's
//! callbacks. They carry no I/O and are cheap to clone.

use std::fmt;

/// Which redirected child stream a pump or reader is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    Output,
    Error,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Output, StreamKind::Error];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Output => "stdout",
            StreamKind::Error => "stderr",
        }
    }
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One callback delivery from a pump.
///
/// `data` is `None` exactly once per started pump: the terminal event,
/// delivered last, after end-of-stream, cancellation, or a read fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEvent {
    pub kind: StreamKind,
    pub data: Option<String>,
}

impl LineEvent {
    pub fn line(kind: StreamKind, text: String) -> Self {
        Self {
            kind,
            data: Some(text),
        }
    }

    pub fn terminal(kind: StreamKind) -> Self {
        Self { kind, data: None }
    }

    pub fn is_terminal(&self) -> bool {
        self.data.is_none()
    }

    pub fn text(&self) -> Option<&str> {
        self.data.as_deref()
    }
}

/// User-supplied line callback. Runs on the pump's thread, never the caller's.
pub type LineCallback = Box<dyn FnMut(LineEvent) + Send + 'static>;

/// How a pump reached its terminal event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpEnd {
    EndOfStream,
    Cancelled,
    Failed,
}

/// A read failure recorded by a pump in place of an exception payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpFault {
    pub kind: StreamKind,
    pub error_kind: std::io::ErrorKind,
    pub message: String,
}

impl PumpFault {
    pub fn from_io(kind: StreamKind, err: &std::io::Error) -> Self {
        Self {
            kind,
            error_kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn callback_panicked(kind: StreamKind) -> Self {
        Self {
            kind,
            error_kind: std::io::ErrorKind::Other,
            message: "line callback panicked".to_string(),
        }
    }
}

impl fmt::Display for PumpFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pump fault: {}", self.kind, self.message)
    }
}
