//! Blocking access to a redirected stream.

use std::io;

use crate::core::framer::{FramerOptions, LineFramer};
use crate::core::types::StreamKind;
use crate::io::host::RawStream;

/// Synchronous reader handed out instead of a pump.
pub struct StreamReader {
    kind: StreamKind,
    framer: LineFramer<RawStream>,
}

impl StreamReader {
    pub fn new(kind: StreamKind, raw: RawStream, options: &FramerOptions) -> Self {
        Self {
            kind,
            framer: options.framer(raw),
        }
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    /// Next line with its terminator removed; `None` at end-of-stream.
    pub fn read_line(&mut self) -> io::Result<Option<String>> {
        self.framer.next_line()
    }

    /// Remaining decoded text, terminators included.
    pub fn read_to_end(&mut self) -> io::Result<String> {
        self.framer.read_remaining()
    }

    pub fn lines(&mut self) -> &mut LineFramer<RawStream> {
        &mut self.framer
    }
}
