//! Line framing over an incrementally decoded byte stream.

use std::io::{self, Read};

use crate::core::encoding::{Decoder, Encoding};

pub const DEFAULT_READ_BUFFER_BYTES: usize = 4096;

/// Decoding and buffering choices for one stream, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramerOptions {
    pub encoding: Encoding,
    pub detect_bom: bool,
    pub read_buffer_bytes: usize,
}

impl Default for FramerOptions {
    fn default() -> Self {
        Self {
            encoding: Encoding::Utf8,
            detect_bom: true,
            read_buffer_bytes: DEFAULT_READ_BUFFER_BYTES,
        }
    }
}

impl FramerOptions {
    pub fn framer<R: Read>(&self, reader: R) -> LineFramer<R> {
        LineFramer::with_buffer_size(
            reader,
            Decoder::new(self.encoding, self.detect_bom),
            self.read_buffer_bytes,
        )
    }
}

/// Splits a byte stream into lines terminated by `\n`, stripping one
/// preceding `\r`.
///
/// Lines are produced lazily, one read at a time. Unterminated trailing text
/// is returned as a final line at end-of-stream; a stream ending right after
/// a terminator produces no extra empty line. Line length is unbounded.
pub struct LineFramer<R> {
    reader: R,
    decoder: Decoder,
    buf: Vec<u8>,
    pending: String,
    // Start of the unconsumed text in `pending`.
    consumed: usize,
    // `pending[consumed..scanned]` is known to hold no '\n'.
    scanned: usize,
    eof: bool,
}

impl<R: Read> LineFramer<R> {
    pub fn new(reader: R, decoder: Decoder) -> Self {
        Self::with_buffer_size(reader, decoder, DEFAULT_READ_BUFFER_BYTES)
    }

    pub fn with_buffer_size(reader: R, decoder: Decoder, read_buffer_bytes: usize) -> Self {
        Self {
            reader,
            decoder,
            buf: vec![0; read_buffer_bytes.max(1)],
            pending: String::new(),
            consumed: 0,
            scanned: 0,
            eof: false,
        }
    }

    /// Next complete line, or `None` once the stream is exhausted.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }
            if self.eof {
                if self.is_eof() {
                    return Ok(None);
                }
                let mut line = self.take_rest();
                strip_cr(&mut line);
                return Ok(Some(line));
            }
            self.fill()?;
        }
    }

    /// Decode everything left in the stream without framing it.
    pub fn read_remaining(&mut self) -> io::Result<String> {
        while !self.eof {
            self.fill()?;
        }
        Ok(self.take_rest())
    }

    pub fn is_eof(&self) -> bool {
        self.eof && self.consumed == self.pending.len()
    }

    /// Give back the underlying reader, dropping any buffered text.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn take_line(&mut self) -> Option<String> {
        let idx = self.scanned + self.pending[self.scanned..].find('\n')?;
        let mut line = self.pending[self.consumed..idx].to_owned();
        strip_cr(&mut line);
        self.consumed = idx + 1;
        self.scanned = self.consumed;
        Some(line)
    }

    fn take_rest(&mut self) -> String {
        let rest = if self.consumed == 0 {
            std::mem::take(&mut self.pending)
        } else {
            self.pending[self.consumed..].to_owned()
        };
        self.pending.clear();
        self.consumed = 0;
        self.scanned = 0;
        rest
    }

    fn fill(&mut self) -> io::Result<()> {
        // Drop consumed lines before appending.
        self.pending.drain(..self.consumed);
        self.consumed = 0;
        self.scanned = self.pending.len();
        let n = loop {
            match self.reader.read(&mut self.buf) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        if n == 0 {
            self.decoder.finish(&mut self.pending);
            self.eof = true;
        } else {
            self.decoder.decode(&self.buf[..n], &mut self.pending);
        }
        Ok(())
    }
}

impl<R: Read> Iterator for LineFramer<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_line().transpose()
    }
}

fn strip_cr(line: &mut String) {
    if line.ends_with('\r') {
        line.pop();
    }
}
