//! Incremental text decoding for child process pipes.
//!
//! Pipes deliver bytes at arbitrary boundaries, so a read can end in the
//! middle of a code point (or a UTF-16 code unit, or a surrogate pair). The
//! decoder carries undecoded trailing bytes until the next read completes
//! them. Malformed input decodes to U+FFFD instead of failing the stream.

use std::char::REPLACEMENT_CHARACTER;

use serde::{Deserialize, Serialize};

/// Text encoding of a redirected stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    #[default]
    #[serde(rename = "utf-8")]
    Utf8,
    #[serde(rename = "utf-16le")]
    Utf16Le,
    #[serde(rename = "utf-16be")]
    Utf16Be,
}

const BYTE_ORDER_MARKS: [(&[u8], Encoding); 3] = [
    (&[0xEF, 0xBB, 0xBF], Encoding::Utf8),
    (&[0xFF, 0xFE], Encoding::Utf16Le),
    (&[0xFE, 0xFF], Encoding::Utf16Be),
];

/// Stateful decoder fed one read at a time.
#[derive(Debug, Clone)]
pub struct Decoder {
    encoding: Encoding,
    detect_bom: bool,
    carry: Vec<u8>,
}

impl Decoder {
    /// Create a decoder for `encoding`.
    ///
    /// With `detect_bom`, a leading byte-order mark is consumed and overrides
    /// `encoding`.
    pub fn new(encoding: Encoding, detect_bom: bool) -> Self {
        Self {
            encoding,
            detect_bom,
            carry: Vec::new(),
        }
    }

    /// Encoding in effect (may change once after BOM detection).
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Decode `bytes`, appending complete characters to `out`.
    pub fn decode(&mut self, bytes: &[u8], out: &mut String) {
        self.carry.extend_from_slice(bytes);
        if !self.resolve_bom(false) {
            return;
        }
        self.decode_carry(out, false);
    }

    /// Flush at end-of-stream. Incomplete trailing bytes become U+FFFD.
    pub fn finish(&mut self, out: &mut String) {
        self.resolve_bom(true);
        self.decode_carry(out, true);
    }

    /// Returns `false` while the buffered prefix could still be a BOM.
    fn resolve_bom(&mut self, finishing: bool) -> bool {
        if !self.detect_bom {
            return true;
        }
        for (bom, encoding) in BYTE_ORDER_MARKS {
            if self.carry.starts_with(bom) {
                self.encoding = encoding;
                self.carry.drain(..bom.len());
                self.detect_bom = false;
                return true;
            }
        }
        let undecided = !finishing
            && BYTE_ORDER_MARKS
                .iter()
                .any(|(bom, _)| bom.starts_with(&self.carry));
        if undecided {
            return false;
        }
        self.detect_bom = false;
        true
    }

    fn decode_carry(&mut self, out: &mut String, finishing: bool) {
        match self.encoding {
            Encoding::Utf8 => self.decode_utf8(out, finishing),
            Encoding::Utf16Le => self.decode_utf16(out, finishing, u16::from_le_bytes),
            Encoding::Utf16Be => self.decode_utf16(out, finishing, u16::from_be_bytes),
        }
    }

    fn decode_utf8(&mut self, out: &mut String, finishing: bool) {
        let mut start = 0;
        while start < self.carry.len() {
            match std::str::from_utf8(&self.carry[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.carry.len();
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.carry[start..start + valid]) {
                        out.push_str(text);
                    }
                    start += valid;
                    match err.error_len() {
                        Some(len) => {
                            out.push(REPLACEMENT_CHARACTER);
                            start += len;
                        }
                        // Truncated sequence: wait for the rest unless the stream ended.
                        None => {
                            if finishing {
                                out.push(REPLACEMENT_CHARACTER);
                                start = self.carry.len();
                            }
                            break;
                        }
                    }
                }
            }
        }
        self.carry.drain(..start);
    }

    fn decode_utf16(&mut self, out: &mut String, finishing: bool, unit: fn([u8; 2]) -> u16) {
        let mut consumed = self.carry.len() - self.carry.len() % 2;
        let mut units: Vec<u16> = self.carry[..consumed]
            .chunks_exact(2)
            .map(|pair| unit([pair[0], pair[1]]))
            .collect();
        if !finishing && units.last().is_some_and(|u| (0xD800..=0xDBFF).contains(u)) {
            // High surrogate: its partner is in the next read.
            units.pop();
            consumed -= 2;
        }
        out.extend(
            char::decode_utf16(units).map(|c| c.unwrap_or(REPLACEMENT_CHARACTER)),
        );
        self.carry.drain(..consumed);
        if finishing && !self.carry.is_empty() {
            out.push(REPLACEMENT_CHARACTER);
            self.carry.clear();
        }
    }
}
