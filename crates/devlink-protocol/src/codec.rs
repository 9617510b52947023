//! Line-based codec for device communication.
//!
//! Responses are `\n`-terminated text lines. Commands go out as raw bytes with
//! an optional terminator, since the devices we talk to frame commands on
//! their own.

use std::fmt;
use std::str::FromStr;

use bytes::BytesMut;

use crate::error::{LinkError, LinkResult};

/// Default maximum response line length in bytes.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Line that marks the end of a multi-line response.
pub const SENTINEL: &str = ".";

/// Byte that ends a response line on the wire.
pub const LINE_DELIMITER: u8 = b'\n';

/// Bytes appended after a command on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    /// Send the command bytes only.
    #[default]
    None,
    /// Carriage return (`\r`).
    Cr,
    /// Line feed (`\n`).
    Lf,
    /// Carriage return followed by line feed.
    CrLf,
}

impl LineTerminator {
    /// The bytes written after the command.
    pub fn as_bytes(&self) -> &'static [u8] {
        match self {
            LineTerminator::None => b"",
            LineTerminator::Cr => b"\r",
            LineTerminator::Lf => b"\n",
            LineTerminator::CrLf => b"\r\n",
        }
    }

    /// Name used on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            LineTerminator::None => "none",
            LineTerminator::Cr => "cr",
            LineTerminator::Lf => "lf",
            LineTerminator::CrLf => "crlf",
        }
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LineTerminator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(LineTerminator::None),
            "cr" => Ok(LineTerminator::Cr),
            "lf" => Ok(LineTerminator::Lf),
            "crlf" => Ok(LineTerminator::CrLf),
            other => Err(format!(
                "unknown terminator '{}' (expected none, cr, lf or crlf)",
                other
            )),
        }
    }
}

/// Accumulates received bytes into response lines.
///
/// Bytes are fed one at a time so the caller never reads past the end of the
/// line it is waiting for. A complete line is decoded and returned as soon as
/// the delimiter arrives.
#[derive(Debug)]
pub struct LineCodec {
    /// Bytes of the line currently being received.
    buffer: BytesMut,
    /// Longest line accepted, excluding the delimiter.
    max_line_length: usize,
}

impl Default for LineCodec {
    fn default() -> Self {
        LineCodec::new()
    }
}

impl LineCodec {
    /// Create a codec with the default line length limit.
    pub fn new() -> Self {
        LineCodec::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a codec that rejects lines longer than `max_line_length` bytes.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        LineCodec {
            buffer: BytesMut::with_capacity(max_line_length.min(256)),
            max_line_length,
        }
    }

    /// Feed one received byte.
    ///
    /// Returns `Some(line)` when `byte` completes a line, `None` if more data
    /// is needed.
    pub fn push(&mut self, byte: u8) -> LinkResult<Option<String>> {
        if byte == LINE_DELIMITER {
            let line = self.buffer.split();
            return Self::decode_line(&line).map(Some);
        }

        if self.buffer.len() >= self.max_line_length {
            return Err(LinkError::LineTooLong {
                max: self.max_line_length,
                actual: self.buffer.len() + 1,
            });
        }

        self.buffer.extend_from_slice(&[byte]);
        Ok(None)
    }

    /// Decode raw line bytes to text and strip trailing whitespace.
    pub fn decode_line(raw: &[u8]) -> LinkResult<String> {
        let text = std::str::from_utf8(raw)?;
        Ok(text.trim_end().to_string())
    }

    /// Whether a decoded line is the end-of-output marker.
    pub fn is_sentinel(line: &str) -> bool {
        line == SENTINEL
    }

    /// Encode a command for transmission.
    pub fn encode_command(cmd: &str, terminator: LineTerminator) -> Vec<u8> {
        let suffix = terminator.as_bytes();
        let mut buf = Vec::with_capacity(cmd.len() + suffix.len());
        buf.extend_from_slice(cmd.as_bytes());
        buf.extend_from_slice(suffix);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partially received line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
