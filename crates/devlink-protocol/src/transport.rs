//! Byte-stream transports the client can drive.

use std::io::{self, Read, Write};
use std::time::Duration;

/// A blocking byte stream to a device.
///
/// The timeout and discard hooks default to no-ops, for streams with no
/// receive buffer of their own.
pub trait Transport: Read + Write {
    /// Current per-read timeout, if the transport has one.
    fn read_timeout(&self) -> Option<Duration> {
        None
    }

    /// Change how long a single read may block.
    fn set_read_timeout(&mut self, _timeout: Duration) -> io::Result<()> {
        Ok(())
    }

    /// Drop bytes that were received but not yet read.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}
