//! Error types for the line protocol.

use thiserror::Error;

/// Errors that can occur while talking to a device.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The named port could not be opened.
    #[error("failed to open {port}: {reason}")]
    Open {
        /// Port name as given by the caller.
        port: String,
        /// Reason reported by the operating system.
        reason: String,
    },

    /// A read or write on the open transport failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No data arrived before the read timeout or transaction deadline.
    #[error("timeout waiting for response")]
    Timeout,

    /// The transport reported end of stream.
    #[error("transport closed by device")]
    Disconnected,

    /// Received bytes are not valid UTF-8.
    #[error("response is not valid text: {0}")]
    Decode(#[from] std::str::Utf8Error),

    /// A response line exceeded the configured maximum length.
    #[error("line too long: max {max} bytes, got {actual}")]
    LineTooLong { max: usize, actual: usize },

    /// A multi-line response did not end within the configured line count.
    #[error("no end-of-output marker after {max} lines")]
    TooManyLines { max: usize },

    /// The command cannot be sent as a single line.
    #[error("invalid command: {0}")]
    InvalidCommand(String),
}

impl LinkError {
    /// Whether the error happened before the transport was open.
    pub fn is_open_error(&self) -> bool {
        matches!(self, LinkError::Open { .. })
    }
}

/// Result type alias for link operations.
pub type LinkResult<T> = Result<T, LinkError>;
