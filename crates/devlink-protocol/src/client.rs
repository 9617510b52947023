//! Request/response client over a byte-stream transport.
//!
//! Every exchange is one write followed by one or more line reads. The client
//! reads the transport one byte at a time and clears its line buffer at the
//! start of each exchange, so nothing carries over from one exchange to the
//! next.

use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::codec::{LineCodec, LineTerminator, MAX_LINE_LENGTH};
use crate::commands::Command;
use crate::error::{LinkError, LinkResult};
use crate::transport::Transport;

/// Limits and framing options for a [`LineClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Bytes appended after each command.
    pub terminator: LineTerminator,
    /// Most lines accepted before the sentinel in a multi-line response.
    pub max_lines: Option<usize>,
    /// Time limit for one whole exchange. Each read is cut short so the
    /// exchange never outlives it.
    pub deadline: Option<Duration>,
    /// Longest response line accepted, in bytes.
    pub max_line_length: usize,
    /// Drop received-but-unread bytes before writing each command.
    pub discard_stale_input: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            terminator: LineTerminator::None,
            max_lines: None,
            deadline: None,
            max_line_length: MAX_LINE_LENGTH,
            discard_stale_input: true,
        }
    }
}

/// Sends commands and reads line responses over a transport.
///
/// The client owns the transport for the whole session. Dropping the client
/// drops the transport, which closes a serial port.
///
/// A session can carry several exchanges. When one fails mid-line (timeout,
/// overlong line) the rest of the device's reply may still arrive; with
/// `discard_stale_input` set, whatever reached the transport's receive buffer
/// by the start of the next exchange is dropped. Bytes still in flight after
/// that point are read as part of the next reply.
#[derive(Debug)]
pub struct LineClient<T> {
    transport: T,
    config: ClientConfig,
    codec: LineCodec,
    /// Transport read timeout to restore after a deadline shortened it.
    base_timeout: Option<Duration>,
    /// Whether the transport timeout currently differs from `base_timeout`.
    timeout_shortened: bool,
}

impl<T: Transport> LineClient<T> {
    /// Create a client with default limits.
    pub fn new(transport: T) -> Self {
        LineClient::with_config(transport, ClientConfig::default())
    }

    /// Create a client with the given limits.
    pub fn with_config(transport: T, config: ClientConfig) -> Self {
        let codec = LineCodec::with_max_line_length(config.max_line_length);
        LineClient {
            transport,
            config,
            codec,
            base_timeout: None,
            timeout_shortened: false,
        }
    }

    /// Borrow the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Give the transport back, ending the session.
    pub fn into_inner(self) -> T {
        self.transport
    }

    /// Write a command and flush it to the device.
    pub fn send(&mut self, command: &Command) -> LinkResult<()> {
        command.validate()?;
        let bytes = command.encode(self.config.terminator);
        trace!(
            command = %command.to_command_string(),
            len = bytes.len(),
            "writing command"
        );
        self.transport.write_all(&bytes).map_err(io_error)?;
        self.transport.flush().map_err(io_error)?;
        Ok(())
    }

    /// Read one response line, bounded only by the transport's own timeout.
    pub fn read_line(&mut self) -> LinkResult<String> {
        self.read_line_before(None)
    }

    /// Send a command and read exactly one response line.
    ///
    /// The line may be empty if the device answers with a blank line.
    pub fn send_and_read_one(&mut self, command: &Command) -> LinkResult<String> {
        let deadline = self.begin_exchange()?;
        debug!(command = %command.to_command_string(), "single-line exchange");

        let result = self
            .send(command)
            .and_then(|()| self.read_line_before(deadline));
        self.end_exchange();

        let line = result?;
        trace!(line = %line, "response");
        Ok(line)
    }

    /// Send a command and collect every line before the sentinel.
    ///
    /// On failure the lines collected so far are discarded. Use
    /// [`send_and_stream_until_sentinel`](Self::send_and_stream_until_sentinel)
    /// to see lines as they arrive.
    pub fn send_and_collect_until_sentinel(
        &mut self,
        command: &Command,
    ) -> LinkResult<Vec<String>> {
        let mut lines = Vec::new();
        self.send_and_stream_until_sentinel(command, |line| lines.push(line.to_string()))?;
        Ok(lines)
    }

    /// Send a command and hand each line before the sentinel to `on_line`.
    ///
    /// Returns the number of lines delivered. The sentinel itself is never
    /// delivered.
    pub fn send_and_stream_until_sentinel<F>(
        &mut self,
        command: &Command,
        on_line: F,
    ) -> LinkResult<usize>
    where
        F: FnMut(&str),
    {
        let deadline = self.begin_exchange()?;
        debug!(command = %command.to_command_string(), "multi-line exchange");

        let result = self
            .send(command)
            .and_then(|()| self.stream_lines(deadline, on_line));
        self.end_exchange();
        result
    }

    fn stream_lines<F>(&mut self, deadline: Option<Instant>, mut on_line: F) -> LinkResult<usize>
    where
        F: FnMut(&str),
    {
        let mut count = 0usize;
        loop {
            let line = self.read_line_before(deadline)?;
            if LineCodec::is_sentinel(&line) {
                debug!(lines = count, "end of output");
                return Ok(count);
            }

            if let Some(max) = self.config.max_lines {
                if count >= max {
                    return Err(LinkError::TooManyLines { max });
                }
            }

            trace!(line = %line, "response");
            on_line(&line);
            count += 1;
        }
    }

    /// Reset per-exchange state and work out when the exchange must end.
    fn begin_exchange(&mut self) -> LinkResult<Option<Instant>> {
        self.codec.clear();
        if self.config.discard_stale_input {
            self.transport.discard_input().map_err(io_error)?;
        }

        let deadline = self.config.deadline.map(|d| Instant::now() + d);
        if deadline.is_some() {
            self.base_timeout = self.transport.read_timeout();
        }
        Ok(deadline)
    }

    /// Put back the transport timeout if a deadline shortened it.
    fn end_exchange(&mut self) {
        if !self.timeout_shortened {
            return;
        }
        self.timeout_shortened = false;

        if let Some(base) = self.base_timeout {
            if let Err(e) = self.transport.set_read_timeout(base) {
                warn!(error = %e, "failed to restore read timeout");
            }
        }
    }

    /// Make sure the next read cannot block past `deadline`.
    fn bound_next_read(&mut self, deadline: Instant) -> LinkResult<()> {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(LinkError::Timeout);
        }

        if let Some(base) = self.base_timeout {
            if base <= remaining {
                if self.timeout_shortened {
                    self.transport.set_read_timeout(base).map_err(io_error)?;
                    self.timeout_shortened = false;
                }
                return Ok(());
            }
        }

        self.transport.set_read_timeout(remaining).map_err(io_error)?;
        self.timeout_shortened = true;
        Ok(())
    }

    fn read_line_before(&mut self, deadline: Option<Instant>) -> LinkResult<String> {
        let mut byte = [0u8; 1];
        loop {
            if let Some(deadline) = deadline {
                self.bound_next_read(deadline)?;
            }

            match self.transport.read(&mut byte) {
                Ok(0) => return Err(LinkError::Disconnected),
                Ok(_) => {
                    if let Some(line) = self.codec.push(byte[0])? {
                        return Ok(line);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(io_error(e)),
            }
        }
    }
}

/// Map an I/O error, folding serial timeouts into [`LinkError::Timeout`].
fn io_error(e: io::Error) -> LinkError {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => LinkError::Timeout,
        _ => LinkError::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedTransport;

    fn raw(command: &str) -> Command {
        Command::Raw {
            command: command.to_string(),
        }
    }

    #[test]
    fn test_send_writes_raw_bytes_and_flushes() {
        let mut client = LineClient::new(ScriptedTransport::new());
        client.send(&Command::DumpLog).unwrap();

        assert_eq!(client.transport().written(), b"dumplog");
        assert_eq!(client.transport().flush_count(), 1);
    }

    #[test]
    fn test_send_with_terminator() {
        let config = ClientConfig {
            terminator: LineTerminator::CrLf,
            ..ClientConfig::default()
        };
        let mut client = LineClient::with_config(ScriptedTransport::new(), config);
        client.send(&raw("ver")).unwrap();

        assert_eq!(client.transport().written(), b"ver\r\n");
    }

    #[test]
    fn test_invalid_command_writes_nothing() {
        let mut client = LineClient::new(ScriptedTransport::with_lines(&["OK"]));
        let err = client.send_and_read_one(&raw("a\nb")).unwrap_err();

        assert!(matches!(err, LinkError::InvalidCommand(_)));
        assert!(client.transport().written().is_empty());
    }

    #[test]
    fn test_read_one_leaves_following_bytes_unread() {
        let transport = ScriptedTransport::new().then_bytes(b"first\nsecond\n");
        let mut client = LineClient::new(transport);

        assert_eq!(client.send_and_read_one(&raw("ver")).unwrap(), "first");
        assert_eq!(client.transport().unread_len(), "second\n".len());
    }

    #[test]
    fn test_partial_line_dropped_between_exchanges() {
        let transport = ScriptedTransport::new()
            .then_bytes(b"stale")
            .then_error(io::ErrorKind::TimedOut)
            .then_line("OK");
        let mut client = LineClient::new(transport);

        assert!(matches!(
            client.send_and_read_one(&raw("ver")),
            Err(LinkError::Timeout)
        ));
        assert_eq!(client.send_and_read_one(&raw("ver")).unwrap(), "OK");
    }

    #[test]
    fn test_interrupted_read_is_retried() {
        let transport = ScriptedTransport::new()
            .then_error(io::ErrorKind::Interrupted)
            .then_line("OK");
        let mut client = LineClient::new(transport);

        assert_eq!(client.send_and_read_one(&raw("ver")).unwrap(), "OK");
    }

    #[test]
    fn test_write_failure_is_io_error() {
        let mut client = LineClient::new(ScriptedTransport::new().failing_writes());
        let err = client.send_and_read_one(&raw("ver")).unwrap_err();

        assert!(matches!(err, LinkError::Io(ref e) if e.kind() == io::ErrorKind::BrokenPipe));
    }

    #[test]
    fn test_zero_deadline_times_out_before_reading() {
        let config = ClientConfig {
            deadline: Some(Duration::ZERO),
            ..ClientConfig::default()
        };
        let mut client = LineClient::with_config(ScriptedTransport::with_lines(&["OK"]), config);

        assert!(matches!(
            client.send_and_read_one(&raw("ver")),
            Err(LinkError::Timeout)
        ));
        assert_eq!(client.transport().unread_len(), 3);
    }

    #[test]
    fn test_into_inner_returns_transport() {
        let mut client = LineClient::new(ScriptedTransport::with_lines(&["OK"]));
        client.send_and_read_one(&raw("ver")).unwrap();

        let transport = client.into_inner();
        assert_eq!(transport.written_str(), "ver");
    }

    #[test]
    fn test_deadline_cuts_pending_read_short() {
        let transport = ScriptedTransport::new()
            .with_read_timeout(Duration::from_millis(400))
            .then_stall();
        let config = ClientConfig {
            deadline: Some(Duration::from_millis(50)),
            ..ClientConfig::default()
        };
        let mut client = LineClient::with_config(transport, config);

        let started = Instant::now();
        let err = client.send_and_read_one(&raw("ver")).unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, LinkError::Timeout));
        assert!(elapsed < Duration::from_millis(300), "took {:?}", elapsed);
    }

    #[test]
    fn test_read_timeout_restored_after_deadline_exchange() {
        let transport = ScriptedTransport::new()
            .with_read_timeout(Duration::from_millis(400))
            .then_stall();
        let config = ClientConfig {
            deadline: Some(Duration::from_millis(20)),
            ..ClientConfig::default()
        };
        let mut client = LineClient::with_config(transport, config);

        assert!(client.send_and_read_one(&raw("ver")).is_err());

        let transport = client.into_inner();
        assert_eq!(transport.read_timeout(), Some(Duration::from_millis(400)));
        let changes = transport.timeout_changes();
        assert!(changes[0] <= Duration::from_millis(20));
        assert_eq!(changes.last(), Some(&Duration::from_millis(400)));
    }

    #[test]
    fn test_short_read_timeout_left_alone_under_long_deadline() {
        let transport = ScriptedTransport::with_lines(&["OK"])
            .with_read_timeout(Duration::from_millis(100));
        let config = ClientConfig {
            deadline: Some(Duration::from_secs(60)),
            ..ClientConfig::default()
        };
        let mut client = LineClient::with_config(transport, config);

        assert_eq!(client.send_and_read_one(&raw("ver")).unwrap(), "OK");
        assert!(client.transport().timeout_changes().is_empty());
    }

    #[test]
    fn test_read_line_after_send() {
        let mut client = LineClient::new(ScriptedTransport::with_lines(&["v1.2 ", "built today"]));
        client.send(&raw("ver")).unwrap();

        assert_eq!(client.read_line().unwrap(), "v1.2");
        assert_eq!(client.read_line().unwrap(), "built today");
        assert!(matches!(client.read_line(), Err(LinkError::Timeout)));
    }

    #[test]
    fn test_leftover_reply_discarded_before_next_exchange() {
        // First reply stalls mid-line; its tail is buffered by the next exchange
        let transport = ScriptedTransport::new()
            .then_bytes(b"par")
            .then_error(io::ErrorKind::TimedOut)
            .then_stale_bytes(b"tial\n")
            .then_line("OK");
        let mut client = LineClient::new(transport);

        assert!(client.send_and_read_one(&raw("ver")).is_err());
        assert_eq!(client.send_and_read_one(&raw("ver")).unwrap(), "OK");
        assert_eq!(client.transport().discard_count(), 2);
    }

    #[test]
    fn test_leftover_reply_kept_when_discard_disabled() {
        let transport = ScriptedTransport::new()
            .then_bytes(b"par")
            .then_error(io::ErrorKind::TimedOut)
            .then_stale_bytes(b"tial\n")
            .then_line("OK");
        let config = ClientConfig {
            discard_stale_input: false,
            ..ClientConfig::default()
        };
        let mut client = LineClient::with_config(transport, config);

        assert!(client.send_and_read_one(&raw("ver")).is_err());
        assert_eq!(client.send_and_read_one(&raw("ver")).unwrap(), "tial");
        assert_eq!(client.transport().discard_count(), 0);
    }
}
