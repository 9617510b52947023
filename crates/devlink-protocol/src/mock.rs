//! In-memory transport with scripted reads, for tests.
//!
//! `ScriptedTransport` stands in for a serial port: everything the client
//! writes is recorded, and reads are served from a queue of scripted steps.
//! Once the script runs dry the transport behaves like a serial port whose
//! read timeout expired, unless [`ScriptedTransport::end_with_eof`] was used.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use crate::transport::Transport;

/// Read timeout a new transport starts with.
pub const DEFAULT_MOCK_TIMEOUT: Duration = Duration::from_secs(1);

/// One scripted read outcome.
#[derive(Debug)]
enum ReadStep {
    Data(Vec<u8>),
    /// Bytes already sitting in the receive buffer; dropped by `discard_input`.
    Stale(Vec<u8>),
    Error(io::ErrorKind),
    /// Block for the current read timeout, then time out.
    Stall,
}

/// A fake transport with a fixed read script.
#[derive(Debug)]
pub struct ScriptedTransport {
    steps: VecDeque<ReadStep>,
    written: Vec<u8>,
    flushes: usize,
    eof_when_exhausted: bool,
    fail_writes: bool,
    read_timeout: Duration,
    timeout_changes: Vec<Duration>,
    discards: usize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        ScriptedTransport {
            steps: VecDeque::new(),
            written: Vec::new(),
            flushes: 0,
            eof_when_exhausted: false,
            fail_writes: false,
            read_timeout: DEFAULT_MOCK_TIMEOUT,
            timeout_changes: Vec::new(),
            discards: 0,
        }
    }
}

impl ScriptedTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        ScriptedTransport::default()
    }

    /// Start with the given read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Create a transport that answers with the given lines, each followed by `\n`.
    pub fn with_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        lines
            .iter()
            .fold(ScriptedTransport::new(), |t, line| t.then_line(line.as_ref()))
    }

    /// Queue raw bytes.
    pub fn then_bytes(mut self, data: &[u8]) -> Self {
        self.steps.push_back(ReadStep::Data(data.to_vec()));
        self
    }

    /// Queue a line followed by `\n`.
    pub fn then_line(self, line: &str) -> Self {
        let mut data = line.as_bytes().to_vec();
        data.push(b'\n');
        self.then_bytes(&data)
    }

    /// Queue bytes that arrived before the next exchange starts.
    pub fn then_stale_bytes(mut self, data: &[u8]) -> Self {
        self.steps.push_back(ReadStep::Stale(data.to_vec()));
        self
    }

    /// Queue a read that blocks for the whole read timeout and then times out.
    pub fn then_stall(mut self) -> Self {
        self.steps.push_back(ReadStep::Stall);
        self
    }

    /// Queue a read error.
    pub fn then_error(mut self, kind: io::ErrorKind) -> Self {
        self.steps.push_back(ReadStep::Error(kind));
        self
    }

    /// Report end of stream instead of a timeout once the script is exhausted.
    pub fn end_with_eof(mut self) -> Self {
        self.eof_when_exhausted = true;
        self
    }

    /// Make every write fail with a broken pipe.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// Everything written so far.
    pub fn written(&self) -> &[u8] {
        &self.written
    }

    /// Everything written so far, as text.
    pub fn written_str(&self) -> String {
        String::from_utf8_lossy(&self.written).to_string()
    }

    /// Number of times `flush` was called.
    pub fn flush_count(&self) -> usize {
        self.flushes
    }

    /// Read timeouts set by the client, in order.
    pub fn timeout_changes(&self) -> &[Duration] {
        &self.timeout_changes
    }

    /// Number of times input was discarded.
    pub fn discard_count(&self) -> usize {
        self.discards
    }

    /// Number of scripted bytes not yet read.
    pub fn unread_len(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                ReadStep::Data(data) | ReadStep::Stale(data) => data.len(),
                ReadStep::Error(_) | ReadStep::Stall => 0,
            })
            .sum()
    }

    /// Copy what fits into `buf`, putting the rest back at the front.
    fn serve(
        &mut self,
        mut data: Vec<u8>,
        buf: &mut [u8],
        step: fn(Vec<u8>) -> ReadStep,
    ) -> usize {
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        if n < data.len() {
            let rest = data.split_off(n);
            self.steps.push_front(step(rest));
        }
        n
    }
}

impl Read for ScriptedTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        match self.steps.pop_front() {
            Some(ReadStep::Data(data)) => Ok(self.serve(data, buf, ReadStep::Data)),
            Some(ReadStep::Stale(data)) => Ok(self.serve(data, buf, ReadStep::Stale)),
            Some(ReadStep::Error(kind)) => Err(io::Error::new(kind, "scripted read error")),
            Some(ReadStep::Stall) => {
                thread::sleep(self.read_timeout);
                Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out"))
            }
            None if self.eof_when_exhausted => Ok(0),
            None => Err(io::Error::new(io::ErrorKind::TimedOut, "operation timed out")),
        }
    }
}

impl Write for ScriptedTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
        }
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}

impl Transport for ScriptedTransport {
    fn read_timeout(&self) -> Option<Duration> {
        Some(self.read_timeout)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.read_timeout = timeout;
        self.timeout_changes.push(timeout);
        Ok(())
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.discards += 1;
        while matches!(self.steps.front(), Some(ReadStep::Stale(_))) {
            self.steps.pop_front();
        }
        Ok(())
    }
}
