//! Serial port sessions.
//!
//! A session opens the port, hands a [`LineClient`] to the caller, and closes
//! the port when the client is dropped, on success and on error alike.

use std::io;
use std::time::Duration;

use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::client::{ClientConfig, LineClient};
use crate::error::{LinkError, LinkResult};
use crate::transport::Transport;

/// Baud rate the devices run at.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// How long a single read may wait for data.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Serial port settings. Framing is always 8N1 without flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name, e.g. `/dev/ttyUSB0` or `COM3`.
    pub port: String,
    /// Line speed.
    pub baud_rate: u32,
    /// Per-read timeout.
    pub read_timeout: Duration,
}

impl SerialConfig {
    /// Settings for `port` with the device defaults.
    pub fn new(port: impl Into<String>) -> Self {
        SerialConfig {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl Transport for Box<dyn SerialPort> {
    fn read_timeout(&self) -> Option<Duration> {
        Some(SerialPort::timeout(&**self))
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        SerialPort::set_timeout(&mut **self, timeout).map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        SerialPort::clear(&**self, ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// A client bound to an open serial port.
pub type SerialClient = LineClient<Box<dyn SerialPort>>;

/// Open the port described by `config`.
pub fn open_serial(config: &SerialConfig) -> LinkResult<Box<dyn SerialPort>> {
    debug!(
        port = %config.port,
        baud = config.baud_rate,
        timeout_ms = config.read_timeout.as_millis() as u64,
        "opening serial port"
    );

    let port = serialport::new(&config.port, config.baud_rate)
        .data_bits(DataBits::Eight)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .flow_control(FlowControl::None)
        .timeout(config.read_timeout)
        .open()
        .map_err(|e| LinkError::Open {
            port: config.port.clone(),
            reason: e.to_string(),
        })?;

    info!(port = %config.port, "serial port open");
    Ok(port)
}

/// Run `f` against a client on a freshly opened port, then close the port.
pub fn with_serial_session<R, F>(
    serial: &SerialConfig,
    client: ClientConfig,
    f: F,
) -> LinkResult<R>
where
    F: FnOnce(&mut SerialClient) -> LinkResult<R>,
{
    let port = open_serial(serial)?;
    let mut session = LineClient::with_config(port, client);
    let result = f(&mut session);
    drop(session);
    debug!(port = %serial.port, ok = result.is_ok(), "serial port closed");
    result
}
