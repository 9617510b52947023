//! Device Link Line Protocol
//!
//! This crate provides the host side of a simple line-based text protocol
//! spoken by serial-attached data loggers. Each exchange is one command
//! written by the host followed by one or more response lines from the device.
//!
//! # Protocol Overview
//!
//! - **Commands** (host → device): raw ASCII text. By default no terminator is
//!   appended; the device frames commands itself. See [`LineTerminator`].
//! - **Responses** (device → host): text lines terminated by `\n`. Trailing
//!   whitespace (including `\r`) is stripped.
//! - **Sentinel**: multi-line responses such as `dumplog` end with a line
//!   containing only `.`, which is never returned to the caller.
//!
//! # Example
//!
//! ```rust,ignore
//! use devlink_protocol::{with_serial_session, ClientConfig, Command, SerialConfig};
//!
//! let serial = SerialConfig::new("/dev/ttyUSB0");
//! let lines = with_serial_session(&serial, ClientConfig::default(), |client| {
//!     client.send_and_collect_until_sentinel(&Command::DumpLog)
//! })?;
//! ```

mod client;
mod codec;
mod commands;
mod error;
pub mod mock;
#[cfg(feature = "serial")]
mod serial;
mod transport;

pub use client::*;
pub use codec::*;
pub use commands::*;
pub use error::*;
#[cfg(feature = "serial")]
pub use serial::*;
pub use transport::*;
