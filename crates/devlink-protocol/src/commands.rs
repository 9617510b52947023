//! Commands that can be sent to the device.

use chrono::{Local, NaiveDateTime};

use crate::codec::{LineCodec, LineTerminator};
use crate::error::{LinkError, LinkResult};

/// Timestamp format used by `settime`.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Commands understood by the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Dump the stored log. The device answers with lines ending in `.`.
    DumpLog,

    /// Set the device clock.
    SetTime {
        /// Wall-clock time to set, in the device's local time zone.
        time: NaiveDateTime,
    },

    /// Send a raw command string.
    Raw {
        /// The raw command text.
        command: String,
    },
}

impl Command {
    /// Build a `settime` command carrying the host's current local time.
    pub fn set_time_now() -> Self {
        Command::SetTime {
            time: Local::now().naive_local(),
        }
    }

    /// Parse a `YYYY-MM-DD HH:MM:SS` timestamp into a `settime` command.
    pub fn set_time_from_str(s: &str) -> LinkResult<Self> {
        let time = NaiveDateTime::parse_from_str(s.trim(), TIME_FORMAT).map_err(|e| {
            LinkError::InvalidCommand(format!("bad timestamp '{}': {}", s, e))
        })?;
        Ok(Command::SetTime { time })
    }

    /// Get the command string without any terminator.
    pub fn to_command_string(&self) -> String {
        match self {
            Command::DumpLog => "dumplog".to_string(),
            Command::SetTime { time } => format!("settime {}", time.format(TIME_FORMAT)),
            Command::Raw { command } => command.clone(),
        }
    }

    /// Check that the command can go out as a single ASCII line.
    pub fn validate(&self) -> LinkResult<()> {
        let text = self.to_command_string();
        if text.is_empty() {
            return Err(LinkError::InvalidCommand("empty command".to_string()));
        }
        if text.contains(['\r', '\n']) {
            return Err(LinkError::InvalidCommand(format!(
                "embedded line break in {:?}",
                text
            )));
        }
        if !text.is_ascii() {
            return Err(LinkError::InvalidCommand(format!(
                "non-ASCII text in {:?}",
                text
            )));
        }
        Ok(())
    }

    /// Encode the command as the bytes to put on the wire.
    pub fn encode(&self, terminator: LineTerminator) -> Vec<u8> {
        LineCodec::encode_command(&self.to_command_string(), terminator)
    }
}
