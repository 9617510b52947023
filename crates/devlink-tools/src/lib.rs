//! Shared plumbing for the `dump-log` and `set-time` binaries.
//!
//! Each binary parses [`PortArgs`], sets up logging, opens one serial session
//! and runs a single exchange. Protocol output goes to stdout; logs and
//! diagnostics go to stderr.

use std::io::{self, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Args;
use devlink_protocol::{
    with_serial_session, ClientConfig, Command, LineClient, LineTerminator, LinkError,
    SerialClient, SerialConfig, Transport, DEFAULT_BAUD_RATE,
};
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Errors a tool run can end with.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Talking to the device failed.
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Writing to stdout failed.
    #[error("failed to write output: {0}")]
    Output(#[source] io::Error),
}

/// Result type alias for tool runs.
pub type ToolResult<T> = Result<T, ToolError>;

/// Options shared by both tools.
#[derive(Debug, Clone, Args)]
pub struct PortArgs {
    /// Serial port the device is attached to (e.g. /dev/ttyUSB0 or COM3)
    pub port: String,

    /// Line speed
    #[arg(short, long, default_value_t = DEFAULT_BAUD_RATE)]
    pub baud: u32,

    /// How long a single read may wait for data, in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub timeout_ms: u64,

    /// Time limit for the whole exchange, in milliseconds; cuts a pending read short
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// Bytes appended after the command: none, cr, lf or crlf
    #[arg(long, default_value_t = LineTerminator::None)]
    pub terminator: LineTerminator,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl PortArgs {
    /// Serial settings for the session.
    pub fn serial_config(&self) -> SerialConfig {
        SerialConfig {
            port: self.port.clone(),
            baud_rate: self.baud,
            read_timeout: Duration::from_millis(self.timeout_ms),
        }
    }

    /// Client limits for the session.
    pub fn client_config(&self, max_lines: Option<usize>) -> ClientConfig {
        ClientConfig {
            terminator: self.terminator,
            max_lines,
            deadline: self.deadline_ms.map(Duration::from_millis),
            ..ClientConfig::default()
        }
    }
}

/// Install a stderr log subscriber. `RUST_LOG` overrides the verbosity flag.
pub fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Open the port, run `f` on the session, and close the port.
pub fn run_session<R, F>(args: &PortArgs, max_lines: Option<usize>, f: F) -> ToolResult<R>
where
    F: FnOnce(&mut SerialClient) -> ToolResult<R>,
{
    let serial = args.serial_config();
    let client = args.client_config(max_lines);
    with_serial_session(&serial, client, |session| Ok(f(session)))?
}

/// Send `dumplog` and print each line as it arrives.
///
/// Lines printed before a failure stay printed.
pub fn dump_log<T, W>(client: &mut LineClient<T>, out: &mut W) -> ToolResult<usize>
where
    T: Transport,
    W: Write,
{
    let mut output_error = None;
    let count = client.send_and_stream_until_sentinel(&Command::DumpLog, |line| {
        if output_error.is_none() {
            if let Err(e) = writeln!(out, "{}", line) {
                output_error = Some(e);
            }
        }
    })?;

    if let Some(e) = output_error {
        return Err(ToolError::Output(e));
    }
    out.flush().map_err(ToolError::Output)?;

    info!(lines = count, "log dump complete");
    Ok(count)
}

/// Print the `settime` command, send it, and print the acknowledgment.
pub fn set_time<T, W>(
    client: &mut LineClient<T>,
    command: &Command,
    out: &mut W,
) -> ToolResult<String>
where
    T: Transport,
    W: Write,
{
    writeln!(out, "{}", command.to_command_string()).map_err(ToolError::Output)?;
    out.flush().map_err(ToolError::Output)?;

    let response = client.send_and_read_one(command)?;
    debug!(response = %response, "settime acknowledged");

    writeln!(out, "{}", response).map_err(ToolError::Output)?;
    out.flush().map_err(ToolError::Output)?;
    Ok(response)
}

/// Turn a tool result into a process exit status, reporting failures on stderr.
pub fn exit_code<R>(result: ToolResult<R>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use devlink_protocol::mock::ScriptedTransport;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        port: PortArgs,
    }

    #[test]
    fn test_port_args_defaults() {
        let cli = TestCli::parse_from(["test", "/dev/ttyUSB0"]);
        let serial = cli.port.serial_config();
        let client = cli.port.client_config(Some(10));

        assert_eq!(serial.port, "/dev/ttyUSB0");
        assert_eq!(serial.baud_rate, 9600);
        assert_eq!(serial.read_timeout, Duration::from_millis(5000));
        assert_eq!(client.terminator, LineTerminator::None);
        assert_eq!(client.max_lines, Some(10));
        assert_eq!(client.deadline, None);
    }

    #[test]
    fn test_port_args_overrides() {
        let cli = TestCli::parse_from([
            "test",
            "COM3",
            "--baud",
            "115200",
            "--timeout-ms",
            "250",
            "--deadline-ms",
            "2000",
            "--terminator",
            "crlf",
            "-vv",
        ]);

        assert_eq!(cli.port.baud, 115200);
        assert_eq!(cli.port.verbose, 2);
        assert_eq!(cli.port.serial_config().read_timeout, Duration::from_millis(250));

        let client = cli.port.client_config(None);
        assert_eq!(client.terminator, LineTerminator::CrLf);
        assert_eq!(client.deadline, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_dump_log_prints_lines() {
        let mut client = LineClient::new(ScriptedTransport::with_lines(&["a,1", "b,2", "."]));
        let mut out = Vec::new();

        let count = dump_log(&mut client, &mut out).unwrap();

        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "a,1\nb,2\n");
        assert_eq!(client.transport().written(), b"dumplog");
    }

    #[test]
    fn test_dump_log_keeps_partial_output_on_timeout() {
        let mut client = LineClient::new(ScriptedTransport::with_lines(&["a,1"]));
        let mut out = Vec::new();

        let err = dump_log(&mut client, &mut out).unwrap_err();

        assert!(matches!(err, ToolError::Link(LinkError::Timeout)));
        assert_eq!(String::from_utf8(out).unwrap(), "a,1\n");
    }

    #[test]
    fn test_set_time_echoes_command_and_response() {
        let mut client = LineClient::new(ScriptedTransport::with_lines(&["OK"]));
        let command = Command::set_time_from_str("2024-01-01 12:00:00").unwrap();
        let mut out = Vec::new();

        let response = set_time(&mut client, &command, &mut out).unwrap();

        assert_eq!(response, "OK");
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "settime 2024-01-01 12:00:00\nOK\n"
        );
    }

    #[test]
    fn test_exit_code() {
        assert_eq!(exit_code(Ok(())), ExitCode::SUCCESS);
        assert_eq!(
            exit_code::<()>(Err(ToolError::Link(LinkError::Timeout))),
            ExitCode::FAILURE
        );
    }
}
