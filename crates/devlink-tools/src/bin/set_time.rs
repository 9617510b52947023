//! Set the clock on a serial data logger.
//!
//! Usage: set-time <port> [--at "YYYY-MM-DD HH:MM:SS"] [options]

use std::io;
use std::process::ExitCode;

use clap::Parser;
use devlink_protocol::Command;
use devlink_tools::{exit_code, init_logging, run_session, set_time, PortArgs, ToolResult};

/// Send `settime` with the host's local time and print the device's answer.
#[derive(Debug, Parser)]
#[command(name = "set-time", version)]
struct Cli {
    #[command(flatten)]
    port: PortArgs,

    /// Time to send instead of the current local time (YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    at: Option<String>,
}

fn run(cli: &Cli) -> ToolResult<String> {
    // Parse before opening the port so a bad --at never touches the device
    let fixed = cli.at.as_deref().map(Command::set_time_from_str).transpose()?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    run_session(&cli.port, None, |client| {
        let command = fixed.unwrap_or_else(Command::set_time_now);
        set_time(client, &command, &mut out)
    })
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.port.verbose);
    exit_code(run(&cli))
}
