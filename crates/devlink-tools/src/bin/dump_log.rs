//! Dump the stored log from a serial data logger.
//!
//! Usage: dump-log <port> [options]

use std::io;
use std::process::ExitCode;

use clap::Parser;
use devlink_tools::{dump_log, exit_code, init_logging, run_session, PortArgs};

/// Send `dumplog` and print every line until the device signals end of output.
#[derive(Debug, Parser)]
#[command(name = "dump-log", version)]
struct Cli {
    #[command(flatten)]
    port: PortArgs,

    /// Give up after this many lines without an end-of-output marker
    #[arg(long, default_value_t = 100_000)]
    max_lines: usize,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.port.verbose);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = run_session(&cli.port, Some(cli.max_lines), |client| {
        dump_log(client, &mut out)
    });

    exit_code(result)
}
