use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod doctor;
pub mod listen;
pub mod ping;
pub mod req;
pub mod scan;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Discover boards and print what they report.
    Scan(ScanArgs),
    /// Send one CORECONF request to a board.
    Req(ReqArgs),
    /// Probe a board with a MUP1 ping.
    Ping(PingArgs),
    /// Stream a board's announcement/trace/system frames.
    Listen(ListenArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Scan(args) => scan::run(args, format),
        Command::Req(args) => req::run(args, format),
        Command::Ping(args) => ping::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Baud rate for newly opened boards.
    #[arg(long, default_value_t = muplink_serial::DEFAULT_BAUD_RATE)]
    pub baud: u32,
    /// Keep rescanning until interrupted.
    #[arg(long)]
    pub watch: bool,
    /// Rescan period when --watch is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub interval: String,
}

#[derive(Args, Debug)]
pub struct ReqArgs {
    /// Serial device path (e.g. /dev/ttyACM0).
    pub port: PathBuf,
    /// CoAP method: GET, POST, PUT, DELETE, FETCH, PATCH, IPATCH.
    pub method: String,
    /// Resource URI (e.g. /ietf-interfaces/interfaces).
    pub uri: String,
    /// JSON payload, converted to CBOR on the wire.
    #[arg(long, conflicts_with = "file")]
    pub json: Option<String>,
    /// Read the payload from a file of JSON.
    #[arg(long, conflicts_with = "json")]
    pub file: Option<PathBuf>,
    /// Response timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "15s")]
    pub timeout: String,
    /// Baud rate.
    #[arg(long, default_value_t = muplink_serial::DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Serial device path.
    pub port: PathBuf,
    /// How long to wait for the pong.
    #[arg(long, default_value = "2s")]
    pub timeout: String,
    /// Baud rate.
    #[arg(long, default_value_t = muplink_serial::DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Serial device path.
    pub port: PathBuf,
    /// Exit after this many frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Baud rate.
    #[arg(long, default_value_t = muplink_serial::DEFAULT_BAUD_RATE)]
    pub baud: u32,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s` / `500ms` / bare-seconds duration flags.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
