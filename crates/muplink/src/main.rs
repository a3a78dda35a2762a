mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "muplink", version, about = "VelocityDRIVE serial CORECONF CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_req_subcommand() {
        let cli = Cli::try_parse_from([
            "muplink",
            "req",
            "/dev/ttyACM0",
            "GET",
            "/ietf-interfaces/interfaces",
            "--timeout",
            "5s",
        ])
        .expect("req args should parse");

        assert!(matches!(cli.command, Command::Req(_)));
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "muplink",
            "req",
            "/dev/ttyACM0",
            "POST",
            "/c",
            "--json",
            "{\"x\":1}",
            "--file",
            "payload.json",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_scan_with_watch_interval() {
        let cli = Cli::try_parse_from(["muplink", "scan", "--watch", "--interval", "500ms"])
            .expect("scan args should parse");
        match cli.command {
            Command::Scan(args) => {
                assert!(args.watch);
                assert_eq!(args.interval, "500ms");
            }
            other => panic!("expected scan, got {other:?}"),
        }
    }

    #[test]
    fn parses_listen_with_count() {
        let cli = Cli::try_parse_from(["muplink", "listen", "/dev/ttyACM1", "--count", "3"])
            .expect("listen args should parse");
        match cli.command {
            Command::Listen(args) => assert_eq!(args.count, Some(3)),
            other => panic!("expected listen, got {other:?}"),
        }
    }
}
