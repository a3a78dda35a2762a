use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use muplink_device::{ConnectionConfig, DeviceConnection, DeviceEvents};
use serde::Serialize;

use crate::cmd::{parse_duration, PingArgs};
use crate::exit::{device_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::OutputFormat;

/// Forwards pong arrivals to the waiting command.
struct PongEvents(Sender<()>);

impl DeviceEvents for PongEvents {
    fn pong(&self, _path: &str) {
        let _ = self.0.send(());
    }
}

#[derive(Serialize)]
struct PingOutput<'a> {
    schema_id: &'a str,
    port: String,
    rtt_ms: u64,
}

pub fn run(args: PingArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let (tx, rx) = mpsc::channel();

    let config = ConnectionConfig {
        baud_rate: args.baud,
        // The command pings by hand; keep the automatic one out of the way.
        ping_delay: Duration::from_secs(3600),
        ..ConnectionConfig::default()
    };
    let conn = DeviceConnection::open_serial(&args.port, config, Arc::new(PongEvents(tx)))
        .map_err(|err| device_error("open failed", err))?;

    let started = Instant::now();
    conn.send_ping()
        .map_err(|err| device_error("ping failed", err))?;
    let outcome = rx.recv_timeout(timeout);
    let rtt = started.elapsed();
    conn.disconnect();

    match outcome {
        Ok(()) => {
            print_pong(&args, rtt, format);
            Ok(SUCCESS)
        }
        Err(_) => Err(CliError::new(
            TIMEOUT,
            format!("no pong from {} within {timeout:?}", args.port.display()),
        )),
    }
}

fn print_pong(args: &PingArgs, rtt: Duration, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = PingOutput {
                schema_id: "https://schemas.3leaps.dev/muplink/cli/v1/ping-result.schema.json",
                port: args.port.display().to_string(),
                rtt_ms: rtt.as_millis() as u64,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        _ => println!("pong from {} in {} ms", args.port.display(), rtt.as_millis()),
    }
}
