use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Duration;

use muplink_device::{ConnectionConfig, DeviceConnection, DeviceEvents};
use serde::Serialize;

use crate::cmd::ListenArgs;
use crate::exit::{device_error, CliResult, FAILURE, SUCCESS};
use crate::output::{hex_preview, OutputFormat};

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "text")]
enum SideChannelFrame {
    Announcement(String),
    Trace(String),
    System(String),
}

/// Forwards side-channel frames into the printing loop.
struct ListenEvents(Sender<SideChannelFrame>);

impl DeviceEvents for ListenEvents {
    fn announcement(&self, _path: &str, text: &str) {
        let _ = self.0.send(SideChannelFrame::Announcement(text.to_string()));
    }

    fn trace(&self, _path: &str, text: &str) {
        let _ = self.0.send(SideChannelFrame::Trace(text.to_string()));
    }

    fn system(&self, _path: &str, payload: &[u8]) {
        let _ = self.0.send(SideChannelFrame::System(hex_preview(payload)));
    }
}

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let (tx, rx) = mpsc::channel();
    let conn = DeviceConnection::open_serial(
        &args.port,
        ConnectionConfig {
            baud_rate: args.baud,
            ..ConnectionConfig::default()
        },
        Arc::new(ListenEvents(tx)),
    )
    .map_err(|err| device_error("open failed", err))?;

    let mut received = 0usize;
    loop {
        if args.count.is_some_and(|count| received >= count) {
            conn.disconnect();
            return Ok(SUCCESS);
        }
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(frame) => {
                print_frame(&frame, format);
                received += 1;
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if conn.state() != muplink_device::LinkState::Open {
                    eprintln!("error: {} disconnected", args.port.display());
                    return Ok(FAILURE);
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return Ok(FAILURE),
        }
    }
}

fn print_frame(frame: &SideChannelFrame, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string())
        ),
        _ => match frame {
            SideChannelFrame::Announcement(text) => println!("announcement: {text}"),
            SideChannelFrame::Trace(text) => println!("trace: {text}"),
            SideChannelFrame::System(text) => println!("system: {text}"),
        },
    }
}
