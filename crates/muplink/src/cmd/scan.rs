use std::sync::Arc;

use muplink_device::{DeviceInfo, DeviceRegistry, LogEvents, RegistryConfig};
use muplink_serial::DevEnumerator;
use tracing::debug;

use crate::cmd::{parse_duration, ScanArgs};
use crate::exit::{device_error, CliResult, SUCCESS};
use crate::output::{print_devices, OutputFormat};

pub fn run(args: ScanArgs, format: OutputFormat) -> CliResult<i32> {
    let interval = parse_duration(&args.interval)?;
    let registry = DeviceRegistry::new(
        Box::new(DevEnumerator::new()),
        Arc::new(LogEvents),
        RegistryConfig {
            baud_rate: args.baud,
            ..RegistryConfig::default()
        },
    );

    loop {
        let devices = scan_once(&registry)?;
        print_devices(&devices, format);
        if !args.watch {
            registry.shutdown();
            return Ok(SUCCESS);
        }
        std::thread::sleep(interval);
    }
}

/// One scan pass: connect whatever is present, then refresh each board's
/// info record. A board that fails its state query still appears — with
/// whatever was known before.
fn scan_once(registry: &Arc<DeviceRegistry>) -> CliResult<Vec<DeviceInfo>> {
    registry
        .scan()
        .map_err(|err| device_error("scan failed", err))?;

    let mut devices = Vec::new();
    for info in registry.all() {
        match registry.get(&info.path) {
            Some(conn) => match conn.query_device_info() {
                Ok(fresh) => devices.push(fresh),
                Err(err) => {
                    debug!(path = %info.path, %err, "state query failed");
                    devices.push(info);
                }
            },
            None => devices.push(info),
        }
    }
    Ok(devices)
}
