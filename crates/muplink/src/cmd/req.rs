use std::fs;
use std::sync::Arc;

use muplink_coap::Method;
use muplink_device::{ConnectionConfig, DeviceConnection, LogEvents};

use crate::cmd::{parse_duration, ReqArgs};
use crate::exit::{device_error, CliError, CliResult, DATA_INVALID, SUCCESS, USAGE};
use crate::output::{json_to_cbor, print_payload, OutputFormat};

pub fn run(args: ReqArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let method: Method = args
        .method
        .parse()
        .map_err(|err| CliError::new(USAGE, format!("{err}")))?;
    let payload = resolve_payload(&args)?;

    let config = ConnectionConfig {
        baud_rate: args.baud,
        request_timeout: timeout,
        ..ConnectionConfig::default()
    };
    let conn = DeviceConnection::open_serial(&args.port, config, Arc::new(LogEvents))
        .map_err(|err| device_error("open failed", err))?;

    let result = conn.request_with_timeout(method, &args.uri, payload.as_deref(), timeout);
    conn.disconnect();
    let response = result.map_err(|err| device_error("request failed", err))?;

    print_payload(&response, format);
    Ok(SUCCESS)
}

fn resolve_payload(args: &ReqArgs) -> CliResult<Option<Vec<u8>>> {
    let json_text = if let Some(json) = &args.json {
        Some(json.clone())
    } else if let Some(path) = &args.file {
        Some(fs::read_to_string(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        })?)
    } else {
        None
    };

    let Some(json_text) = json_text else {
        return Ok(None);
    };
    let json: serde_json::Value = serde_json::from_str(&json_text)
        .map_err(|err| CliError::new(USAGE, format!("payload is not valid JSON: {err}")))?;
    let cbor = json_to_cbor(&json)
        .map_err(|err| CliError::new(DATA_INVALID, format!("payload CBOR encoding failed: {err}")))?;
    Ok(Some(cbor))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn args(json: Option<&str>, file: Option<PathBuf>) -> ReqArgs {
        ReqArgs {
            port: PathBuf::from("/dev/ttyACM0"),
            method: "GET".into(),
            uri: "/c".into(),
            json: json.map(str::to_string),
            file,
            timeout: "15s".into(),
            baud: muplink_serial::DEFAULT_BAUD_RATE,
        }
    }

    #[test]
    fn no_payload_flags_mean_no_payload() {
        assert!(resolve_payload(&args(None, None)).unwrap().is_none());
    }

    #[test]
    fn json_payload_becomes_cbor() {
        let cbor = resolve_payload(&args(Some(r#"{"enabled":true}"#), None))
            .unwrap()
            .unwrap();
        let value: ciborium::Value = ciborium::from_reader(cbor.as_slice()).unwrap();
        assert_eq!(
            value,
            ciborium::Value::Map(vec![(
                ciborium::Value::Text("enabled".into()),
                ciborium::Value::Bool(true)
            )])
        );
    }

    #[test]
    fn invalid_json_is_a_usage_error() {
        let err = resolve_payload(&args(Some("{nope"), None)).unwrap_err();
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn missing_payload_file_is_an_io_error() {
        let err = resolve_payload(&args(None, Some(PathBuf::from("/no/such/file.json"))))
            .unwrap_err();
        assert!(err.message.contains("/no/such/file.json"));
    }
}
