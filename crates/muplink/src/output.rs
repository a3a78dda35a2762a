use std::io::{IsTerminal, Write};

use ciborium::Value;
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use muplink_coap::Payload;
use muplink_device::DeviceInfo;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct DeviceListOutput<'a> {
    schema_id: &'a str,
    devices: &'a [DeviceInfo],
}

pub fn print_devices(devices: &[DeviceInfo], format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = DeviceListOutput {
                schema_id: "https://schemas.3leaps.dev/muplink/cli/v1/device-list.schema.json",
                devices,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec![
                    "PATH", "STATE", "MODEL", "FIRMWARE", "SERIAL", "IFACES", "BRIDGES",
                ]);
            for device in devices {
                table.add_row(vec![
                    device.path.clone(),
                    if device.connected { "open" } else { "closed" }.to_string(),
                    device.model.clone().unwrap_or_default(),
                    device.firmware.clone().unwrap_or_default(),
                    device.serial_number.clone().unwrap_or_default(),
                    device.interfaces.len().to_string(),
                    device.bridges.len().to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            for device in devices {
                println!(
                    "{} state={} model={} firmware={} interfaces={} bridges={}",
                    device.path,
                    if device.connected { "open" } else { "closed" },
                    device.model.as_deref().unwrap_or("-"),
                    device.firmware.as_deref().unwrap_or("-"),
                    device.interfaces.len(),
                    device.bridges.len()
                );
            }
        }
    }
}

#[derive(Serialize)]
struct PayloadOutput<'a> {
    schema_id: &'a str,
    payload: serde_json::Value,
}

/// Print a response payload: CBOR values render as JSON, raw bytes as a
/// hex preview (or verbatim with `--format raw`).
pub fn print_payload(payload: &Payload, format: OutputFormat) {
    match payload {
        Payload::None => {}
        Payload::Value(value) => {
            let json = cbor_to_json(value);
            match format {
                OutputFormat::Json => {
                    let out = PayloadOutput {
                        schema_id:
                            "https://schemas.3leaps.dev/muplink/cli/v1/response-payload.schema.json",
                        payload: json,
                    };
                    println!(
                        "{}",
                        serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
                    );
                }
                _ => println!(
                    "{}",
                    serde_json::to_string_pretty(&json).unwrap_or_else(|_| "{}".to_string())
                ),
            }
        }
        Payload::Raw(bytes) => match format {
            OutputFormat::Raw => print_raw(bytes),
            _ => println!("<non-CBOR payload: {}>", hex_preview(bytes)),
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn hex_preview(bytes: &[u8]) -> String {
    const PREVIEW_LEN: usize = 32;
    let head: String = bytes
        .iter()
        .take(PREVIEW_LEN)
        .map(|b| format!("{b:02x}"))
        .collect();
    if bytes.len() > PREVIEW_LEN {
        format!("{head}… ({} bytes)", bytes.len())
    } else {
        format!("{head} ({} bytes)", bytes.len())
    }
}

/// Map a CBOR value tree onto JSON for display. Byte strings become hex
/// text; non-text map keys are stringified.
pub fn cbor_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => {
            let i = i128::from(*i);
            if let Ok(v) = i64::try_from(i) {
                serde_json::Value::from(v)
            } else if let Ok(v) = u64::try_from(i) {
                serde_json::Value::from(v)
            } else {
                serde_json::Value::String(i.to_string())
            }
        }
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
        Value::Text(t) => serde_json::Value::String(t.clone()),
        Value::Bytes(b) => serde_json::Value::String(hex_preview(b)),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(cbor_to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (map_key(k), cbor_to_json(v)))
                .collect(),
        ),
        Value::Tag(_, inner) => cbor_to_json(inner),
        _ => serde_json::Value::Null,
    }
}

fn map_key(key: &Value) -> String {
    match key {
        Value::Text(t) => t.clone(),
        other => match cbor_to_json(other) {
            serde_json::Value::String(s) => s,
            json => json.to_string(),
        },
    }
}

/// Encode a JSON document as the CBOR bytes a request carries.
pub fn json_to_cbor(json: &serde_json::Value) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
    let mut buf = Vec::new();
    ciborium::into_writer(json, &mut buf)?;
    Ok(buf)
}
