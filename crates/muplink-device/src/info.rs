use std::time::{SystemTime, UNIX_EPOCH};

use ciborium::Value;
use serde::{Deserialize, Serialize};

/// Everything known about one board.
///
/// Identification fields come from the device's `/c?d=a` state tree and
/// stay at their previous values when a query omits them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceInfo {
    pub path: String,
    pub baud_rate: u32,
    pub connected: bool,
    pub model: Option<String>,
    pub firmware: Option<String>,
    pub serial_number: Option<String>,
    pub interfaces: Vec<InterfaceInfo>,
    pub bridges: Vec<BridgeInfo>,
    /// Unix seconds of the last successful state query.
    pub last_seen: Option<u64>,
}

/// One row of `ietf-interfaces:interfaces/interface`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InterfaceInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub if_type: Option<String>,
    pub enabled: Option<bool>,
    pub oper_status: Option<String>,
}

/// One row of `ieee802-dot1q-bridge:bridges/bridge`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeInfo {
    pub name: String,
    pub address: Option<String>,
    pub components: Option<u64>,
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Fold a `/c?d=a` state tree into the info record.
///
/// Tolerant by construction: a key that is absent or of an unexpected
/// shape leaves the existing value untouched.
pub(crate) fn apply_state_tree(info: &mut DeviceInfo, tree: &Value) {
    if let Some(platform) = map_get(tree, "ietf-system:system-state").and_then(|s| map_get(s, "platform")) {
        if let Some(model) = text(platform, "os-name") {
            info.model = Some(model.to_string());
        }
        if let Some(firmware) = text(platform, "os-version") {
            info.firmware = Some(firmware.to_string());
        }
        if let Some(serial) = text(platform, "serial-num").or_else(|| text(platform, "machine")) {
            info.serial_number = Some(serial.to_string());
        }
    }

    if let Some(list) = map_get(tree, "ietf-interfaces:interfaces")
        .and_then(|v| map_get(v, "interface"))
        .and_then(Value::as_array)
    {
        let interfaces: Vec<InterfaceInfo> = list
            .iter()
            .filter_map(|entry| {
                Some(InterfaceInfo {
                    name: text_value(map_get(entry, "name")?)?.to_string(),
                    if_type: text(entry, "type").map(str::to_string),
                    enabled: map_get(entry, "enabled").and_then(Value::as_bool),
                    oper_status: text(entry, "oper-status").map(str::to_string),
                })
            })
            .collect();
        if !interfaces.is_empty() {
            info.interfaces = interfaces;
        }
    }

    if let Some(list) = map_get(tree, "ieee802-dot1q-bridge:bridges")
        .and_then(|v| map_get(v, "bridge"))
        .and_then(Value::as_array)
    {
        let bridges: Vec<BridgeInfo> = list
            .iter()
            .filter_map(|entry| {
                Some(BridgeInfo {
                    name: text_value(map_get(entry, "name")?)?.to_string(),
                    address: text(entry, "address").map(str::to_string),
                    components: map_get(entry, "components").and_then(as_u64),
                })
            })
            .collect();
        if !bridges.is_empty() {
            info.bridges = bridges;
        }
    }
}

fn map_get<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let Value::Map(entries) = value else {
        return None;
    };
    entries
        .iter()
        .find(|(k, _)| matches!(k, Value::Text(t) if t == key))
        .map(|(_, v)| v)
}

fn text<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    text_value(map_get(value, key)?)
}

fn text_value(value: &Value) -> Option<&str> {
    match value {
        Value::Text(t) => Some(t.as_str()),
        _ => None,
    }
}

fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Integer(i) => u64::try_from(i128::from(*i)).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: Vec<(&str, Value)>) -> Value {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (Value::Text(k.to_string()), v))
                .collect(),
        )
    }

    fn sample_tree() -> Value {
        map(vec![
            (
                "ietf-system:system-state",
                map(vec![(
                    "platform",
                    map(vec![
                        ("os-name", Value::Text("VelocitySP".into())),
                        ("os-version", Value::Text("2025.03".into())),
                        ("serial-num", Value::Text("VD-0042".into())),
                    ]),
                )]),
            ),
            (
                "ietf-interfaces:interfaces",
                map(vec![(
                    "interface",
                    Value::Array(vec![
                        map(vec![
                            ("name", Value::Text("eth0".into())),
                            ("type", Value::Text("ethernetCsmacd".into())),
                            ("enabled", Value::Bool(true)),
                            ("oper-status", Value::Text("up".into())),
                        ]),
                        map(vec![("name", Value::Text("eth1".into()))]),
                    ]),
                )]),
            ),
            (
                "ieee802-dot1q-bridge:bridges",
                map(vec![(
                    "bridge",
                    Value::Array(vec![map(vec![
                        ("name", Value::Text("b0".into())),
                        ("address", Value::Text("00-11-22-33-44-55".into())),
                        ("components", Value::Integer(1.into())),
                    ])]),
                )]),
            ),
        ])
    }

    #[test]
    fn full_tree_populates_every_field() {
        let mut info = DeviceInfo::default();
        apply_state_tree(&mut info, &sample_tree());

        assert_eq!(info.model.as_deref(), Some("VelocitySP"));
        assert_eq!(info.firmware.as_deref(), Some("2025.03"));
        assert_eq!(info.serial_number.as_deref(), Some("VD-0042"));
        assert_eq!(info.interfaces.len(), 2);
        assert_eq!(info.interfaces[0].name, "eth0");
        assert_eq!(info.interfaces[0].enabled, Some(true));
        assert_eq!(info.interfaces[0].oper_status.as_deref(), Some("up"));
        assert_eq!(info.interfaces[1].name, "eth1");
        assert_eq!(info.interfaces[1].enabled, None);
        assert_eq!(info.bridges.len(), 1);
        assert_eq!(info.bridges[0].components, Some(1));
    }

    #[test]
    fn missing_keys_leave_existing_values() {
        let mut info = DeviceInfo {
            model: Some("prior-model".into()),
            interfaces: vec![InterfaceInfo {
                name: "kept".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        apply_state_tree(&mut info, &map(vec![("unrelated", Value::Bool(true))]));

        assert_eq!(info.model.as_deref(), Some("prior-model"));
        assert_eq!(info.interfaces.len(), 1);
        assert_eq!(info.interfaces[0].name, "kept");
    }

    #[test]
    fn non_map_tree_is_a_no_op() {
        let mut info = DeviceInfo::default();
        apply_state_tree(&mut info, &Value::Array(vec![]));
        assert_eq!(info, DeviceInfo::default());
    }

    #[test]
    fn interface_rows_without_a_name_are_skipped() {
        let tree = map(vec![(
            "ietf-interfaces:interfaces",
            map(vec![(
                "interface",
                Value::Array(vec![
                    map(vec![("enabled", Value::Bool(false))]),
                    map(vec![("name", Value::Text("eth9".into()))]),
                ]),
            )]),
        )]);
        let mut info = DeviceInfo::default();
        apply_state_tree(&mut info, &tree);
        assert_eq!(info.interfaces.len(), 1);
        assert_eq!(info.interfaces[0].name, "eth9");
    }
}
