// Local crates
use crate::telemetry::{
    commands::{PortId, ResponseKind},
    error::TelemetryError,
};

// External crates
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tracing::instrument;

/// Body of an `/ethdev/info,<id>` answer. Only the name is consumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EthdevInfo {
    pub name: String,
}

/// Body of `/dp_service/graph/call_count`, call counts nested under a fixed key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphCallCount {
    #[serde(rename = "Node_0_to_255", default)]
    pub nodes: BTreeMap<String, f64>,
}

/// A decoded telemetry answer, one variant per response shape.
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryResponse {
    EthdevList(Vec<PortId>),
    EthdevInfo(EthdevInfo),
    EthdevXstats(BTreeMap<String, f64>),
    NatPortUsage(BTreeMap<String, u64>),
    VirtsvcPortUsage(BTreeMap<String, u64>),
    GraphCallCount(GraphCallCount),
}

impl TelemetryResponse {
    pub const fn kind(&self) -> ResponseKind {
        match self {
            TelemetryResponse::EthdevList(_) => ResponseKind::EthdevList,
            TelemetryResponse::EthdevInfo(_) => ResponseKind::EthdevInfo,
            TelemetryResponse::EthdevXstats(_) => ResponseKind::EthdevXstats,
            TelemetryResponse::NatPortUsage(_) => ResponseKind::NatPortUsage,
            TelemetryResponse::VirtsvcPortUsage(_) => ResponseKind::VirtsvcPortUsage,
            TelemetryResponse::GraphCallCount(_) => ResponseKind::GraphCallCount,
        }
    }

    /// Re-encode in the same envelope the server uses, `{"<path>": payload}`.
    pub fn to_json(&self) -> Value {
        let payload = match self {
            TelemetryResponse::EthdevList(ids) => json!(ids),
            TelemetryResponse::EthdevInfo(info) => json!(info),
            TelemetryResponse::EthdevXstats(stats) => json!(stats),
            TelemetryResponse::NatPortUsage(usage)
            | TelemetryResponse::VirtsvcPortUsage(usage) => json!(usage),
            TelemetryResponse::GraphCallCount(calls) => json!(calls),
        };

        let mut envelope = Map::new();
        envelope.insert(self.kind().path().to_owned(), payload);
        Value::Object(envelope)
    }
}

/// Decode an accumulated response buffer into the shape `kind` expects.
///
/// The buffer must be a JSON object keyed by the request path. A `null` list
/// or map payload decodes as empty, which is how the service answers commands
/// it does not have registered. Anything else that does not fit the shape is
/// an error.
#[instrument(
    name = "dpdk_exporter_decoder::decode",
    target = "telemetry::decoder",
    skip(raw),
    fields(raw_len = raw.len()),
    level = "trace"
)]
pub fn decode(raw: &[u8], kind: ResponseKind) -> Result<TelemetryResponse, TelemetryError> {
    let path = kind.path();
    let response = match kind {
        ResponseKind::EthdevList => TelemetryResponse::EthdevList(decode_collection(raw, path)?),
        ResponseKind::EthdevInfo => TelemetryResponse::EthdevInfo(decode_payload(raw, path)?),
        ResponseKind::EthdevXstats => {
            TelemetryResponse::EthdevXstats(decode_collection(raw, path)?)
        }
        ResponseKind::NatPortUsage => {
            TelemetryResponse::NatPortUsage(decode_collection(raw, path)?)
        }
        ResponseKind::VirtsvcPortUsage => {
            TelemetryResponse::VirtsvcPortUsage(decode_collection(raw, path)?)
        }
        ResponseKind::GraphCallCount => {
            TelemetryResponse::GraphCallCount(decode_collection(raw, path)?)
        }
    };

    tracing::trace!(telemetry_path = %path, "Decoded telemetry response");
    Ok(response)
}

/// Decode the payload under `path`, `null` included as-is.
pub fn decode_payload<T: DeserializeOwned>(raw: &[u8], path: &str) -> Result<T, TelemetryError> {
    let payload = take_payload(raw, path)?;
    serde_json::from_value(payload).map_err(|source| decode_error(path, source))
}

/// Decode a list or map payload under `path`; `null` becomes empty.
pub fn decode_collection<T>(raw: &[u8], path: &str) -> Result<T, TelemetryError>
where
    T: DeserializeOwned + Default,
{
    let payload = take_payload(raw, path)?;
    if payload.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(payload).map_err(|source| decode_error(path, source))
}

fn take_payload(raw: &[u8], path: &str) -> Result<Value, TelemetryError> {
    let mut envelope: Map<String, Value> =
        serde_json::from_slice(raw).map_err(|source| decode_error(path, source))?;
    match envelope.remove(path) {
        Some(payload) => Ok(payload),
        None => {
            tracing::error!(
                telemetry_path = %path,
                response_keys = ?envelope.keys().collect::<Vec<_>>(),
                "Telemetry response is not keyed by the requested path"
            );
            Err(TelemetryError::MissingKey {
                path: path.to_owned(),
            })
        }
    }
}

fn decode_error(path: &str, source: serde_json::Error) -> TelemetryError {
    TelemetryError::Decode {
        path: path.to_owned(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ethdev_list_in_order() {
        let raw = br#"{"/ethdev/list": [0, 2, 5]}"#;
        let decoded = decode(raw, ResponseKind::EthdevList).unwrap();
        assert_eq!(decoded, TelemetryResponse::EthdevList(vec![0, 2, 5]));
    }

    #[test]
    fn decodes_ethdev_info_ignoring_extra_fields() {
        let raw = br#"{"/ethdev/info": {"name": "0000:3b:00.0", "state": 1, "mtu": 1500}}"#;
        let decoded = decode(raw, ResponseKind::EthdevInfo).unwrap();
        assert_eq!(
            decoded,
            TelemetryResponse::EthdevInfo(EthdevInfo {
                name: "0000:3b:00.0".to_owned()
            })
        );
    }

    #[test]
    fn xstats_accept_integer_and_float_values() {
        let raw = br#"{"/ethdev/xstats": {"rx_good_packets": 12, "rx_bytes": 42.5}}"#;
        let TelemetryResponse::EthdevXstats(stats) =
            decode(raw, ResponseKind::EthdevXstats).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(stats.get("rx_good_packets"), Some(&12.0));
        assert_eq!(stats.get("rx_bytes"), Some(&42.5));
    }

    fn assert_xstats_reencode(raw: &[u8]) {
        let first = decode(raw, ResponseKind::EthdevXstats).unwrap();
        let reencoded = serde_json::to_vec(&first.to_json()).unwrap();
        let second = decode(&reencoded, ResponseKind::EthdevXstats).unwrap();
        assert_eq!(first, second, "{}", String::from_utf8_lossy(raw));
    }

    #[test]
    fn xstats_survive_reencoding() {
        let cases: &[&[u8]] = &[
            br#"{"/ethdev/xstats": {"rx_q0_packets": 7, "tx_bytes": 1024.25, "rx_missed_errors": 0}}"#,
            br#"{"/ethdev/xstats": {}}"#,
            br#"{"/ethdev/xstats": null}"#,
            br#"{"/ethdev/xstats": {"rx_bytes": 18446744073709551615, "tx_bytes": 9007199254740993}}"#,
            br#"{"/ethdev/xstats": {"rx_rate": 1.5e10, "tx_rate": 2.5E-3}}"#,
            r#"{"/ethdev/xstats": {"rx_q0_фрейм": 3, "数据包": 4}}"#.as_bytes(),
        ];
        for raw in cases {
            assert_xstats_reencode(raw);
        }
    }

    #[test]
    fn null_and_empty_xstats_reencode_to_empty_map() {
        let decoded = decode(br#"{"/ethdev/xstats": null}"#, ResponseKind::EthdevXstats).unwrap();
        assert_eq!(
            decoded.to_json(),
            serde_json::json!({"/ethdev/xstats": {}})
        );
    }

    #[test]
    fn typed_helpers_share_envelope_rules() {
        let ids: Vec<PortId> = decode_collection(br#"{"/ethdev/list": null}"#, "/ethdev/list").unwrap();
        assert!(ids.is_empty());

        let info: EthdevInfo =
            decode_payload(br#"{"/ethdev/info": {"name": "eth0"}}"#, "/ethdev/info").unwrap();
        assert_eq!(info.name, "eth0");

        assert!(matches!(
            decode_payload::<EthdevInfo>(br#"{"/ethdev/info": null}"#, "/ethdev/info"),
            Err(TelemetryError::Decode { .. })
        ));
        assert!(matches!(
            decode_collection::<Vec<PortId>>(br#"{"/ethdev/info": []}"#, "/ethdev/list"),
            Err(TelemetryError::MissingKey { .. })
        ));
    }

    #[test]
    fn graph_call_count_reads_nested_nodes() {
        let raw = br#"{"/dp_service/graph/call_count": {"Node_0_to_255": {"rx-0-0": 10, "cls": 3.0}}}"#;
        let TelemetryResponse::GraphCallCount(calls) =
            decode(raw, ResponseKind::GraphCallCount).unwrap()
        else {
            panic!("wrong variant");
        };
        assert_eq!(calls.nodes.len(), 2);
        assert_eq!(calls.nodes["rx-0-0"], 10.0);
    }

    #[test]
    fn null_payload_is_empty() {
        let raw = br#"{"/dp_service/virtsvc/used_port_count": null}"#;
        let decoded = decode(raw, ResponseKind::VirtsvcPortUsage).unwrap();
        assert_eq!(decoded, TelemetryResponse::VirtsvcPortUsage(BTreeMap::new()));
    }

    #[test]
    fn null_info_is_rejected() {
        let raw = br#"{"/ethdev/info": null}"#;
        assert!(matches!(
            decode(raw, ResponseKind::EthdevInfo),
            Err(TelemetryError::Decode { .. })
        ));
    }

    #[test]
    fn missing_key_is_rejected() {
        let raw = br#"{"/ethdev/list": [1]}"#;
        assert!(matches!(
            decode(raw, ResponseKind::NatPortUsage),
            Err(TelemetryError::MissingKey { path }) if path == "/dp_service/nat/used_port_count"
        ));
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let raw = br#"{"/dp_service/nat/used_port_count": {"eth0": "many"}}"#;
        assert!(matches!(
            decode(raw, ResponseKind::NatPortUsage),
            Err(TelemetryError::Decode { .. })
        ));
    }

    #[test]
    fn truncated_json_is_rejected() {
        let raw = br#"{"/ethdev/xstats": {"rx_bytes": 4"#;
        assert!(matches!(
            decode(raw, ResponseKind::EthdevXstats),
            Err(TelemetryError::Decode { .. })
        ));
    }
}
