use anyhow::{Context, Result};
use num_bigint::BigUint;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::Config;
use crate::decode::{DecodeError, id_string};
use crate::rpc::RpcClient;

/// Share ratios are fixed-point u256 values scaled by 10^9.
pub const SHARE_RATIO_DENOM: u64 = 1_000_000_000;

/// One event as returned by `suix_queryEvents`.
#[derive(Debug, Clone, Deserialize)]
pub struct SuiEvent {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(rename = "parsedJson", default)]
    pub parsed_json: Option<Value>,
    #[serde(rename = "timestampMs", default)]
    pub timestamp_ms: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventId {
    #[serde(rename = "txDigest")]
    pub tx_digest: String,
    #[serde(rename = "eventSeq")]
    pub event_seq: String,
}

/// One historical share-price observation for a vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareRatioEvent {
    pub share_ratio: BigUint,
    pub timestamp_ms: u64,
    /// Block-explorer reference for the emitting transaction.
    pub transaction_digest: String,
}

/// Projects raw ShareRatioUpdated events onto history entries for one
/// vault: filters by the embedded `vault_id`, parses the u256 ratio in
/// any of its wire shapes, and sorts by timestamp descending (stable, so
/// ties keep fetch order). Events that fail to parse are logged and
/// skipped.
pub fn extract_history(events: &[SuiEvent], vault_id: &str) -> Vec<ShareRatioEvent> {
    let mut history = Vec::new();
    for event in events {
        match parse_event(event, vault_id) {
            Ok(Some(item)) => history.push(item),
            Ok(None) => {} // different vault
            Err(e) => warn!("Skipping event {}: {}", event.id.tx_digest, e),
        }
    }
    history.sort_by(|a, b| b.timestamp_ms.cmp(&a.timestamp_ms));
    history
}

fn parse_event(event: &SuiEvent, vault_id: &str) -> Result<Option<ShareRatioEvent>, DecodeError> {
    let payload = event
        .parsed_json
        .as_ref()
        .ok_or(DecodeError::MissingField("parsedJson"))?;

    if id_string(payload.get("vault_id"), "vault_id")? != vault_id {
        return Ok(None);
    }

    let share_ratio = share_ratio_value(payload.get("share_ratio"))?;

    // Payload timestamps of zero (or unparseable ones) fall back to the
    // event envelope's own timestamp.
    let mut timestamp_ms = payload
        .get("timestamp")
        .and_then(crate::rpc::lenient_u64)
        .unwrap_or(0);
    if timestamp_ms == 0 {
        timestamp_ms = event
            .timestamp_ms
            .as_deref()
            .and_then(|ts| ts.parse().ok())
            .unwrap_or(0);
    }

    Ok(Some(ShareRatioEvent {
        share_ratio,
        timestamp_ms,
        transaction_digest: event.id.tx_digest.clone(),
    }))
}

/// Parses a u256 `share_ratio` field. It arrives as a decimal string, a
/// plain number, or a little-endian byte array (index 0 is the
/// least-significant byte).
pub(crate) fn share_ratio_value(value: Option<&Value>) -> Result<BigUint, DecodeError> {
    match value {
        None | Some(Value::Null) => Err(DecodeError::MissingField("share_ratio")),
        Some(Value::String(s)) => s
            .parse::<BigUint>()
            .map_err(|_| DecodeError::BadType("share_ratio")),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(BigUint::from)
            .ok_or(DecodeError::BadType("share_ratio")),
        Some(Value::Array(items)) => {
            let mut bytes = Vec::with_capacity(items.len());
            for item in items {
                let byte = item
                    .as_u64()
                    .filter(|b| *b <= u8::MAX as u64)
                    .ok_or(DecodeError::BadType("share_ratio"))?;
                bytes.push(byte as u8);
            }
            Ok(BigUint::from_bytes_le(&bytes))
        }
        Some(_) => Err(DecodeError::BadType("share_ratio")),
    }
}

/// Queries the most recent ShareRatioUpdated events (descending, capped
/// at `limit` by the query itself) and projects them for one vault.
pub async fn share_ratio_history(
    rpc: &RpcClient,
    config: &Config,
    vault_id: &str,
    limit: u32,
) -> Result<Vec<ShareRatioEvent>> {
    let event_type = format!("{}::vault::ShareRatioUpdated", config.package_id);
    let filter = json!({ "MoveEventType": event_type });

    let result = rpc
        .call("suix_queryEvents", json!([filter, null, limit, true]))
        .await
        .context("Failed to query share ratio events")?;

    let events: Vec<SuiEvent> = serde_json::from_value(
        result.get("data").cloned().unwrap_or_else(|| json!([])),
    )
    .context("Malformed suix_queryEvents response")?;

    debug!("Fetched {} ShareRatioUpdated events", events.len());
    Ok(extract_history(&events, vault_id))
}

/// Latest known share ratio for a vault, if any event exists.
pub async fn latest_share_ratio(
    rpc: &RpcClient,
    config: &Config,
    vault_id: &str,
) -> Result<Option<BigUint>> {
    let history = share_ratio_history(rpc, config, vault_id, 20).await?;
    Ok(history.into_iter().next().map(|item| item.share_ratio))
}

/// Renders a fixed-point share ratio with six fraction digits:
/// a ratio of 10^9 formats as "1.000000".
pub fn format_share_ratio(ratio: &BigUint) -> String {
    let denom = BigUint::from(SHARE_RATIO_DENOM);
    let whole = ratio / &denom;
    let frac = (ratio % &denom) / 1000u32;
    format!("{}.{:06}", whole, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(vault_id: &str, share_ratio: Value, timestamp: Value, digest: &str) -> SuiEvent {
        SuiEvent {
            id: EventId {
                tx_digest: digest.to_string(),
                event_seq: "0".to_string(),
            },
            event_type: "0xpkg::vault::ShareRatioUpdated".to_string(),
            parsed_json: Some(json!({
                "vault_id": vault_id,
                "share_ratio": share_ratio,
                "timestamp": timestamp,
            })),
            timestamp_ms: Some("1700000099999".to_string()),
        }
    }

    #[test]
    fn test_byte_array_ratio_is_little_endian() {
        assert_eq!(
            share_ratio_value(Some(&json!([1, 0, 0]))).unwrap(),
            BigUint::from(1u32)
        );
        assert_eq!(
            share_ratio_value(Some(&json!([0, 1, 0]))).unwrap(),
            BigUint::from(256u32)
        );
    }

    #[test]
    fn test_string_and_number_ratios() {
        assert_eq!(
            share_ratio_value(Some(&json!("123456789012345678901234567890"))).unwrap(),
            "123456789012345678901234567890".parse::<BigUint>().unwrap()
        );
        assert_eq!(
            share_ratio_value(Some(&json!(1000000000u64))).unwrap(),
            BigUint::from(1_000_000_000u64)
        );
        assert!(share_ratio_value(Some(&json!("ratio"))).is_err());
        assert!(share_ratio_value(None).is_err());
    }

    #[test]
    fn test_filters_by_vault_and_sorts_descending() {
        let events = vec![
            event("0xv1", json!("1000000000"), json!("100"), "tx-a"),
            event("0xv2", json!("2000000000"), json!("300"), "tx-b"),
            event("0xv1", json!("1100000000"), json!("200"), "tx-c"),
        ];
        let history = extract_history(&events, "0xv1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].transaction_digest, "tx-c");
        assert_eq!(history[0].timestamp_ms, 200);
        assert_eq!(history[1].transaction_digest, "tx-a");
    }

    #[test]
    fn test_zero_timestamp_falls_back_to_envelope() {
        let events = vec![event("0xv1", json!("1000000000"), json!("0"), "tx-a")];
        let history = extract_history(&events, "0xv1");
        assert_eq!(history[0].timestamp_ms, 1_700_000_099_999);
    }

    #[test]
    fn test_unparseable_event_is_skipped() {
        let mut bad = event("0xv1", json!("1000000000"), json!("100"), "tx-bad");
        bad.parsed_json = Some(json!({ "vault_id": "0xv1", "share_ratio": { "nested": 1 } }));
        let events = vec![
            bad,
            event("0xv1", json!("1000000000"), json!("100"), "tx-ok"),
        ];
        let history = extract_history(&events, "0xv1");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].transaction_digest, "tx-ok");
    }

    #[test]
    fn test_format_share_ratio() {
        assert_eq!(format_share_ratio(&BigUint::from(1_000_000_000u64)), "1.000000");
        assert_eq!(format_share_ratio(&BigUint::from(1_234_567_891u64)), "1.234567");
        assert_eq!(format_share_ratio(&BigUint::from(500_000u64)), "0.000500");
    }
}
