use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::decode::{DecodeError, byte_string, id_string, u64_field};
use crate::rpc::RpcClient;

/// One vault as registered in the on-chain registry. Immutable once
/// decoded; the registry is always re-fetched wholesale, never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultDescriptor {
    pub vault_id: String,
    pub reward_manager_id: String,
    /// Fully-qualified type of the deposit asset, e.g. `0x..::usdc::USDC`.
    pub coin_type: String,
    pub created_at_ms: u64,
    pub creator: String,
}

/// Decodes the registry object's content tree into the vaults it lists.
///
/// The registry holds a Move VecMap:
/// `fields.vaults.fields.contents[].fields.{key, value}`, where each
/// `value.fields` carries the descriptor fields. Entries that do not
/// match that shape are logged and skipped; well-formed neighbors keep
/// their relative order.
pub fn decode_registry(content: &Value) -> Vec<VaultDescriptor> {
    let entries = content
        .get("fields")
        .and_then(|fields| fields.get("vaults"))
        .and_then(|vaults| vaults.get("fields"))
        .and_then(|fields| fields.get("contents"))
        .and_then(|contents| contents.as_array());

    let Some(entries) = entries else {
        warn!("registry content has no vaults/contents array");
        return Vec::new();
    };

    let mut vaults = Vec::with_capacity(entries.len());
    for (idx, entry) in entries.iter().enumerate() {
        match decode_vault_entry(entry) {
            Ok(vault) => vaults.push(vault),
            Err(e) => warn!("Skipping registry entry {}: {}", idx, e),
        }
    }
    vaults
}

/// Decodes one `{key, value}` VecMap entry into a descriptor.
pub fn decode_vault_entry(entry: &Value) -> Result<VaultDescriptor, DecodeError> {
    let fields = entry
        .get("fields")
        .ok_or(DecodeError::MissingField("fields"))?;
    let value = fields
        .get("value")
        .ok_or(DecodeError::MissingField("value"))?;
    let vault = value
        .get("fields")
        .ok_or(DecodeError::MissingField("value.fields"))?;

    Ok(VaultDescriptor {
        vault_id: id_string(vault.get("vault_id"), "vault_id")?,
        reward_manager_id: id_string(vault.get("reward_manager_id"), "reward_manager_id")?,
        coin_type: byte_string(vault.get("coin_type"), "coin_type")?,
        created_at_ms: u64_field(vault.get("created_at_ms"), "created_at_ms")?,
        creator: id_string(vault.get("creator"), "creator")?,
    })
}

/// Fetches and decodes the registry configured in `config`.
pub async fn fetch_vaults(rpc: &RpcClient, config: &Config) -> Result<Vec<VaultDescriptor>> {
    let content = rpc
        .object_content(&config.registry_id)
        .await
        .context("Failed to fetch vault registry object")?;
    let vaults = decode_registry(&content);
    debug!("Registry {} decoded {} vaults", config.registry_id, vaults.len());
    Ok(vaults)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entry(vault_id: &str, coin_type: Value) -> Value {
        json!({
            "fields": {
                "key": vault_id,
                "value": {
                    "type": "0xpkg::vault_registry::VaultInfo",
                    "fields": {
                        "vault_id": vault_id,
                        "reward_manager_id": "0xreward",
                        "coin_type": coin_type,
                        "created_at_ms": "1700000000000",
                        "creator": "0xcreator"
                    }
                }
            }
        })
    }

    fn registry(entries: Vec<Value>) -> Value {
        json!({
            "dataType": "moveObject",
            "fields": {
                "id": { "id": "0xregistry" },
                "admin": "0xadmin",
                "vaults": { "fields": { "contents": entries } }
            }
        })
    }

    #[test]
    fn test_decode_preserves_count_and_order() {
        let content = registry(vec![
            entry("0x1", json!("0xa::usdc::USDC")),
            entry("0x2", json!("0xb::sui::SUI")),
            entry("0x3", json!("0xc::usdt::USDT")),
        ]);
        let vaults = decode_registry(&content);
        assert_eq!(vaults.len(), 3);
        let ids: Vec<&str> = vaults.iter().map(|v| v.vault_id.as_str()).collect();
        assert_eq!(ids, ["0x1", "0x2", "0x3"]);
    }

    #[test]
    fn test_malformed_entries_are_skipped_in_place() {
        let content = registry(vec![
            entry("0x1", json!("0xa::usdc::USDC")),
            json!({ "fields": { "value": { "fields": { "vault_id": "0xbad" } } } }),
            json!("not even a map"),
            entry("0x2", json!("0xb::sui::SUI")),
        ]);
        let vaults = decode_registry(&content);
        assert_eq!(vaults.len(), 2);
        assert_eq!(vaults[0].vault_id, "0x1");
        assert_eq!(vaults[1].vault_id, "0x2");
    }

    #[test]
    fn test_coin_type_byte_array_is_normalized() {
        let content = registry(vec![entry("0x1", json!([85, 83, 68, 67]))]);
        let vaults = decode_registry(&content);
        assert_eq!(vaults[0].coin_type, "USDC");
    }

    #[test]
    fn test_numeric_created_at_and_wrapped_ids() {
        let entry = json!({
            "fields": {
                "value": {
                    "fields": {
                        "vault_id": { "id": "0x1" },
                        "reward_manager_id": { "id": "0xreward" },
                        "coin_type": "0xa::usdc::USDC",
                        "created_at_ms": 1700000000000u64,
                        "creator": "0xcreator"
                    }
                }
            }
        });
        let vault = decode_vault_entry(&entry).unwrap();
        assert_eq!(vault.vault_id, "0x1");
        assert_eq!(vault.reward_manager_id, "0xreward");
        assert_eq!(vault.created_at_ms, 1_700_000_000_000);
    }

    #[test]
    fn test_missing_contents_yields_empty() {
        assert!(decode_registry(&json!({ "dataType": "moveObject", "fields": {} })).is_empty());
        assert!(decode_registry(&json!(null)).is_empty());
    }

    #[test]
    fn test_missing_field_is_tagged() {
        let entry = json!({
            "fields": {
                "value": {
                    "fields": {
                        "vault_id": "0x1",
                        "coin_type": "0xa::usdc::USDC",
                        "created_at_ms": "1",
                        "creator": "0xcreator"
                    }
                }
            }
        });
        assert_eq!(
            decode_vault_entry(&entry),
            Err(DecodeError::MissingField("reward_manager_id"))
        );
    }
}
