use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::decode::{DecodeError, id_string};
use crate::rpc::RpcClient;

/// A user-owned token proving a prior deposit into one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub id: String,
    pub vault_id: String,
}

/// Decodes a `suix_getOwnedObjects` response into the receipts that
/// belong to `vault_id`. Objects that do not carry the expected receipt
/// shape are logged and skipped.
pub fn decode_receipts(objects: &[Value], vault_id: &str) -> Vec<Receipt> {
    let mut receipts = Vec::new();
    for (idx, object) in objects.iter().enumerate() {
        match decode_receipt(object) {
            Ok(receipt) if receipt.vault_id == vault_id => receipts.push(receipt),
            Ok(_) => {} // receipt for another vault
            Err(e) => warn!("Skipping owned object {}: {}", idx, e),
        }
    }
    receipts
}

fn decode_receipt(object: &Value) -> Result<Receipt, DecodeError> {
    let data = object.get("data").ok_or(DecodeError::MissingField("data"))?;
    let id = id_string(data.get("objectId"), "objectId")?;
    let fields = data
        .get("content")
        .and_then(|content| content.get("fields"))
        .ok_or(DecodeError::MissingField("content.fields"))?;
    // vault_id arrives as a plain address or an `{id}` wrapper
    let vault_id = id_string(fields.get("vault_id"), "vault_id")?;
    Ok(Receipt { id, vault_id })
}

/// Fetches the receipts `owner` holds for one vault. Only the first one
/// is used when depositing; holding several is possible but rare.
pub async fn user_receipts(
    rpc: &RpcClient,
    config: &Config,
    owner: &str,
    vault_id: &str,
) -> Result<Vec<Receipt>> {
    let receipt_type = format!("{}::receipt::Receipt", config.package_id);
    let objects = rpc
        .owned_objects(owner, &receipt_type)
        .await
        .context("Failed to list receipt objects")?;
    let receipts = decode_receipts(&objects, vault_id);
    debug!(
        "Owner {} holds {} receipts for vault {}",
        owner,
        receipts.len(),
        vault_id
    );
    Ok(receipts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn owned_object(object_id: &str, vault_id: Value) -> Value {
        json!({
            "data": {
                "objectId": object_id,
                "version": "3",
                "digest": "Digest222",
                "content": {
                    "dataType": "moveObject",
                    "fields": { "id": { "id": object_id }, "vault_id": vault_id }
                }
            }
        })
    }

    #[test]
    fn test_filters_to_requested_vault() {
        let objects = vec![
            owned_object("0xr1", json!("0xvault-a")),
            owned_object("0xr2", json!("0xvault-b")),
            owned_object("0xr3", json!("0xvault-a")),
        ];
        let receipts = decode_receipts(&objects, "0xvault-a");
        assert_eq!(receipts.len(), 2);
        assert_eq!(receipts[0].id, "0xr1");
        assert_eq!(receipts[1].id, "0xr3");
    }

    #[test]
    fn test_wrapped_vault_id_is_coerced() {
        let objects = vec![owned_object("0xr1", json!({ "id": "0xvault-a" }))];
        let receipts = decode_receipts(&objects, "0xvault-a");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].vault_id, "0xvault-a");
    }

    #[test]
    fn test_malformed_object_is_skipped() {
        let objects = vec![
            json!({ "data": { "objectId": "0xr1" } }),
            owned_object("0xr2", json!("0xvault-a")),
        ];
        let receipts = decode_receipts(&objects, "0xvault-a");
        assert_eq!(receipts.len(), 1);
        assert_eq!(receipts[0].id, "0xr2");
    }
}
