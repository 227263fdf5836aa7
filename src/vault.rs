use anyhow::{Context, Result};
use num_bigint::BigUint;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::events::{latest_share_ratio, share_ratio_value};
use crate::rpc::RpcClient;

/// Display-oriented detail of one vault object. Fee rate and total
/// shares come from the object's own fields; the share ratio comes from
/// the newest ShareRatioUpdated event (display only, never used for
/// deposit math).
#[derive(Debug, Clone, Default)]
pub struct VaultDetail {
    pub deposit_fee_rate: Option<u64>,
    pub total_shares: Option<BigUint>,
    pub share_ratio: Option<BigUint>,
}

/// Pulls `deposit_fee_rate` and `total_shares` out of a vault object's
/// content tree. Absent or ill-typed fields stay `None`; the vault
/// object layout varies across package versions.
pub fn decode_vault_fields(content: &Value) -> VaultDetail {
    let fields = content.get("fields");
    let deposit_fee_rate = fields
        .and_then(|f| f.get("deposit_fee_rate"))
        .and_then(crate::rpc::lenient_u64);
    let total_shares = fields
        .and_then(|f| f.get("total_shares"))
        .and_then(|shares| share_ratio_value(Some(shares)).ok());
    VaultDetail {
        deposit_fee_rate,
        total_shares,
        share_ratio: None,
    }
}

/// Fetches a vault object and the latest share ratio event for it.
pub async fn vault_detail(rpc: &RpcClient, config: &Config, vault_id: &str) -> Result<VaultDetail> {
    let content = rpc
        .object_content(vault_id)
        .await
        .context("Failed to fetch vault object")?;
    let mut detail = decode_vault_fields(&content);
    detail.share_ratio = latest_share_ratio(rpc, config, vault_id).await?;
    debug!(
        "Vault {}: fee_rate={:?} total_shares={:?}",
        vault_id, detail.deposit_fee_rate, detail.total_shares
    );
    Ok(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_vault_fields() {
        let content = json!({
            "dataType": "moveObject",
            "fields": {
                "deposit_fee_rate": "25",
                "total_shares": "123456789000000000",
            }
        });
        let detail = decode_vault_fields(&content);
        assert_eq!(detail.deposit_fee_rate, Some(25));
        assert_eq!(
            detail.total_shares,
            Some("123456789000000000".parse::<BigUint>().unwrap())
        );
    }

    #[test]
    fn test_missing_fields_stay_none() {
        let detail = decode_vault_fields(&json!({ "dataType": "moveObject", "fields": {} }));
        assert_eq!(detail.deposit_fee_rate, None);
        assert_eq!(detail.total_shares, None);
    }
}
