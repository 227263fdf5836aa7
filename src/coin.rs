use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Config;
use crate::rpc::{ObjectRef, RpcClient, lenient_u64};

pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

/// A spendable coin object owned by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinObject {
    pub object_ref: ObjectRef,
    pub balance: u64,
}

impl CoinObject {
    pub fn object_id(&self) -> &str {
        &self.object_ref.object_id
    }
}

/// Short display symbol of a coin type: the last `::` path segment.
pub fn coin_symbol(coin_type: &str) -> &str {
    coin_type
        .rsplit("::")
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("COIN")
}

/// Resolves the number of decimals for a coin type. An explicit override
/// in `config` wins; otherwise fall back to a name heuristic (USDC has 6
/// decimals, SUI has 9, default 6). The heuristic is not a metadata
/// query and collides for distinct assets sharing a name segment, hence
/// the override path.
pub fn coin_decimals(config: &Config, coin_type: &str) -> u8 {
    if let Some(decimals) = config.decimals_override(coin_type) {
        return decimals;
    }
    let lower = coin_type.to_lowercase();
    if lower.contains("usdc") {
        6
    } else if lower.contains("sui") {
        9
    } else {
        6
    }
}

/// Lists the sender's coin objects of one type (`suix_getCoins`), in the
/// fullnode's order. The first entry is used for a deposit; merging
/// fragmented coins is left to the wallet.
pub async fn fetch_coins(rpc: &RpcClient, owner: &str, coin_type: &str) -> Result<Vec<CoinObject>> {
    let result = rpc
        .call("suix_getCoins", json!([owner, coin_type, null, null]))
        .await
        .with_context(|| format!("Failed to list {} coins", coin_symbol(coin_type)))?;

    let entries = result
        .get("data")
        .and_then(|d| d.as_array())
        .cloned()
        .unwrap_or_default();

    let mut coins = Vec::with_capacity(entries.len());
    for entry in &entries {
        coins.push(decode_coin(entry)?);
    }
    debug!("Owner {} holds {} {} coins", owner, coins.len(), coin_symbol(coin_type));
    Ok(coins)
}

fn decode_coin(entry: &Value) -> Result<CoinObject> {
    let object_id = entry
        .get("coinObjectId")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("coin entry missing coinObjectId"))?
        .to_string();
    let version = entry
        .get("version")
        .and_then(lenient_u64)
        .ok_or_else(|| anyhow!("coin {} missing version", object_id))?;
    let digest = entry
        .get("digest")
        .and_then(|v| v.as_str())
        .ok_or_else(|| anyhow!("coin {} missing digest", object_id))?
        .to_string();
    let balance = entry
        .get("balance")
        .and_then(lenient_u64)
        .ok_or_else(|| anyhow!("coin {} missing balance", object_id))?;
    Ok(CoinObject {
        object_ref: ObjectRef {
            object_id,
            version,
            digest,
        },
        balance,
    })
}

/// Formats a base-unit amount for display: full integer part, fraction
/// trimmed to at least two digits.
pub fn format_units(raw: u128, decimals: u8) -> String {
    let scale = 10u128.pow(decimals as u32);
    let whole = raw / scale;
    let mut frac = format!("{:0width$}", raw % scale, width = decimals as usize);
    while frac.len() > 2 && frac.ends_with('0') {
        frac.pop();
    }
    if frac.len() < 2 {
        // decimals 0 or 1
        frac = format!("{:0<2}", frac);
    }
    format!("{}.{}", whole, frac)
}
