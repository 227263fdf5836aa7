use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};
use tracing::debug;

/// Thin JSON-RPC client over a Sui fullnode. All read-side queries
/// (objects, balances, coins, events) go through here; transaction
/// execution uses gRPC in `deposit.rs`.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

/// The (id, version, digest) triple needed to pass an owned object as a
/// transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub object_id: String,
    pub version: u64,
    pub digest: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        debug!("Sending {} request", method);
        let response = self
            .http
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request_body)
            .send()
            .await
            .with_context(|| format!("{} request failed", method))?;

        let response_json: Value = response
            .json()
            .await
            .with_context(|| format!("{} response is not JSON", method))?;

        if let Some(error) = response_json.get("error") {
            return Err(anyhow!("RPC error from {}: {}", method, error));
        }
        response_json
            .get("result")
            .cloned()
            .ok_or_else(|| anyhow!("missing result in {} response", method))
    }

    /// Fetches an object's `content` tree (`sui_getObject` with
    /// `showContent`). The nested `fields` maps in the returned value are
    /// what the decoders in `registry.rs`/`vault.rs` operate on.
    pub async fn object_content(&self, object_id: &str) -> Result<Value> {
        let result = self
            .call(
                "sui_getObject",
                json!([object_id, { "showContent": true, "showType": true }]),
            )
            .await?;
        result
            .get("data")
            .and_then(|d| d.get("content"))
            .cloned()
            .ok_or_else(|| anyhow!("object {} has no content", object_id))
    }

    /// Fetches the reference needed to use an owned object as a
    /// transaction input.
    pub async fn object_ref(&self, object_id: &str) -> Result<ObjectRef> {
        let result = self.call("sui_getObject", json!([object_id, {}])).await?;
        let data = result
            .get("data")
            .ok_or_else(|| anyhow!("object {} not found", object_id))?;
        Ok(ObjectRef {
            object_id: string_field(data, "objectId")?,
            version: version_field(data)?,
            digest: string_field(data, "digest")?,
        })
    }

    /// Returns the initial shared version of a shared object, required
    /// when referencing it as a shared transaction input.
    pub async fn initial_shared_version(&self, object_id: &str) -> Result<u64> {
        let result = self
            .call("sui_getObject", json!([object_id, { "showOwner": true }]))
            .await?;
        let shared = result
            .get("data")
            .and_then(|d| d.get("owner"))
            .and_then(|o| o.get("Shared"))
            .ok_or_else(|| anyhow!("object {} is not shared", object_id))?;
        let version = shared
            .get("initial_shared_version")
            .ok_or_else(|| anyhow!("object {} has no initial shared version", object_id))?;
        lenient_u64(version)
            .ok_or_else(|| anyhow!("object {} has malformed initial shared version", object_id))
    }

    /// Lists objects owned by `owner` matching a Move struct type, with
    /// content included (`suix_getOwnedObjects` with a `StructType`
    /// filter). Returns the raw entries for the caller to decode.
    pub async fn owned_objects(&self, owner: &str, struct_type: &str) -> Result<Vec<Value>> {
        let result = self
            .call(
                "suix_getOwnedObjects",
                json!([
                    owner,
                    {
                        "filter": { "StructType": struct_type },
                        "options": { "showContent": true, "showType": true }
                    },
                    null,
                    null
                ]),
            )
            .await?;
        Ok(result
            .get("data")
            .and_then(|d| d.as_array())
            .cloned()
            .unwrap_or_default())
    }

    /// Total balance of a coin type in base units (`suix_getBalance`).
    pub async fn balance(&self, owner: &str, coin_type: &str) -> Result<u128> {
        let result = self
            .call("suix_getBalance", json!([owner, coin_type]))
            .await?;
        let total = result
            .get("totalBalance")
            .and_then(|b| b.as_str())
            .ok_or_else(|| anyhow!("missing totalBalance for {}", coin_type))?;
        total
            .parse()
            .with_context(|| format!("malformed totalBalance '{}'", total))
    }

    pub async fn reference_gas_price(&self) -> Result<u64> {
        let result = self.call("suix_getReferenceGasPrice", json!([])).await?;
        lenient_u64(&result).ok_or_else(|| anyhow!("malformed reference gas price: {}", result))
    }
}

fn string_field(value: &Value, name: &str) -> Result<String> {
    value
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .ok_or_else(|| anyhow!("missing '{}' in object data", name))
}

fn version_field(data: &Value) -> Result<u64> {
    data.get("version")
        .and_then(lenient_u64)
        .ok_or_else(|| anyhow!("missing or malformed object version"))
}

/// Accepts a JSON number or a decimal string; the fullnode uses both
/// representations for u64 fields depending on the endpoint.
pub(crate) fn lenient_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
