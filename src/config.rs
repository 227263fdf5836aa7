use anyhow::{Context, Result};
use std::collections::HashMap;
use std::env;
use tracing::debug;

const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000000000000000000000000000";

const DEVNET_RPC_URL: &str = "https://fullnode.devnet.sui.io:443";
const TESTNET_RPC_URL: &str = "https://fullnode.testnet.sui.io:443";
const MAINNET_RPC_URL: &str = "https://fullnode.mainnet.sui.io:443";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Devnet,
    Testnet,
    Mainnet,
}

impl Network {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            _ => Err(anyhow::anyhow!(
                "Unknown network: {}. Please use 'devnet', 'testnet', or 'mainnet'.",
                s
            )),
        }
    }

    pub fn rpc_url(&self) -> &'static str {
        match self {
            Network::Devnet => DEVNET_RPC_URL,
            Network::Testnet => TESTNET_RPC_URL,
            Network::Mainnet => MAINNET_RPC_URL,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Devnet => "devnet",
            Network::Testnet => "testnet",
            Network::Mainnet => "mainnet",
        }
    }
}

/// Resolved client configuration. Built once and passed explicitly to the
/// functions that need it; nothing reads the environment after this point.
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    /// Package that publishes the vault, receipt and user_entry modules.
    pub package_id: String,
    /// Shared registry object holding the VecMap of vault descriptors.
    pub registry_id: String,
    /// Explicit per-coin-type decimals, preferred over the name heuristic.
    coin_decimals: HashMap<String, u8>,
}

impl Config {
    pub fn new(rpc_url: String, package_id: String, registry_id: String) -> Result<Self> {
        if package_id.is_empty() {
            return Err(anyhow::anyhow!("vault package id must not be empty"));
        }
        if registry_id.is_empty() || registry_id == ZERO_ADDRESS {
            return Err(anyhow::anyhow!(
                "vault registry id is not configured (got '{}')",
                registry_id
            ));
        }
        Ok(Self {
            rpc_url,
            package_id,
            registry_id,
            coin_decimals: HashMap::new(),
        })
    }

    /// Reads `VAULT_PACKAGE_ID`, `VAULT_REGISTRY_ID`, `SUI_CHAIN` (or an
    /// explicit `SUI_RPC_URL`) and optional `COIN_DECIMALS` overrides.
    /// Fails fast when the package or registry id is absent.
    pub fn from_env() -> Result<Self> {
        let package_id =
            env::var("VAULT_PACKAGE_ID").context("VAULT_PACKAGE_ID environment variable not set")?;
        let registry_id = env::var("VAULT_REGISTRY_ID")
            .context("VAULT_REGISTRY_ID environment variable not set")?;

        let rpc_url = match env::var("SUI_RPC_URL") {
            Ok(url) => url,
            Err(_) => {
                let chain = env::var("SUI_CHAIN").unwrap_or_else(|_| "testnet".to_string());
                Network::from_str(&chain)?.rpc_url().to_string()
            }
        };
        debug!("Using RPC URL: {}", rpc_url);

        let mut config = Self::new(rpc_url, package_id, registry_id)?;
        if let Ok(raw) = env::var("COIN_DECIMALS") {
            config.coin_decimals = parse_decimals_overrides(&raw)?;
        }
        Ok(config)
    }

    pub fn with_coin_decimals(mut self, coin_type: &str, decimals: u8) -> Self {
        self.coin_decimals.insert(coin_type.to_string(), decimals);
        self
    }

    pub fn decimals_override(&self, coin_type: &str) -> Option<u8> {
        self.coin_decimals.get(coin_type).copied()
    }
}

/// Parses `COIN_DECIMALS` entries of the form `"<coin_type>=<decimals>"`
/// separated by commas.
fn parse_decimals_overrides(raw: &str) -> Result<HashMap<String, u8>> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (coin_type, decimals) = entry
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("invalid COIN_DECIMALS entry: '{}'", entry))?;
        let decimals: u8 = decimals
            .trim()
            .parse()
            .with_context(|| format!("invalid decimals in COIN_DECIMALS entry: '{}'", entry))?;
        map.insert(coin_type.trim().to_string(), decimals);
    }
    Ok(map)
}
