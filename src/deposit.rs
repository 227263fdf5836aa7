use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use sui_crypto::SuiSigner;
use sui_rpc::Client as GrpcClient;
use sui_rpc::field::FieldMask;
use sui_rpc::proto::sui::rpc::v2beta2 as proto;
use sui_sdk_types as sui;
use sui_transaction_builder::{Function, Serialized, TransactionBuilder, unresolved};
use thiserror::Error;
use tracing::{debug, info};

use crate::chain::{Signer, load_signer};
use crate::coin::{CoinObject, SUI_COIN_TYPE, coin_decimals, coin_symbol, fetch_coins};
use crate::config::Config;
use crate::receipt::user_receipts;
use crate::registry::VaultDescriptor;
use crate::rpc::{ObjectRef, RpcClient};

pub const CLOCK_OBJECT_ID: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000006";
/// Sui framework package publishing `std::option`.
const OPTION_PACKAGE_ID: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000001";

/// Minimum deposit in whole units of the vault's coin.
pub const MIN_DEPOSIT_WHOLE_UNITS: u64 = 1;
const DEPOSIT_GAS_BUDGET: u64 = 100_000_000; // 0.1 SUI
const SUBMISSION_LOCK_TIMEOUT_SECS: u64 = 60;

/// Expected shares are not derived from any share-price computation; the
/// contract accepts zero as "no expectation". BCS encodes a u256 as 32
/// little-endian bytes.
const EXPECTED_SHARES_ZERO: [u8; 32] = [0u8; 32];

#[derive(Error, Debug)]
pub enum DepositError {
    #[error("no connected account; set SUI_ADDRESS and SUI_SECRET_KEY")]
    NotConnected,
    #[error("please enter a valid amount")]
    InvalidAmount,
    #[error("minimum investment is {MIN_DEPOSIT_WHOLE_UNITS} {symbol}")]
    BelowMinimum { symbol: String },
    #[error("no {symbol} coins available to deposit")]
    NoMatchingCoin { symbol: String },
    #[error("a deposit for this vault is already in flight")]
    AlreadyInFlight,
    #[error("deposit failed: {0}")]
    SubmissionFailed(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A validated deposit: the amount scaled to base units, ready to become
/// a u64 contract argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositIntent {
    pub amount_units: u64,
    pub decimals: u8,
}

/// One contract call in a planned transaction. Object arguments carry
/// only ids here; versions and digests are resolved at submission time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveCall {
    pub package: String,
    pub module: String,
    pub function: String,
    pub type_args: Vec<String>,
    pub args: Vec<CallArg>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    Shared { id: String, mutable: bool },
    Owned { id: String },
    U64(u64),
    /// 32 little-endian bytes, the BCS form of a u256.
    U256([u8; 32]),
    Result { call: usize },
}

/// Validates a deposit request. Checks run in a fixed order and the
/// first failure wins: connection, amount shape, minimum.
pub fn plan_deposit(
    vault: &VaultDescriptor,
    amount_input: &str,
    decimals: u8,
    connected: bool,
) -> Result<DepositIntent, DepositError> {
    if !connected {
        return Err(DepositError::NotConnected);
    }
    let amount_units = parse_units(amount_input, decimals).ok_or(DepositError::InvalidAmount)?;
    if !amount_input.contains(|c: char| ('1'..='9').contains(&c)) {
        return Err(DepositError::InvalidAmount);
    }
    let min_units = MIN_DEPOSIT_WHOLE_UNITS * 10u64.pow(decimals as u32);
    if amount_units < min_units {
        return Err(DepositError::BelowMinimum {
            symbol: coin_symbol(&vault.coin_type).to_string(),
        });
    }
    Ok(DepositIntent {
        amount_units,
        decimals,
    })
}

/// Scales a decimal string to base units: `floor(amount * 10^decimals)`,
/// computed digit by digit so no float ever touches the amount. Returns
/// `None` for anything that is not a plain unsigned decimal, or on u64
/// overflow.
pub fn parse_units(input: &str, decimals: u8) -> Option<u64> {
    let s = input.trim();
    let (int_part, frac_part) = match s.split_once('.') {
        Some((int, frac)) => (int, frac),
        None => (s, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let mut units: u64 = 0;
    for b in int_part.bytes() {
        units = units.checked_mul(10)?.checked_add((b - b'0') as u64)?;
    }
    // exactly `decimals` fraction digits; extras truncate (floor)
    let mut frac = frac_part.bytes();
    for _ in 0..decimals {
        let digit = frac.next().map(|b| (b - b'0') as u64).unwrap_or(0);
        units = units.checked_mul(10)?.checked_add(digit)?;
    }
    Some(units)
}

/// Assembles the ordered call sequence for a deposit: wrap the receipt
/// (or its absence) in an `Option`, then call the vault entry point with
/// the wrapped value, the scaled amount, and the shared clock.
pub fn build_deposit_calls(
    config: &Config,
    vault: &VaultDescriptor,
    intent: &DepositIntent,
    coin_id: &str,
    receipt_id: Option<&str>,
) -> Vec<MoveCall> {
    let receipt_type = format!("{}::receipt::Receipt", config.package_id);

    let wrap = match receipt_id {
        Some(id) => MoveCall {
            package: OPTION_PACKAGE_ID.to_string(),
            module: "option".to_string(),
            function: "some".to_string(),
            type_args: vec![receipt_type],
            args: vec![CallArg::Owned { id: id.to_string() }],
        },
        None => MoveCall {
            package: OPTION_PACKAGE_ID.to_string(),
            module: "option".to_string(),
            function: "none".to_string(),
            type_args: vec![receipt_type],
            args: vec![],
        },
    };

    let deposit = MoveCall {
        package: config.package_id.clone(),
        module: "user_entry".to_string(),
        function: "deposit_with_auto_transfer".to_string(),
        type_args: vec![vault.coin_type.clone()],
        args: vec![
            CallArg::Shared {
                id: vault.vault_id.clone(),
                mutable: true,
            },
            CallArg::Shared {
                id: vault.reward_manager_id.clone(),
                mutable: true,
            },
            CallArg::Owned {
                id: coin_id.to_string(),
            },
            CallArg::U64(intent.amount_units),
            CallArg::U256(EXPECTED_SHARES_ZERO),
            CallArg::Result { call: 0 },
            CallArg::Shared {
                id: CLOCK_OBJECT_ID.to_string(),
                mutable: false,
            },
        ],
    };

    vec![wrap, deposit]
}

/// Validates, plans, signs and executes a deposit, returning the
/// transaction digest. One attempt only; a rejected submission is
/// surfaced once and the caller must resubmit. A second call for the
/// same vault and sender while one is pending fails with
/// `AlreadyInFlight` instead of double-submitting.
pub async fn submit_deposit(
    rpc: &RpcClient,
    config: &Config,
    vault: &VaultDescriptor,
    amount_input: &str,
) -> Result<String, DepositError> {
    let signer = load_signer().map_err(|e| {
        debug!("No signing account available: {}", e);
        DepositError::NotConnected
    })?;
    let sender = signer.address.to_string();

    let decimals = coin_decimals(config, &vault.coin_type);
    let intent = plan_deposit(vault, amount_input, decimals, true)?;

    let _guard = submission_locks()
        .try_acquire(&vault.vault_id, &sender)
        .ok_or(DepositError::AlreadyInFlight)?;

    let coins = fetch_coins(rpc, &sender, &vault.coin_type).await?;
    let Some(coin) = coins.first() else {
        return Err(DepositError::NoMatchingCoin {
            symbol: coin_symbol(&vault.coin_type).to_string(),
        });
    };

    // First matching receipt wins; the rest are ignored for this deposit.
    let receipts = user_receipts(rpc, config, &sender, &vault.vault_id).await?;
    let receipt_id = receipts.first().map(|r| r.id.clone());
    if let Some(id) = &receipt_id {
        debug!("Using existing receipt {}", id);
    }

    let calls = build_deposit_calls(config, vault, &intent, coin.object_id(), receipt_id.as_deref());
    let tx = resolve_transaction(rpc, &signer, &calls, coin).await?;
    let sig = signer
        .key
        .sign_transaction(&tx)
        .map_err(|e| anyhow!("Failed to sign transaction: {}", e))?;

    execute(config, tx, sig).await
}

/// Resolves a call plan onto the transaction builder: gas, shared
/// versions, owned object references, pure arguments.
async fn resolve_transaction(
    rpc: &RpcClient,
    signer: &Signer,
    calls: &[MoveCall],
    deposit_coin: &CoinObject,
) -> Result<sui::Transaction, DepositError> {
    let mut tb = TransactionBuilder::new();
    tb.set_sender(signer.address);
    tb.set_gas_budget(DEPOSIT_GAS_BUDGET);
    tb.set_gas_price(rpc.reference_gas_price().await?);

    let gas = pick_gas_coin(rpc, &signer.address.to_string(), deposit_coin.object_id()).await?;
    let gas_ref = object_reference(&gas.object_ref)?;
    tb.add_gas_objects(vec![unresolved::Input::owned(
        *gas_ref.object_id(),
        gas_ref.version(),
        *gas_ref.digest(),
    )]);
    debug!("Gas object added: {:?}", gas_ref);

    let mut results: Vec<sui::Argument> = Vec::with_capacity(calls.len());
    for call in calls {
        let mut args = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            let resolved = match arg {
                CallArg::Shared { id, mutable } => {
                    // The system clock is created at genesis with shared
                    // version 1; everything else is asked for its own.
                    let version = if id == CLOCK_OBJECT_ID {
                        1
                    } else {
                        rpc.initial_shared_version(id).await?
                    };
                    tb.input(unresolved::Input::shared(parse_address(id)?, version, *mutable))
                }
                CallArg::Owned { id } => {
                    let object = if id == deposit_coin.object_id() {
                        deposit_coin.object_ref.clone()
                    } else {
                        rpc.object_ref(id).await?
                    };
                    let reference = object_reference(&object)?;
                    tb.input(unresolved::Input::owned(
                        *reference.object_id(),
                        reference.version(),
                        *reference.digest(),
                    ))
                }
                CallArg::U64(value) => tb.input(Serialized(value)),
                CallArg::U256(bytes) => tb.input(Serialized(bytes)),
                CallArg::Result { call } => *results
                    .get(*call)
                    .ok_or_else(|| anyhow!("call plan references result {} before it exists", call))?,
            };
            args.push(resolved);
        }

        let function = Function::new(
            parse_address(&call.package)?,
            call.module
                .parse()
                .map_err(|e| anyhow!("Failed to parse module name '{}': {}", call.module, e))?,
            call.function
                .parse()
                .map_err(|e| anyhow!("Failed to parse function name '{}': {}", call.function, e))?,
            parse_type_args(&call.type_args)?,
        );
        results.push(tb.move_call(function, args));
    }

    Ok(tb
        .finish()
        .map_err(|e| anyhow!("Failed to finalize transaction: {}", e))?)
}

/// Executes a signed transaction once via gRPC and reports the digest.
async fn execute(
    config: &Config,
    tx: sui::Transaction,
    sig: sui::UserSignature,
) -> Result<String, DepositError> {
    let mut grpc = GrpcClient::new(config.rpc_url.clone())
        .map_err(|e| anyhow!("Failed to create gRPC client: {}", e))?;
    let mut exec = grpc.execution_client();
    let mut req = proto::ExecuteTransactionRequest::default();
    req.transaction = Some(tx.into());
    req.signatures = vec![sig.into()];
    req.read_mask = Some(FieldMask {
        paths: vec!["finality".into(), "transaction".into()],
    });

    debug!("Sending deposit transaction...");
    let tx_start = Instant::now();
    let resp = exec
        .execute_transaction(req)
        .await
        .map_err(|e| DepositError::SubmissionFailed(e.to_string()))?;
    let tx_resp = resp.into_inner();

    if tx_resp.finality.is_none() {
        return Err(DepositError::SubmissionFailed(
            "transaction did not achieve finality".to_string(),
        ));
    }
    let digest = tx_resp
        .transaction
        .as_ref()
        .and_then(|t| t.digest.clone())
        .ok_or_else(|| anyhow!("Missing transaction digest in response"))?;

    info!(
        "Deposit executed: {} (took {}ms)",
        digest,
        tx_start.elapsed().as_millis()
    );
    Ok(digest)
}

/// Picks a SUI coin for gas, skipping the coin being deposited (they
/// collide when the vault's asset is SUI itself).
async fn pick_gas_coin(
    rpc: &RpcClient,
    sender: &str,
    deposit_coin_id: &str,
) -> Result<CoinObject> {
    let coins = fetch_coins(rpc, sender, SUI_COIN_TYPE).await?;
    coins
        .into_iter()
        .find(|coin| coin.object_id() != deposit_coin_id)
        .ok_or_else(|| anyhow!("no SUI coin available to pay gas"))
}

fn parse_address(id: &str) -> Result<sui::Address> {
    sui::Address::from_str(id).map_err(|e| anyhow!("Failed to parse address '{}': {}", id, e))
}

fn object_reference(object: &ObjectRef) -> Result<sui::ObjectReference> {
    let id = parse_address(&object.object_id)?;
    let digest = object
        .digest
        .parse()
        .map_err(|e| anyhow!("Failed to parse digest '{}': {}", object.digest, e))?;
    Ok(sui::ObjectReference::new(id, object.version, digest))
}

fn parse_type_args(type_args: &[String]) -> Result<Vec<sui::TypeTag>> {
    type_args
        .iter()
        .map(|t| {
            t.parse()
                .map_err(|e| anyhow!("Failed to parse type tag '{}': {}", t, e))
        })
        .collect()
}

/// RAII guard for one in-flight submission. Dropping it (on success or
/// failure) releases the slot.
pub struct SubmissionGuard {
    locks: SubmissionLocks,
    key: (String, String),
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        self.locks.release(&self.key);
    }
}

/// Tracks in-flight deposits keyed by (vault, sender) so a user cannot
/// trigger two submissions before the first settles. Stale entries are
/// expired on access in case a guard leaks across an abort.
#[derive(Clone)]
pub struct SubmissionLocks {
    locks: Arc<Mutex<HashMap<(String, String), Instant>>>,
    timeout: Duration,
}

impl SubmissionLocks {
    pub fn new(timeout_seconds: u64) -> Self {
        Self {
            locks: Arc::new(Mutex::new(HashMap::new())),
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn try_acquire(&self, vault_id: &str, sender: &str) -> Option<SubmissionGuard> {
        let mut locks = self.locks.lock();
        let now = Instant::now();
        locks.retain(|_, started| now.duration_since(*started) < self.timeout);

        let key = (vault_id.to_string(), sender.to_string());
        use std::collections::hash_map::Entry;
        match locks.entry(key.clone()) {
            Entry::Occupied(_) => None,
            Entry::Vacant(entry) => {
                entry.insert(now);
                Some(SubmissionGuard {
                    locks: self.clone(),
                    key,
                })
            }
        }
    }

    fn release(&self, key: &(String, String)) {
        self.locks.lock().remove(key);
    }
}

static SUBMISSION_LOCKS: OnceLock<SubmissionLocks> = OnceLock::new();

fn submission_locks() -> &'static SubmissionLocks {
    SUBMISSION_LOCKS.get_or_init(|| SubmissionLocks::new(SUBMISSION_LOCK_TIMEOUT_SECS))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> VaultDescriptor {
        VaultDescriptor {
            vault_id: "0xvault".to_string(),
            reward_manager_id: "0xreward".to_string(),
            coin_type: "0xea1::usdc::USDC".to_string(),
            created_at_ms: 1_700_000_000_000,
            creator: "0xcreator".to_string(),
        }
    }

    fn config() -> Config {
        Config::new(
            "https://fullnode.testnet.sui.io:443".to_string(),
            "0xpkg".to_string(),
            "0xregistry".to_string(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_units_scales_and_floors() {
        assert_eq!(parse_units("10", 6), Some(10_000_000));
        assert_eq!(parse_units("0.5", 6), Some(500_000));
        assert_eq!(parse_units("1.2345678", 6), Some(1_234_567));
        assert_eq!(parse_units(".5", 6), Some(500_000));
        assert_eq!(parse_units("2.", 9), Some(2_000_000_000));
    }

    #[test]
    fn test_parse_units_rejects_garbage() {
        assert_eq!(parse_units("", 6), None);
        assert_eq!(parse_units(".", 6), None);
        assert_eq!(parse_units("-1", 6), None);
        assert_eq!(parse_units("1e9", 6), None);
        assert_eq!(parse_units("1.2.3", 6), None);
        assert_eq!(parse_units("abc", 6), None);
        // would overflow u64 after scaling
        assert_eq!(parse_units("18446744073709551616", 0), None);
        assert_eq!(parse_units("18446744073709", 6), None);
    }

    #[test]
    fn test_validation_order() {
        let vault = vault();
        // connection is checked before the amount
        assert!(matches!(
            plan_deposit(&vault, "not a number", 6, false),
            Err(DepositError::NotConnected)
        ));
        assert!(matches!(
            plan_deposit(&vault, "not a number", 6, true),
            Err(DepositError::InvalidAmount)
        ));
        assert!(matches!(
            plan_deposit(&vault, "0", 6, true),
            Err(DepositError::InvalidAmount)
        ));
    }

    #[test]
    fn test_below_minimum_carries_symbol() {
        match plan_deposit(&vault(), "0.5", 6, true) {
            Err(DepositError::BelowMinimum { symbol }) => assert_eq!(symbol, "USDC"),
            other => panic!("expected BelowMinimum, got {:?}", other),
        }
        // positive but rounding to zero units is still a minimum failure
        assert!(matches!(
            plan_deposit(&vault(), "0.0000001", 6, true),
            Err(DepositError::BelowMinimum { .. })
        ));
    }

    #[test]
    fn test_plan_deposit_scaled_amount() {
        let intent = plan_deposit(&vault(), "10", 6, true).unwrap();
        assert_eq!(intent.amount_units, 10_000_000);
    }

    #[test]
    fn test_call_plan_with_and_without_receipt() {
        let config = config();
        let vault = vault();
        let intent = DepositIntent {
            amount_units: 10_000_000,
            decimals: 6,
        };

        let with = build_deposit_calls(&config, &vault, &intent, "0xcoin", Some("0xreceipt"));
        let without = build_deposit_calls(&config, &vault, &intent, "0xcoin", None);

        assert_eq!(with.len(), 2);
        assert_eq!(without.len(), 2);

        assert_eq!(with[0].function, "some");
        assert_eq!(
            with[0].args,
            vec![CallArg::Owned { id: "0xreceipt".to_string() }]
        );
        assert_eq!(without[0].function, "none");
        assert!(without[0].args.is_empty());
        assert_eq!(with[0].type_args, vec!["0xpkg::receipt::Receipt".to_string()]);
        assert_eq!(with[0].type_args, without[0].type_args);

        // the deposit call itself is identical either way
        assert_eq!(with[1], without[1]);
        assert_eq!(with[1].function, "deposit_with_auto_transfer");
        assert_eq!(with[1].type_args, vec![vault.coin_type.clone()]);
        assert_eq!(
            with[1].args[0],
            CallArg::Shared { id: "0xvault".to_string(), mutable: true }
        );
        assert_eq!(with[1].args[3], CallArg::U64(10_000_000));
        assert_eq!(with[1].args[4], CallArg::U256(EXPECTED_SHARES_ZERO));
        assert_eq!(with[1].args[5], CallArg::Result { call: 0 });
        assert_eq!(
            with[1].args[6],
            CallArg::Shared { id: CLOCK_OBJECT_ID.to_string(), mutable: false }
        );
    }

    #[test]
    fn test_submission_lock_is_exclusive_per_key() {
        let locks = SubmissionLocks::new(60);
        let guard = locks.try_acquire("0xvault", "0xsender");
        assert!(guard.is_some());
        assert!(locks.try_acquire("0xvault", "0xsender").is_none());
        // a different vault or sender is unaffected
        assert!(locks.try_acquire("0xother", "0xsender").is_some());
        assert!(locks.try_acquire("0xvault", "0xother").is_some());

        drop(guard);
        assert!(locks.try_acquire("0xvault", "0xsender").is_some());
    }

    #[test]
    fn test_stale_submission_lock_expires() {
        let locks = SubmissionLocks::new(0);
        let guard = locks.try_acquire("0xvault", "0xsender").unwrap();
        std::mem::forget(guard);
        assert!(locks.try_acquire("0xvault", "0xsender").is_some());
    }
}
