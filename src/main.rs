use anyhow::Result;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vault_client::chain::sender_address;
use vault_client::coin::{coin_decimals, coin_symbol, format_units};
use vault_client::config::Config;
use vault_client::deposit::submit_deposit;
use vault_client::events::{format_share_ratio, share_ratio_history};
use vault_client::receipt::user_receipts;
use vault_client::registry::{VaultDescriptor, fetch_vaults};
use vault_client::rpc::RpcClient;
use vault_client::vault::vault_detail;

const DEFAULT_USDC_COIN_TYPE: &str =
    "0xea10912247c015ead590e481ae8545ff1518492dee41d6d03abdad828c1d2bde::usdc::USDC";

#[derive(Parser)]
#[command(name = "vault", about = "Client for on-chain deposit vaults", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all vaults registered in the on-chain registry
    Vaults,
    /// Show one vault's fee rate, total shares and latest share ratio
    Show { vault_id: String },
    /// Show the share-ratio history of a vault
    History {
        vault_id: String,
        /// Maximum number of events to fetch
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// List the receipts the configured account holds for a vault
    Receipts { vault_id: String },
    /// Show the configured account's balance for a coin type
    Balance {
        #[arg(long, env = "USDC_COIN_TYPE", default_value = DEFAULT_USDC_COIN_TYPE)]
        coin_type: String,
    },
    /// Deposit into a vault (wraps an existing receipt when one exists)
    Deposit {
        vault_id: String,
        /// Amount in whole coins, e.g. "10" or "2.5"
        #[arg(long)]
        amount: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let rpc = RpcClient::new(config.rpc_url.clone());

    match cli.command {
        Command::Vaults => {
            let vaults = fetch_vaults(&rpc, &config).await?;
            if vaults.is_empty() {
                println!("No vaults registered.");
                return Ok(());
            }
            for vault in &vaults {
                print_vault(vault);
            }
        }
        Command::Show { vault_id } => {
            let vault = find_vault(&rpc, &config, &vault_id).await?;
            let detail = vault_detail(&rpc, &config, &vault.vault_id).await?;
            print_vault(&vault);
            match detail.deposit_fee_rate {
                Some(rate) => println!("  deposit fee rate: {} bps", rate),
                None => println!("  deposit fee rate: unknown"),
            }
            match &detail.total_shares {
                Some(shares) => println!("  total shares:     {}", shares),
                None => println!("  total shares:     unknown"),
            }
            match &detail.share_ratio {
                Some(ratio) => println!("  share ratio:      {}", format_share_ratio(ratio)),
                None => println!("  share ratio:      no events yet"),
            }
        }
        Command::History { vault_id, limit } => {
            let history = share_ratio_history(&rpc, &config, &vault_id, limit).await?;
            if history.is_empty() {
                println!("No share ratio events for vault {}.", vault_id);
                return Ok(());
            }
            for item in &history {
                println!(
                    "{}  ratio {}  tx {}",
                    format_timestamp(item.timestamp_ms),
                    format_share_ratio(&item.share_ratio),
                    item.transaction_digest
                );
            }
        }
        Command::Receipts { vault_id } => {
            let owner = sender_address()?.to_string();
            let receipts = user_receipts(&rpc, &config, &owner, &vault_id).await?;
            if receipts.is_empty() {
                println!("No receipts for vault {}.", vault_id);
            }
            for receipt in &receipts {
                println!("{}  (vault {})", receipt.id, receipt.vault_id);
            }
        }
        Command::Balance { coin_type } => {
            let owner = sender_address()?.to_string();
            let balance = rpc.balance(&owner, &coin_type).await?;
            let decimals = coin_decimals(&config, &coin_type);
            println!(
                "{} {}",
                format_units(balance, decimals),
                coin_symbol(&coin_type)
            );
        }
        Command::Deposit { vault_id, amount } => {
            let vault = find_vault(&rpc, &config, &vault_id).await?;
            let digest = submit_deposit(&rpc, &config, &vault, &amount).await?;
            println!("Deposit submitted: {}", digest);
            println!("View on Suiscan: https://suiscan.xyz/tx/{}", digest);
        }
    }
    Ok(())
}

async fn find_vault(rpc: &RpcClient, config: &Config, vault_id: &str) -> Result<VaultDescriptor> {
    let vaults = fetch_vaults(rpc, config).await?;
    vaults
        .into_iter()
        .find(|vault| vault.vault_id == vault_id)
        .ok_or_else(|| anyhow::anyhow!("vault {} is not in the registry", vault_id))
}

fn print_vault(vault: &VaultDescriptor) {
    println!("{}", vault.vault_id);
    println!("  coin:           {}", vault.coin_type);
    println!("  reward manager: {}", vault.reward_manager_id);
    println!("  creator:        {}", vault.creator);
    println!("  created:        {}", format_timestamp(vault.created_at_ms));
}

fn format_timestamp(timestamp_ms: u64) -> String {
    let secs = (timestamp_ms / 1000) as i64;
    let nanos = ((timestamp_ms % 1000) * 1_000_000) as u32;
    match DateTime::from_timestamp(secs, nanos) {
        Some(datetime) => datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => format!("{} ms", timestamp_ms),
    }
}
