// Module declarations
pub mod chain;
pub mod coin;
pub mod config;
pub mod decode;
pub mod deposit;
pub mod events;
pub mod receipt;
pub mod registry;
pub mod rpc;
pub mod vault;

// Re-export commonly used types
pub use config::{Config, Network};
pub use decode::DecodeError;
pub use deposit::{
    DepositError, DepositIntent, MoveCall, build_deposit_calls, plan_deposit, submit_deposit,
};
pub use events::{ShareRatioEvent, extract_history, format_share_ratio, share_ratio_history};
pub use receipt::{Receipt, user_receipts};
pub use registry::{VaultDescriptor, decode_registry, fetch_vaults};
pub use rpc::RpcClient;
pub use vault::{VaultDetail, vault_detail};
