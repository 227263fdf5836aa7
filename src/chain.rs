use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;
use sui_sdk_types as sui;
use tracing::debug;

/// The connected account: address plus signing key. `None`-like absence
/// (no env vars set) maps to the `NotConnected` deposit error upstream.
pub struct Signer {
    pub address: sui::Address,
    pub key: sui_crypto::ed25519::Ed25519PrivateKey,
}

/// Address of the connected account, for read-only queries that need an
/// owner but no key material.
pub fn sender_address() -> Result<sui::Address> {
    let addr = env::var("SUI_ADDRESS").context("SUI_ADDRESS environment variable not set")?;
    sui::Address::from_str(&addr).context("Failed to parse SUI_ADDRESS")
}

/// Loads the sender address and ed25519 secret key from `SUI_ADDRESS` /
/// `SUI_SECRET_KEY`. The key is accepted as bech32 `suiprivkey...`,
/// base64, or hex, with an optional leading scheme-flag byte.
pub fn load_signer() -> Result<Signer> {
    let address = sender_address()?;
    let raw = env::var("SUI_SECRET_KEY").context("SUI_SECRET_KEY environment variable not set")?;
    let key_part = raw
        .split_once(':')
        .map(|(_, b)| b.to_string())
        .unwrap_or(raw);

    let key = if key_part.starts_with("suiprivkey") {
        decode_bech32_key(&key_part)?
    } else {
        decode_raw_key(&key_part)?
    };
    Ok(Signer { address, key })
}

fn decode_bech32_key(encoded: &str) -> Result<sui_crypto::ed25519::Ed25519PrivateKey> {
    debug!("Decoding SUI_SECRET_KEY as bech32 suiprivkey");
    let (hrp, data, _variant) = bech32::decode(encoded)?;
    if hrp != "suiprivkey" {
        return Err(anyhow::anyhow!("invalid bech32 hrp"));
    }
    let bytes: Vec<u8> = bech32::convert_bits(&data, 5, 8, false)?;
    if bytes.len() != 33 {
        return Err(anyhow::anyhow!("bech32 payload must be 33 bytes (flag || key)"));
    }
    if bytes[0] != 0x00 {
        return Err(anyhow::anyhow!("unsupported key scheme flag; only ed25519 supported"));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes[1..]);
    Ok(sui_crypto::ed25519::Ed25519PrivateKey::new(arr))
}

fn decode_raw_key(key_part: &str) -> Result<sui_crypto::ed25519::Ed25519PrivateKey> {
    use base64ct::Encoding;
    let mut bytes = match base64ct::Base64::decode_vec(key_part) {
        Ok(v) => v,
        Err(_) => {
            debug!("SUI_SECRET_KEY not base64; trying hex");
            if let Some(hex_str) = key_part.strip_prefix("0x") {
                hex::decode(hex_str)?
            } else {
                hex::decode(key_part)?
            }
        }
    };

    // Strip the scheme-flag byte if present
    if !bytes.is_empty() && (bytes[0] == 0x00 || bytes.len() == 33) {
        bytes = bytes[1..].to_vec();
    }
    if bytes.len() < 32 {
        return Err(anyhow::anyhow!("SUI_SECRET_KEY must contain at least 32 bytes"));
    }

    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes[..32]);
    Ok(sui_crypto::ed25519::Ed25519PrivateKey::new(arr))
}
