// Ledger-facing types shared by the workflow handlers and the client.

pub mod client;
pub mod datum;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ChainError;

/// Target Cardano network of a payment source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "network_type", rename_all = "lowercase")]
pub enum Network {
    Preprod,
    Mainnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Preprod => "preprod",
            Network::Mainnet => "mainnet",
        }
    }

    /// Explorer hostname used in operator-facing log lines
    pub fn explorer_host(&self) -> &'static str {
        match self {
            Network::Preprod => "preprod.cardanoscan.io",
            Network::Mainnet => "cardanoscan.io",
        }
    }

    fn slot_config(&self) -> SlotConfig {
        match self {
            Network::Preprod => SlotConfig {
                zero_time_ms: 1_655_769_600_000,
                zero_slot: 86_400,
                slot_length_ms: 1_000,
            },
            Network::Mainnet => SlotConfig {
                zero_time_ms: 1_596_059_091_000,
                zero_slot: 4_492_800,
                slot_length_ms: 1_000,
            },
        }
    }

    /// Slot number enclosing a unix timestamp (milliseconds)
    pub fn enclosing_slot(&self, unix_ms: i64) -> u64 {
        let cfg = self.slot_config();
        let elapsed = (unix_ms - cfg.zero_time_ms).max(0) as u64;
        cfg.zero_slot + elapsed / cfg.slot_length_ms
    }
}

struct SlotConfig {
    zero_time_ms: i64,
    zero_slot: u64,
    slot_length_ms: u64,
}

/// Slot range outside of which a built transaction is no longer
/// submittable. Centered on "now" with a fixed half-width so a slow or
/// crashed pass cannot resubmit a stale transaction verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub invalid_before: u64,
    pub invalid_hereafter: u64,
}

pub const VALIDITY_HALF_WIDTH_MS: i64 = 150_000;

impl ValidityWindow {
    pub fn around(network: Network, now: DateTime<Utc>) -> Self {
        let now_ms = now.timestamp_millis();
        Self {
            invalid_before: network
                .enclosing_slot(now_ms - VALIDITY_HALF_WIDTH_MS)
                .saturating_sub(1),
            invalid_hereafter: network.enclosing_slot(now_ms + VALIDITY_HALF_WIDTH_MS) + 1,
        }
    }
}

/// One amount entry of a UTXO (lovelace or a native asset)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetAmount {
    /// "lovelace" or policy id + hex asset name
    pub unit: String,
    pub quantity: String,
}

/// An unspent transaction output as reported by the provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    pub address: String,
    pub amount: Vec<AssetAmount>,
    /// Inline datum in Plutus JSON constructor form, when present
    pub inline_datum: Option<serde_json::Value>,
}

/// Deterministic registry token name for the output a deregistration
/// burn spends: hash over the input's transaction id and output index.
/// Doubles as the on-chain uniqueness guarantee for the registration.
pub fn registry_asset_name(utxo: &Utxo) -> Result<String, ChainError> {
    let serialized = format!("{}{:08x}", utxo.tx_hash, utxo.output_index);
    let raw = hex::decode(&serialized)
        .map_err(|e| ChainError::InvalidDatum(format!("bad utxo reference: {}", e)))?;

    let digest = Sha256::digest(&raw);
    Ok(hex::encode(digest))
}
