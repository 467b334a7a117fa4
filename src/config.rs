//! Application configuration
//!
//! Defaults mirror the deployed Pharos testnet setup; a JSON file can
//! override any of it and the RPC URL can also come from the environment.

use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

use crate::errors::ChainError;

/// Environment variable overriding the RPC endpoint
pub const RPC_URL_ENV: &str = "PERPDESK_RPC_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_url: String,
    pub exchange_address: String,
    pub native_symbol: String,
    /// Seconds between receipt polls while waiting for finality
    pub receipt_poll_secs: u64,
    /// Receipt polls before the finality wait gives up
    pub finality_attempts: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            chain_id: 688_688,
            chain_name: "Pharos Testnet".to_string(),
            rpc_url: "https://testnet.dplabs-internal.com".to_string(),
            exchange_address: "0x7Bf11Cdd519E8B4544D28c8EA2a2F9f3Ca17cb4c".to_string(),
            native_symbol: "PHRS".to_string(),
            receipt_poll_secs: 2,
            finality_attempts: 60,
        }
    }
}

impl NetworkConfig {
    pub fn exchange_address(&self) -> Result<Address, ChainError> {
        Address::from_str(&self.exchange_address)
            .map_err(|e| ChainError::Rpc(format!("bad exchange address in config: {}", e)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub base_url: String,
    pub poll_interval_secs: u64,
    pub candle_lookback_days: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            base_url: crate::feed::DEFAULT_FEED_BASE_URL.to_string(),
            poll_interval_secs: 10,
            candle_lookback_days: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub refresh_interval_secs: u64,
    /// Slot probe bound; the contract exposes no position count
    pub max_position_slots: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 30,
            max_position_slots: crate::chain::MAX_POSITION_SLOTS,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub feed: FeedConfig,
    pub store: StoreConfig,
}

impl AppConfig {
    /// Load from a JSON file when given, defaults otherwise; the RPC URL
    /// environment override applies last
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        if let Ok(url) = std::env::var(RPC_URL_ENV) {
            config.network.rpc_url = url;
        }

        Ok(config)
    }
}
