//! Exchange contract interface
//!
//! The contract surface is fixed: a public `traderPositions` mapping getter
//! for reads, and `openPosition`/`closePosition` for writes. Writes are two
//! phase on the ledger side: submission returns a hash, finality is a
//! separate wait on the receipt.

use std::sync::Arc;

use async_trait::async_trait;
use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, TransactionRequest, H256, U256};
use ethers_core::utils::id;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use crate::chain::rpc::RpcClient;
use crate::chain::signer::PrivateKeySigner;
use crate::chain::types::RawPosition;
use crate::errors::ChainError;

/// Contract surface consumed by the rest of the crate
///
/// Split behind a trait so the position reader and store can be exercised
/// against an in-memory ledger in tests.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Read one position slot; fails per-slot (revert past the end of the
    /// array, node errors)
    async fn trader_positions(&self, trader: Address, slot: u64) -> Result<RawPosition, ChainError>;

    /// Submit an openPosition transaction; margin is sent as the tx value
    async fn submit_open(
        &self,
        pair: &str,
        is_long: bool,
        leverage: u64,
        margin_wei: U256,
    ) -> Result<H256, ChainError>;

    /// Submit a closePosition transaction
    async fn submit_close(&self, slot: u64) -> Result<H256, ChainError>;

    /// Wait for a submitted transaction to reach finality
    async fn wait_for_finality(&self, tx_hash: H256) -> Result<(), ChainError>;
}

/// Production ledger over JSON-RPC
pub struct FuturesExchange {
    rpc: Arc<RpcClient>,
    contract: Address,
    signer: Arc<PrivateKeySigner>,
    receipt_poll: Duration,
    finality_attempts: u32,
}

impl FuturesExchange {
    pub fn new(
        rpc: Arc<RpcClient>,
        contract: Address,
        signer: Arc<PrivateKeySigner>,
        receipt_poll: Duration,
        finality_attempts: u32,
    ) -> Self {
        Self {
            rpc,
            contract,
            signer,
            receipt_poll,
            finality_attempts,
        }
    }

    /// Build, sign and submit a contract call transaction
    async fn submit(&self, calldata: Vec<u8>, value: U256) -> Result<H256, ChainError> {
        let from = self.signer.address();

        let gas = self
            .rpc
            .estimate_gas(from, self.contract, &calldata, value)
            .await?;
        let gas_price = self.rpc.gas_price().await?;
        let nonce = self.rpc.transaction_count(from).await?;

        let tx = TransactionRequest::new()
            .from(from)
            .to(self.contract)
            .data(calldata)
            .value(value)
            // headroom over the node's estimate
            .gas(gas.saturating_mul(U256::from(12u64)) / U256::from(10u64))
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(self.signer.chain_id());

        let raw = self.signer.sign_transaction(&tx)?;
        let tx_hash = self.rpc.send_raw_transaction(raw).await?;
        info!("Submitted transaction {:?}", tx_hash);
        Ok(tx_hash)
    }
}

#[async_trait]
impl Ledger for FuturesExchange {
    async fn trader_positions(
        &self,
        trader: Address,
        slot: u64,
    ) -> Result<RawPosition, ChainError> {
        let mut calldata = id("traderPositions(address,uint256)").to_vec();
        calldata.extend(abi::encode(&[
            Token::Address(trader),
            Token::Uint(U256::from(slot)),
        ]));

        let output = self.rpc.call(self.contract, calldata).await?;
        decode_position(&output)
    }

    async fn submit_open(
        &self,
        pair: &str,
        is_long: bool,
        leverage: u64,
        margin_wei: U256,
    ) -> Result<H256, ChainError> {
        let mut calldata = id("openPosition(string,bool,uint256,uint256)").to_vec();
        calldata.extend(abi::encode(&[
            Token::String(pair.to_string()),
            Token::Bool(is_long),
            Token::Uint(U256::from(leverage)),
            Token::Uint(margin_wei),
        ]));

        debug!(
            "Opening {} {} at {}x with margin {} wei",
            if is_long { "long" } else { "short" },
            pair,
            leverage,
            margin_wei
        );
        self.submit(calldata, margin_wei).await
    }

    async fn submit_close(&self, slot: u64) -> Result<H256, ChainError> {
        let mut calldata = id("closePosition(uint256)").to_vec();
        calldata.extend(abi::encode(&[Token::Uint(U256::from(slot))]));

        debug!("Closing position at slot {}", slot);
        self.submit(calldata, U256::zero()).await
    }

    async fn wait_for_finality(&self, tx_hash: H256) -> Result<(), ChainError> {
        for _ in 0..self.finality_attempts {
            if let Some(receipt) = self.rpc.transaction_receipt(tx_hash).await? {
                if receipt.success {
                    info!(
                        "Transaction {:?} confirmed in block {}",
                        tx_hash, receipt.block_number
                    );
                    return Ok(());
                }
                return Err(ChainError::TransactionReverted {
                    reason: "transaction reverted on chain".to_string(),
                });
            }
            sleep(self.receipt_poll).await;
        }
        Err(ChainError::Rpc(format!(
            "timed out waiting for transaction {:?}",
            tx_hash
        )))
    }
}

/// ABI layout of the traderPositions getter return value
fn position_param_types() -> Vec<ParamType> {
    vec![
        ParamType::Address,   // trader
        ParamType::String,    // pair
        ParamType::Bool,      // isLong
        ParamType::Uint(256), // leverage
        ParamType::Uint(256), // margin
        ParamType::Uint(256), // entryPrice
        ParamType::Uint(256), // size
        ParamType::Uint(256), // openTime
        ParamType::Uint(256), // liquidationPrice
        ParamType::Bool,      // isActive
        ParamType::Uint(256), // lastFundingTime
    ]
}

fn bad_token(field: &str) -> ChainError {
    ChainError::Rpc(format!("bad token for {}", field))
}

fn decode_position(output: &[u8]) -> Result<RawPosition, ChainError> {
    let mut tokens = abi::decode(&position_param_types(), output)
        .map_err(|e| ChainError::Rpc(format!("undecodable position record: {}", e)))?
        .into_iter();

    let trader = match tokens.next() {
        Some(Token::Address(a)) => a,
        _ => return Err(bad_token("trader")),
    };
    let pair = match tokens.next() {
        Some(Token::String(s)) => s,
        _ => return Err(bad_token("pair")),
    };
    let is_long = match tokens.next() {
        Some(Token::Bool(b)) => b,
        _ => return Err(bad_token("isLong")),
    };

    let mut next_uint = |field: &'static str| match tokens.next() {
        Some(Token::Uint(v)) => Ok(v),
        Some(Token::Bool(b)) => Ok(U256::from(u8::from(b))),
        _ => Err(bad_token(field)),
    };

    let leverage = next_uint("leverage")?;
    let margin = next_uint("margin")?;
    let entry_price = next_uint("entryPrice")?;
    let size = next_uint("size")?;
    let open_time = next_uint("openTime")?;
    let liquidation_price = next_uint("liquidationPrice")?;
    let is_active = !next_uint("isActive")?.is_zero();
    let last_funding_time = next_uint("lastFundingTime")?;

    Ok(RawPosition {
        trader,
        pair,
        is_long,
        leverage,
        margin,
        entry_price,
        size,
        open_time,
        liquidation_price,
        is_active,
        last_funding_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded_position(is_active: bool) -> Vec<u8> {
        abi::encode(&[
            Token::Address(Address::repeat_byte(0x11)),
            Token::String("ETH/USD".to_string()),
            Token::Bool(true),
            Token::Uint(U256::from(10u64)),
            Token::Uint(U256::exp10(18)),                       // 1 PHRS margin
            Token::Uint(U256::from(3_000u64) * U256::exp10(8)), // entry 3000.00000000
            Token::Uint(U256::exp10(18)),                       // size 1
            Token::Uint(U256::from(1_700_000_000u64)),
            Token::Uint(U256::from(2_700u64) * U256::exp10(8)),
            Token::Bool(is_active),
            Token::Uint(U256::from(1_700_000_000u64)),
        ])
    }

    #[test]
    fn test_decode_position_roundtrip() {
        let raw = decode_position(&encoded_position(true)).unwrap();
        assert_eq!(raw.pair, "ETH/USD");
        assert!(raw.is_long);
        assert!(raw.is_active);
        assert_eq!(raw.leverage, U256::from(10u64));
        assert_eq!(raw.entry_price, U256::from(3_000u64) * U256::exp10(8));
    }

    #[test]
    fn test_decode_inactive_position() {
        let raw = decode_position(&encoded_position(false)).unwrap();
        assert!(!raw.is_active);
    }

    #[test]
    fn test_decode_rejects_truncated_output() {
        assert!(decode_position(&[0u8; 16]).is_err());
        assert!(decode_position(&[]).is_err());
    }
}
