//! Raw on-chain record shapes

use ethers_core::types::{Address, H256, U256};

/// Position record exactly as the exchange contract returns it
///
/// Prices are 1e8 fixed-point; margin and size are wei (1e18). The read side
/// only mirrors these records, it never mutates them.
#[derive(Debug, Clone)]
pub struct RawPosition {
    pub trader: Address,
    pub pair: String,
    pub is_long: bool,
    pub leverage: U256,
    pub margin: U256,
    pub entry_price: U256,
    pub size: U256,
    pub open_time: U256,
    pub liquidation_price: U256,
    pub is_active: bool,
    pub last_funding_time: U256,
}

/// Mined transaction receipt, reduced to what the client acts on
#[derive(Debug, Clone)]
pub struct TxReceipt {
    pub tx_hash: H256,
    pub success: bool,
    pub block_number: u64,
}
