//! Core domain types

use chrono::{DateTime, Utc};
use ethers_core::types::Address;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::chain::types::RawPosition;
use crate::errors::ChainError;
use crate::valuation::{scale_price, scale_wei};

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

impl std::fmt::Display for PositionSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PositionSide::Long => write!(f, "LONG"),
            PositionSide::Short => write!(f, "SHORT"),
        }
    }
}

/// A display-ready open position mirrored from the ledger
///
/// `slot` is the index into the trader's fixed-size position array on the
/// contract. It is NOT a stable identifier: a closed position's slot can be
/// reused by a later one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub slot: u64,
    pub trader: Address,
    pub pair: String,
    pub side: PositionSide,
    pub leverage: Decimal,
    /// Collateral in native token units
    pub margin: Decimal,
    /// USD, converted from the contract's 1e8 fixed-point
    pub entry_price: Decimal,
    /// Base asset units, converted from wei scale
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
    pub liquidation_price: Decimal,
    pub last_funding_at: DateTime<Utc>,
}

impl Position {
    /// Convert a raw contract record into display units
    pub fn from_raw(slot: u64, raw: &RawPosition) -> Result<Self, ChainError> {
        if raw.leverage.bits() > 32 {
            return Err(ChainError::ValueOutOfRange);
        }
        let leverage = Decimal::from(raw.leverage.as_u32());
        Ok(Self {
            slot,
            trader: raw.trader,
            pair: raw.pair.clone(),
            side: if raw.is_long {
                PositionSide::Long
            } else {
                PositionSide::Short
            },
            leverage,
            margin: scale_wei(raw.margin)?,
            entry_price: scale_price(raw.entry_price)?,
            size: scale_wei(raw.size)?,
            opened_at: timestamp_from_seconds(&raw.open_time),
            liquidation_price: scale_price(raw.liquidation_price)?,
            last_funding_at: timestamp_from_seconds(&raw.last_funding_time),
        })
    }
}

fn timestamp_from_seconds(seconds: &ethers_core::types::U256) -> DateTime<Utc> {
    let secs = if seconds.bits() <= 63 {
        seconds.as_u64() as i64
    } else {
        0
    };
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers_core::types::U256;
    use rust_decimal_macros::dec;

    fn raw_long() -> RawPosition {
        RawPosition {
            trader: Address::repeat_byte(0x22),
            pair: "ETH/USD".to_string(),
            is_long: true,
            leverage: U256::from(10u64),
            margin: U256::exp10(17), // 0.1 PHRS
            entry_price: U256::from(3_000u64) * U256::exp10(8),
            size: U256::exp10(18), // 1.0
            open_time: U256::from(1_700_000_000u64),
            liquidation_price: U256::from(2_700u64) * U256::exp10(8),
            is_active: true,
            last_funding_time: U256::from(1_700_000_000u64),
        }
    }

    #[test]
    fn test_from_raw_scales_units() {
        let position = Position::from_raw(3, &raw_long()).unwrap();
        assert_eq!(position.slot, 3);
        assert_eq!(position.side, PositionSide::Long);
        assert_eq!(position.entry_price, dec!(3000));
        assert_eq!(position.liquidation_price, dec!(2700));
        assert_eq!(position.size, dec!(1));
        assert_eq!(position.margin, dec!(0.1));
        assert_eq!(position.leverage, dec!(10));
        assert_eq!(position.opened_at.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_from_raw_rejects_absurd_leverage() {
        let mut raw = raw_long();
        raw.leverage = U256::MAX;
        assert!(matches!(
            Position::from_raw(0, &raw),
            Err(ChainError::ValueOutOfRange)
        ));
    }
}
