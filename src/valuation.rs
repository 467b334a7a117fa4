//! Position valuation
//!
//! Pure display math: fixed-point unit conversion, unrealized PnL and PnL
//! percentage against the latest spot price, and the formatting used by the
//! CLI tables. Nothing here performs I/O; the same inputs always produce the
//! same outputs.

use ethers_core::types::U256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::ChainError;
use crate::feed::types::PriceSnapshot;
use crate::types::{Position, PositionSide};

/// Contract price fields are 1e8 fixed-point
pub const PRICE_DECIMALS: u32 = 8;
/// Margin and size are wei-scaled
pub const WEI_DECIMALS: u32 = 18;

/// Unrealized PnL derived from one (position, snapshot) pair
///
/// Never cached: the instant either input changes this must be recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    /// USD
    pub pnl: Decimal,
    /// Percent of initial margin
    pub pnl_percent: Decimal,
}

/// Convert a fixed-point chain value to a decimal
///
/// Fails when the value exceeds the 96-bit mantissa Decimal can carry; such
/// values cannot be displayed faithfully so they are refused rather than
/// truncated.
pub fn scale_fixed(value: U256, decimals: u32) -> Result<Decimal, ChainError> {
    if value.bits() > 96 {
        return Err(ChainError::ValueOutOfRange);
    }
    let raw = value.as_u128() as i128;
    Decimal::try_from_i128_with_scale(raw, decimals).map_err(|_| ChainError::ValueOutOfRange)
}

/// 1e8 price field to USD
pub fn scale_price(value: U256) -> Result<Decimal, ChainError> {
    scale_fixed(value, PRICE_DECIMALS)
}

/// Wei-scaled field to token units
pub fn scale_wei(value: U256) -> Result<Decimal, ChainError> {
    scale_fixed(value, WEI_DECIMALS)
}

/// Token amount back to wei for transaction values
pub fn to_wei(amount: Decimal) -> Result<U256, ChainError> {
    use rust_decimal::prelude::ToPrimitive;
    if amount < Decimal::ZERO {
        return Err(ChainError::ValueOutOfRange);
    }
    let scaled = amount
        .checked_mul(Decimal::from(1_000_000_000_000_000_000u64))
        .ok_or(ChainError::ValueOutOfRange)?;
    let wei = scaled.trunc().to_u128().ok_or(ChainError::ValueOutOfRange)?;
    Ok(U256::from(wei))
}

/// Compute unrealized PnL for a position against the current snapshot
///
/// Long: `(current - entry) * size`; short: `(entry - current) * size`.
/// The percentage is PnL over the USD value of the initial margin
/// (`size * entry / leverage`); a zero initial margin yields 0% rather than
/// a division error.
pub fn valuate(position: &Position, snapshot: &PriceSnapshot) -> Valuation {
    let current = snapshot.spot_price;
    let entry = position.entry_price;

    let pnl = match position.side {
        PositionSide::Long => (current - entry) * position.size,
        PositionSide::Short => (entry - current) * position.size,
    };

    let initial_margin_usd = if position.leverage > Decimal::ZERO {
        position.size * entry / position.leverage
    } else {
        Decimal::ZERO
    };

    let pnl_percent = if initial_margin_usd > Decimal::ZERO {
        pnl / initial_margin_usd * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    Valuation { pnl, pnl_percent }
}

/// "$3300.00"
pub fn format_usd(value: Decimal) -> String {
    format!("${:.2}", value.round_dp(2))
}

/// Sizes and margins render at 4 decimal places
pub fn format_amount(value: Decimal) -> String {
    format!("{:.4}", value.round_dp(4))
}

/// "0.1000 PHRS"
pub fn format_margin(value: Decimal, native_symbol: &str) -> String {
    format!("{} {}", format_amount(value), native_symbol)
}

/// "300.0000 (100.00%)"
pub fn format_pnl(valuation: &Valuation) -> String {
    format!(
        "{:.4} ({:.2}%)",
        valuation.pnl.round_dp(4),
        valuation.pnl_percent.round_dp(2)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ethers_core::types::Address;
    use rust_decimal_macros::dec;

    fn snapshot(price: Decimal) -> PriceSnapshot {
        PriceSnapshot {
            spot_price: price,
            change_24h_pct: dec!(0),
            high_24h: dec!(0),
            low_24h: dec!(0),
            volume_24h: dec!(0),
        }
    }

    fn position(side: PositionSide, entry: Decimal, size: Decimal, leverage: Decimal) -> Position {
        Position {
            slot: 0,
            trader: Address::zero(),
            pair: "ETH/USD".to_string(),
            side,
            leverage,
            margin: dec!(0.1),
            entry_price: entry,
            size,
            opened_at: Utc::now(),
            liquidation_price: dec!(0),
            last_funding_at: Utc::now(),
        }
    }

    #[test]
    fn test_long_pnl() {
        let p = position(PositionSide::Long, dec!(3000), dec!(1), dec!(10));
        let v = valuate(&p, &snapshot(dec!(3300)));
        assert_eq!(v.pnl, dec!(300));
        assert_eq!(v.pnl_percent, dec!(100));
    }

    #[test]
    fn test_short_pnl() {
        let p = position(PositionSide::Short, dec!(3000), dec!(1), dec!(10));
        let v = valuate(&p, &snapshot(dec!(2700)));
        assert_eq!(v.pnl, dec!(300));
        assert_eq!(v.pnl_percent, dec!(100));
    }

    #[test]
    fn test_losing_long() {
        let p = position(PositionSide::Long, dec!(3000), dec!(2), dec!(5));
        let v = valuate(&p, &snapshot(dec!(2850)));
        assert_eq!(v.pnl, dec!(-300));
        // initial margin = 2 * 3000 / 5 = 1200
        assert_eq!(v.pnl_percent, dec!(-25));
    }

    #[test]
    fn test_zero_size_guards_percentage() {
        let p = position(PositionSide::Long, dec!(3000), dec!(0), dec!(10));
        let v = valuate(&p, &snapshot(dec!(3300)));
        assert_eq!(v.pnl, dec!(0));
        assert_eq!(v.pnl_percent, dec!(0));
    }

    #[test]
    fn test_valuate_is_deterministic() {
        let p = position(PositionSide::Short, dec!(1234.56), dec!(0.75), dec!(20));
        let s = snapshot(dec!(1200.12));
        let first = valuate(&p, &s);
        for _ in 0..10 {
            assert_eq!(valuate(&p, &s), first);
        }
    }

    #[test]
    fn test_scale_roundtrip() {
        let wei = U256::from(1_500_000_000_000_000_000u64); // 1.5
        assert_eq!(scale_wei(wei).unwrap(), dec!(1.5));
        assert_eq!(to_wei(dec!(1.5)).unwrap(), wei);

        let price = U256::from(330_000_000_000u64); // 3300.00000000
        assert_eq!(scale_price(price).unwrap(), dec!(3300));
    }

    #[test]
    fn test_scale_refuses_oversized_values() {
        assert!(matches!(
            scale_wei(U256::MAX),
            Err(ChainError::ValueOutOfRange)
        ));
        assert!(matches!(
            to_wei(dec!(-1)),
            Err(ChainError::ValueOutOfRange)
        ));
    }

    #[test]
    fn test_formatting() {
        let v = Valuation {
            pnl: dec!(300),
            pnl_percent: dec!(100),
        };
        assert_eq!(format_pnl(&v), "300.0000 (100.00%)");
        assert_eq!(format_usd(dec!(3300)), "$3300.00");
        assert_eq!(format_margin(dec!(0.1), "PHRS"), "0.1000 PHRS");
    }
}
