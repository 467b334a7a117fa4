//! Per-account position reads
//!
//! The contract exposes no position count, so the reader probes slots
//! 0..max sequentially and treats the first failed read as the end of the
//! array. That conflates "past the end" with "transient read failure": a
//! slot that fails for a transient reason truncates the listing at that
//! point. Kept deliberately, matching the deployed contract's consumers; a
//! ledger with a count accessor would replace this probe loop outright.

use std::sync::Arc;

use ethers_core::types::Address;
use tracing::{debug, warn};

use crate::chain::ledger::Ledger;
use crate::types::Position;

/// Upper bound on the slot probe
pub const MAX_POSITION_SLOTS: u64 = 20;

/// Reads the trader's open positions off the ledger
pub struct PositionReader {
    ledger: Arc<dyn Ledger>,
    max_slots: u64,
}

impl PositionReader {
    pub fn new(ledger: Arc<dyn Ledger>, max_slots: u64) -> Self {
        Self { ledger, max_slots }
    }

    /// List all active positions readable before the first failing slot
    ///
    /// Failures are per-slot, never for the listing as a whole: the
    /// positions collected up to the cutoff are always returned.
    pub async fn list_positions(&self, trader: Address) -> Vec<Position> {
        let mut positions = Vec::new();

        for slot in 0..self.max_slots {
            match self.ledger.trader_positions(trader, slot).await {
                Ok(raw) => {
                    if !raw.is_active {
                        continue;
                    }
                    match Position::from_raw(slot, &raw) {
                        Ok(position) => positions.push(position),
                        Err(e) => {
                            warn!("Skipping undisplayable position at slot {}: {}", slot, e)
                        }
                    }
                }
                Err(e) => {
                    debug!(
                        "Slot {} read failed, treating as end of position array: {}",
                        slot, e
                    );
                    break;
                }
            }
        }

        debug!(
            "Read {} active positions for {:?}",
            positions.len(),
            trader
        );
        positions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::RawPosition;
    use crate::errors::ChainError;
    use async_trait::async_trait;
    use ethers_core::types::{H256, U256};
    use std::collections::{HashMap, HashSet};

    struct MockLedger {
        slots: HashMap<u64, RawPosition>,
        failing: HashSet<u64>,
    }

    impl MockLedger {
        fn new(active: &[u64], inactive: &[u64], failing: &[u64]) -> Self {
            let mut slots = HashMap::new();
            for &slot in active {
                slots.insert(slot, raw_position(true));
            }
            for &slot in inactive {
                slots.insert(slot, raw_position(false));
            }
            Self {
                slots,
                failing: failing.iter().copied().collect(),
            }
        }
    }

    fn raw_position(is_active: bool) -> RawPosition {
        RawPosition {
            trader: Address::repeat_byte(0x33),
            pair: "ETH/USD".to_string(),
            is_long: true,
            leverage: U256::from(10u64),
            margin: U256::exp10(17),
            entry_price: U256::from(3_000u64) * U256::exp10(8),
            size: U256::exp10(18),
            open_time: U256::from(1_700_000_000u64),
            liquidation_price: U256::from(2_700u64) * U256::exp10(8),
            is_active,
            last_funding_time: U256::from(1_700_000_000u64),
        }
    }

    #[async_trait]
    impl Ledger for MockLedger {
        async fn trader_positions(
            &self,
            _trader: Address,
            slot: u64,
        ) -> Result<RawPosition, ChainError> {
            if self.failing.contains(&slot) {
                return Err(ChainError::Rpc(format!("slot {} unavailable", slot)));
            }
            self.slots
                .get(&slot)
                .cloned()
                .ok_or_else(|| ChainError::TransactionReverted {
                    reason: "index out of bounds".to_string(),
                })
        }

        async fn submit_open(
            &self,
            _pair: &str,
            _is_long: bool,
            _leverage: u64,
            _margin_wei: U256,
        ) -> Result<H256, ChainError> {
            unimplemented!("not used by reader tests")
        }

        async fn submit_close(&self, _slot: u64) -> Result<H256, ChainError> {
            unimplemented!("not used by reader tests")
        }

        async fn wait_for_finality(&self, _tx_hash: H256) -> Result<(), ChainError> {
            unimplemented!("not used by reader tests")
        }
    }

    #[tokio::test]
    async fn test_probe_stops_at_first_failing_slot() {
        // active slots 0, 1 and 3, but slot 2 fails: the probe must stop at
        // 2 and return only [0, 1] even though slot 3 is readable
        let ledger = Arc::new(MockLedger::new(&[0, 1, 3], &[], &[2]));
        let reader = PositionReader::new(ledger, MAX_POSITION_SLOTS);

        let positions = reader.list_positions(Address::repeat_byte(0x33)).await;
        let slots: Vec<u64> = positions.iter().map(|p| p.slot).collect();
        assert_eq!(slots, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_inactive_slots_are_skipped_not_terminal() {
        let ledger = Arc::new(MockLedger::new(&[0, 2], &[1], &[]));
        let reader = PositionReader::new(ledger, 3);

        let positions = reader.list_positions(Address::repeat_byte(0x33)).await;
        let slots: Vec<u64> = positions.iter().map(|p| p.slot).collect();
        assert_eq!(slots, vec![0, 2]);
    }

    #[tokio::test]
    async fn test_end_of_array_revert_truncates() {
        // contiguous slots then a revert, the usual on-chain layout
        let ledger = Arc::new(MockLedger::new(&[0, 1], &[], &[]));
        let reader = PositionReader::new(ledger, MAX_POSITION_SLOTS);

        let positions = reader.list_positions(Address::repeat_byte(0x33)).await;
        assert_eq!(positions.len(), 2);
    }

    #[tokio::test]
    async fn test_probe_respects_slot_bound() {
        let all: Vec<u64> = (0..40).collect();
        let ledger = Arc::new(MockLedger::new(&all, &[], &[]));
        let reader = PositionReader::new(ledger, MAX_POSITION_SLOTS);

        let positions = reader.list_positions(Address::repeat_byte(0x33)).await;
        assert_eq!(positions.len(), MAX_POSITION_SLOTS as usize);
    }

    #[tokio::test]
    async fn test_empty_account() {
        let ledger = Arc::new(MockLedger::new(&[], &[], &[]));
        let reader = PositionReader::new(ledger, MAX_POSITION_SLOTS);
        assert!(reader
            .list_positions(Address::repeat_byte(0x33))
            .await
            .is_empty());
    }
}
