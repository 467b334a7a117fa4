//! Position store state types

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ethers_core::types::Address;
use serde::{Deserialize, Serialize};

use crate::types::Position;

/// Lifecycle of a close request for one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CloseState {
    /// Transaction built and sent to the node
    Submitting,
    /// Accepted by the node, waiting for finality
    Confirming,
    /// Confirmed; the slot will disappear on the next refresh
    Closed,
    /// Rejected or reverted; the slot is closable again
    Failed,
}

impl CloseState {
    /// Whether a further close for the slot must be refused
    pub fn in_flight(&self) -> bool {
        matches!(self, CloseState::Submitting | CloseState::Confirming)
    }
}

/// Published account state
///
/// The position list is replaced wholesale by each refresh; nothing else
/// writes to it.
#[derive(Debug, Clone, Default)]
pub struct AccountView {
    pub account: Option<Address>,
    pub positions: Vec<Position>,
    pub close_states: HashMap<u64, CloseState>,
    pub last_refresh: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl AccountView {
    pub fn close_in_flight(&self, slot: u64) -> bool {
        self.close_states
            .get(&slot)
            .map(CloseState::in_flight)
            .unwrap_or(false)
    }
}
