//! Account position store: reconciles ledger reads into the displayed list

pub mod service;
pub mod types;

pub use service::{start_position_store, PositionStoreHandle};
pub use types::{AccountView, CloseState};
