//! Error taxonomy shared across the crate
//!
//! Feed errors are advisory: consumers keep the last-known data and surface
//! the failure as status. Chain errors that indicate a bad connection clear
//! all connection-derived state. Nothing here is fatal to the process.

use thiserror::Error;

/// Market data feed failures
#[derive(Debug, Error)]
pub enum FeedError {
    /// Feed unreachable or returned a non-success status
    #[error("market data request failed: {0}")]
    Network(String),

    /// Feed responded but had no data for the requested instrument
    #[error("no market data returned for '{0}'")]
    EmptyResult(String),

    /// Feed responded with a payload we could not interpret
    #[error("malformed market data response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(e: reqwest::Error) -> Self {
        FeedError::Network(e.to_string())
    }
}

/// Wallet, RPC and transaction failures
#[derive(Debug, Error)]
pub enum ChainError {
    /// Connected node is on an unexpected chain; no session state may be
    /// built on top of this
    #[error("wallet is on chain {got}, expected chain {expected}")]
    WrongNetwork { got: u64, expected: u64 },

    /// No signing key was provided via environment or config
    #[error("no wallet key available; set PERPDESK_PRIVATE_KEY")]
    WalletUnavailable,

    /// Key material present but unusable
    #[error("invalid wallet key: {0}")]
    InvalidKey(String),

    /// Transport or node-level RPC failure
    #[error("rpc request failed: {0}")]
    Rpc(String),

    /// Transaction was refused before inclusion (node rejection, bad nonce,
    /// insufficient funds)
    #[error("transaction rejected: {0}")]
    TransactionRejected(String),

    /// Transaction was included but reverted; reason is verbatim from the
    /// node when it provides one
    #[error("transaction reverted: {reason}")]
    TransactionReverted { reason: String },

    /// On-chain value does not fit the display number range
    #[error("on-chain value out of displayable range")]
    ValueOutOfRange,
}

/// Position store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// A close for this slot is already submitting or confirming
    #[error("close already in flight for slot {0}")]
    CloseInFlight(u64),

    /// No account is connected to the store
    #[error("no account connected")]
    NotConnected,

    /// The account changed while the request was in flight
    #[error("request superseded by account change")]
    Superseded,

    /// The store service task has stopped
    #[error("position store service unavailable")]
    ServiceStopped,

    #[error(transparent)]
    Chain(#[from] ChainError),
}
