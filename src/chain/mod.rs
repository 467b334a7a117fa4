//! Ledger access: RPC transport, contract binding, signing, position reads
//! and the wallet session lifecycle

pub mod ledger;
pub mod reader;
pub mod rpc;
pub mod signer;
pub mod types;
pub mod wallet;

pub use ledger::{FuturesExchange, Ledger};
pub use reader::{PositionReader, MAX_POSITION_SLOTS};
pub use rpc::RpcClient;
pub use signer::PrivateKeySigner;
pub use types::{RawPosition, TxReceipt};
pub use wallet::{WalletSession, PRIVATE_KEY_ENV};
