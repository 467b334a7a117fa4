//! Wallet session lifecycle
//!
//! All connection-derived state (address, balance, exchange handle) hangs
//! off a `WalletSession`. The session is only constructed after the node's
//! chain id has been verified, so state for the wrong network can never
//! exist: a mismatch fails `connect` with `WrongNetwork` and nothing is
//! retained. Dropping the session is the disconnect.

use std::sync::Arc;

use ethers_core::types::Address;
use rust_decimal::Decimal;
use tokio::time::Duration;
use tracing::info;

use crate::chain::ledger::FuturesExchange;
use crate::chain::rpc::RpcClient;
use crate::chain::signer::PrivateKeySigner;
use crate::config::NetworkConfig;
use crate::errors::ChainError;
use crate::valuation::scale_wei;

/// Environment variable holding the signing key
pub const PRIVATE_KEY_ENV: &str = "PERPDESK_PRIVATE_KEY";

/// A verified connection to the expected network
#[derive(Debug)]
pub struct WalletSession {
    address: Address,
    balance: Decimal,
    chain_id: u64,
    signer: Arc<PrivateKeySigner>,
    rpc: Arc<RpcClient>,
}

impl WalletSession {
    /// Connect with an explicit private key
    ///
    /// Chain id verification happens before anything else; on a mismatch no
    /// session state is created.
    pub async fn connect(
        network: &NetworkConfig,
        rpc: Arc<RpcClient>,
        private_key: &str,
    ) -> Result<Self, ChainError> {
        let chain_id = rpc.chain_id().await?;
        if chain_id != network.chain_id {
            return Err(ChainError::WrongNetwork {
                got: chain_id,
                expected: network.chain_id,
            });
        }

        let signer = Arc::new(PrivateKeySigner::from_hex(private_key, chain_id)?);
        let address = signer.address();
        let balance = scale_wei(rpc.get_balance(address).await?)?;

        info!(
            "Connected {:?} on {} (balance {} {})",
            address, network.chain_name, balance, network.native_symbol
        );

        Ok(Self {
            address,
            balance,
            chain_id,
            signer,
            rpc,
        })
    }

    /// Connect using the key from the environment
    pub async fn connect_from_env(
        network: &NetworkConfig,
        rpc: Arc<RpcClient>,
    ) -> Result<Self, ChainError> {
        let key = std::env::var(PRIVATE_KEY_ENV).map_err(|_| ChainError::WalletUnavailable)?;
        Self::connect(network, rpc, &key).await
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Re-read the native balance
    pub async fn refresh_balance(&mut self) -> Result<Decimal, ChainError> {
        self.balance = scale_wei(self.rpc.get_balance(self.address).await?)?;
        Ok(self.balance)
    }

    /// Exchange contract handle bound to this session's signer
    ///
    /// Only reachable through a verified session, mirroring the rule that a
    /// contract handle must not outlive a valid connection.
    pub fn exchange(&self, network: &NetworkConfig) -> Result<FuturesExchange, ChainError> {
        Ok(FuturesExchange::new(
            self.rpc.clone(),
            network.exchange_address()?,
            self.signer.clone(),
            Duration::from_secs(network.receipt_poll_secs),
            network.finality_attempts,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NetworkConfig;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    async fn mock_node(chain_id_hex: &str, balance_hex: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "eth_chainId"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": chain_id_hex
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "eth_getBalance"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": balance_hex
            })))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_connect_on_expected_chain() {
        // 688688 = 0xa8230; balance 1 PHRS
        let server = mock_node("0xa8230", "0xde0b6b3a7640000").await;
        let network = NetworkConfig::default();
        let rpc = Arc::new(RpcClient::new(server.uri()));

        let session = WalletSession::connect(&network, rpc, TEST_KEY).await.unwrap();
        assert_eq!(session.chain_id(), 688688);
        assert_eq!(session.balance(), rust_decimal_macros::dec!(1));
    }

    #[tokio::test]
    async fn test_wrong_network_yields_no_session() {
        // mainnet chain id instead of the expected testnet
        let server = mock_node("0x1", "0xde0b6b3a7640000").await;
        let network = NetworkConfig::default();
        let rpc = Arc::new(RpcClient::new(server.uri()));

        let err = WalletSession::connect(&network, rpc, TEST_KEY)
            .await
            .unwrap_err();
        match err {
            ChainError::WrongNetwork { got, expected } => {
                assert_eq!(got, 1);
                assert_eq!(expected, 688688);
            }
            other => panic!("expected WrongNetwork, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_is_wallet_unavailable() {
        let server = mock_node("0xa80a0", "0x0").await;
        let network = NetworkConfig::default();
        let rpc = Arc::new(RpcClient::new(server.uri()));

        std::env::remove_var(PRIVATE_KEY_ENV);
        let err = WalletSession::connect_from_env(&network, rpc)
            .await
            .unwrap_err();
        assert!(matches!(err, ChainError::WalletUnavailable));
    }
}
