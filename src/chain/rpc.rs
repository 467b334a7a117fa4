//! Minimal JSON-RPC client for the ledger node
//!
//! Only the handful of methods this client needs. Revert payloads in
//! `eth_call` and `eth_estimateGas` errors are decoded so the contract's
//! reason string reaches the user verbatim.

use ethers_core::abi::{self, ParamType, Token};
use ethers_core::types::{Address, Bytes, H256, U256};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::chain::types::TxReceipt;
use crate::errors::ChainError;

/// Solidity `Error(string)` selector
const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// JSON-RPC over HTTP
#[derive(Debug)]
pub struct RpcClient {
    http: Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
        trace!("rpc {} params {}", method, params);
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Rpc(format!("{}: {}", method, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Rpc(format!(
                "{}: node returned status {}",
                method, status
            )));
        }

        let parsed: RpcResponse = response
            .json()
            .await
            .map_err(|e| ChainError::Rpc(format!("{}: malformed response: {}", method, e)))?;

        if let Some(error) = parsed.error {
            if let Some(reason) = revert_reason(&error) {
                return Err(ChainError::TransactionReverted { reason });
            }
            return Err(ChainError::Rpc(format!("{}: {}", method, error.message)));
        }

        parsed
            .result
            .ok_or_else(|| ChainError::Rpc(format!("{}: response had no result", method)))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let result = self.request("eth_chainId", json!([])).await?;
        parse_u64(&result)
    }

    pub async fn get_balance(&self, address: Address) -> Result<U256, ChainError> {
        let result = self
            .request("eth_getBalance", json!([format!("{:?}", address), "latest"]))
            .await?;
        parse_u256(&result)
    }

    pub async fn transaction_count(&self, address: Address) -> Result<U256, ChainError> {
        let result = self
            .request(
                "eth_getTransactionCount",
                json!([format!("{:?}", address), "pending"]),
            )
            .await?;
        parse_u256(&result)
    }

    pub async fn gas_price(&self) -> Result<U256, ChainError> {
        let result = self.request("eth_gasPrice", json!([])).await?;
        parse_u256(&result)
    }

    /// Read-only contract call
    pub async fn call(&self, to: Address, data: Vec<u8>) -> Result<Vec<u8>, ChainError> {
        let result = self
            .request(
                "eth_call",
                json!([{
                    "to": format!("{:?}", to),
                    "data": format!("0x{}", hex::encode(&data)),
                }, "latest"]),
            )
            .await?;
        parse_bytes(&result)
    }

    pub async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        data: &[u8],
        value: U256,
    ) -> Result<U256, ChainError> {
        let result = self
            .request(
                "eth_estimateGas",
                json!([{
                    "from": format!("{:?}", from),
                    "to": format!("{:?}", to),
                    "data": format!("0x{}", hex::encode(data)),
                    "value": format!("{:#x}", value),
                }]),
            )
            .await?;
        parse_u256(&result)
    }

    pub async fn send_raw_transaction(&self, raw: Bytes) -> Result<H256, ChainError> {
        let result = self
            .request(
                "eth_sendRawTransaction",
                json!([format!("0x{}", hex::encode(raw.as_ref()))]),
            )
            .await
            .map_err(|e| match e {
                // a node refusing the submission is a rejection, not a revert
                ChainError::Rpc(msg) => ChainError::TransactionRejected(msg),
                other => other,
            })?;
        parse_h256(&result)
    }

    pub async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TxReceipt>, ChainError> {
        let result = self
            .request(
                "eth_getTransactionReceipt",
                json!([format!("{:?}", tx_hash)]),
            )
            .await?;

        if result.is_null() {
            return Ok(None);
        }

        let status = result
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s == "0x1")
            .unwrap_or(false);
        let block_number = result
            .get("blockNumber")
            .and_then(Value::as_str)
            .and_then(|s| u64::from_str_radix(s.trim_start_matches("0x"), 16).ok())
            .unwrap_or(0);

        debug!(
            "Receipt for {:?}: status={}, block={}",
            tx_hash, status, block_number
        );
        Ok(Some(TxReceipt {
            tx_hash,
            success: status,
            block_number,
        }))
    }
}

/// Extract a human-readable revert reason from an RPC error, if present
fn revert_reason(error: &RpcError) -> Option<String> {
    if let Some(data) = error.data.as_ref().and_then(Value::as_str) {
        if let Some(reason) = decode_error_string(data) {
            return Some(reason);
        }
    }
    error
        .message
        .strip_prefix("execution reverted: ")
        .map(str::to_string)
        .or_else(|| {
            if error.message.contains("execution reverted") {
                Some(error.message.clone())
            } else {
                None
            }
        })
}

/// Decode an ABI-encoded `Error(string)` payload
fn decode_error_string(data: &str) -> Option<String> {
    let bytes = hex::decode(data.trim_start_matches("0x")).ok()?;
    if bytes.len() < 4 || bytes[..4] != ERROR_STRING_SELECTOR {
        return None;
    }
    let tokens = abi::decode(&[ParamType::String], &bytes[4..]).ok()?;
    match tokens.into_iter().next()? {
        Token::String(s) => Some(s),
        _ => None,
    }
}

fn parse_u64(value: &Value) -> Result<u64, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Rpc("expected hex string result".to_string()))?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Rpc(format!("bad hex quantity '{}': {}", s, e)))
}

fn parse_u256(value: &Value) -> Result<U256, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Rpc("expected hex string result".to_string()))?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16)
        .map_err(|e| ChainError::Rpc(format!("bad hex quantity '{}': {}", s, e)))
}

fn parse_bytes(value: &Value) -> Result<Vec<u8>, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Rpc("expected hex string result".to_string()))?;
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| ChainError::Rpc(format!("bad hex data: {}", e)))
}

fn parse_h256(value: &Value) -> Result<H256, ChainError> {
    let bytes = parse_bytes(value)?;
    if bytes.len() != 32 {
        return Err(ChainError::Rpc(format!(
            "expected 32-byte hash, got {} bytes",
            bytes.len()
        )));
    }
    Ok(H256::from_slice(&bytes))
}
