//! Local transaction signing
//!
//! Legacy (EIP-155) transactions signed with a raw secp256k1 key. The
//! testnet has no EIP-1559 requirement, so the simpler envelope is enough.

use ethers_core::k256::ecdsa::SigningKey;
use ethers_core::types::{Address, Bytes, Signature, TransactionRequest, U256};
use ethers_core::utils::secret_key_to_address;

use crate::errors::ChainError;

/// Private-key signer bound to one chain
#[derive(Debug)]
pub struct PrivateKeySigner {
    key: SigningKey,
    address: Address,
    chain_id: u64,
}

impl PrivateKeySigner {
    /// Build a signer from a hex-encoded private key (with or without 0x)
    pub fn from_hex(private_key: &str, chain_id: u64) -> Result<Self, ChainError> {
        let trimmed = private_key.trim().trim_start_matches("0x");
        let bytes =
            hex::decode(trimmed).map_err(|e| ChainError::InvalidKey(format!("not hex: {}", e)))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| ChainError::InvalidKey(e.to_string()))?;
        let address = secret_key_to_address(&key);
        Ok(Self {
            key,
            address,
            chain_id,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Sign a legacy transaction and return the raw RLP payload for
    /// `eth_sendRawTransaction`
    pub fn sign_transaction(&self, tx: &TransactionRequest) -> Result<Bytes, ChainError> {
        let sighash = tx.sighash();
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(sighash.as_bytes())
            .map_err(|e| ChainError::InvalidKey(format!("signing failed: {}", e)))?;

        let r = U256::from_big_endian(signature.r().to_bytes().as_slice());
        let s = U256::from_big_endian(signature.s().to_bytes().as_slice());
        // EIP-155 replay protection
        let v = u64::from(recovery_id.to_byte()) + 35 + self.chain_id * 2;

        Ok(tx.rlp_signed(&Signature { r, s, v }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_address_derivation() {
        let signer = PrivateKeySigner::from_hex(TEST_KEY, 688688).unwrap();
        let address = format!("{:?}", signer.address());
        assert!(address.starts_with("0x"));
        assert_eq!(address.len(), 42);

        // 0x prefix must not matter
        let bare = PrivateKeySigner::from_hex(&TEST_KEY[2..], 688688).unwrap();
        assert_eq!(signer.address(), bare.address());
    }

    #[test]
    fn test_rejects_garbage_key() {
        assert!(matches!(
            PrivateKeySigner::from_hex("not a key", 688688),
            Err(ChainError::InvalidKey(_))
        ));
        assert!(matches!(
            PrivateKeySigner::from_hex("0xdeadbeef", 688688),
            Err(ChainError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_signed_payload_recovers_sender() {
        let signer = PrivateKeySigner::from_hex(TEST_KEY, 688688).unwrap();
        let tx = TransactionRequest::new()
            .from(signer.address())
            .to(Address::zero())
            .value(U256::from(1_000u64))
            .gas(U256::from(21_000u64))
            .gas_price(U256::from(1_000_000_000u64))
            .nonce(U256::zero())
            .chain_id(688688);

        let raw = signer.sign_transaction(&tx).unwrap();
        assert!(!raw.as_ref().is_empty());

        let decoded = ethers_core::utils::rlp::Rlp::new(raw.as_ref());
        let (_, sig) = TransactionRequest::decode_signed_rlp(&decoded).unwrap();
        let recovered = sig.recover(tx.sighash()).unwrap();
        assert_eq!(recovered, signer.address());
    }
}
