//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Invalid private key format or signing failure.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Gas price exceeded maximum allowed.
    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// Malformed address.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Malformed or out-of-range amount.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Descriptor is missing a field required for signing.
    #[error("Incomplete transaction: {0}")]
    IncompleteDescriptor(&'static str),

    /// Signed output failed its shape check.
    #[error("Malformed signed payload: {0}")]
    MalformedPayload(String),
}

impl BlockchainError {
    /// Transport-level failures worth another attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, BlockchainError::Rpc(_) | BlockchainError::Timeout(_))
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// A transfer as requested by a caller, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Canonical chain name.
    pub chain: String,
    pub sender: String,
    pub recipient: String,
    /// Decimal amount in whole units of the asset (e.g., "0.001").
    pub amount: String,
    /// Token contract; `None` means a native-asset transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<String>,
}

impl TransferRequest {
    /// The token contract, if any, treating blank strings as absent.
    pub fn contract(&self) -> Option<&str> {
        self.contract_address
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// An assembled, unsigned legacy transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedDescriptor {
    pub from: Address,
    /// Recipient for native transfers, token contract for token transfers.
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub nonce: Option<u64>,
    pub gas_price: u128,
    pub gas_limit: u64,
    pub chain_id: Option<u64>,
}

impl UnsignedDescriptor {
    /// Maximum fee the transaction can consume, in wei.
    pub fn max_fee(&self) -> U256 {
        U256::from(self.gas_price) * U256::from(self.gas_limit)
    }
}

/// A signed, chain-encoded transaction. Holds no credential material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedPayload {
    /// `0x`-prefixed EIP-2718 encoding.
    pub raw_hex: String,
    /// Account that produced the signature.
    pub signer: Address,
    /// Keccak-256 of the encoded bytes.
    pub hash: TxHash,
}

impl SignedPayload {
    /// Check the encoded form: non-empty, `0x`-prefixed, even-length hex.
    pub fn validate(&self) -> BlockchainResult<()> {
        let body = self
            .raw_hex
            .strip_prefix("0x")
            .ok_or_else(|| BlockchainError::MalformedPayload("missing 0x prefix".into()))?;
        if body.is_empty() {
            return Err(BlockchainError::MalformedPayload("empty payload".into()));
        }
        if body.len() % 2 != 0 {
            return Err(BlockchainError::MalformedPayload("odd-length hex".into()));
        }
        alloy::hex::decode(body)
            .map_err(|e| BlockchainError::MalformedPayload(format!("not hex: {}", e)))?;
        Ok(())
    }
}
