//! Credentials and transaction signing.
//!
//! # Security
//! - A [`Credential`] never appears in `Debug` output or logs
//! - The parsed signing key lives only for the duration of [`PayloadSigner::sign`]
//! - Nothing here is serialized

use alloy::eips::eip2718::Encodable2718;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{BlockchainError, BlockchainResult, SignedPayload, UnsignedDescriptor};

/// A hex-encoded secp256k1 private key supplied by a caller or a key provider.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn parse(&self) -> BlockchainResult<PrivateKeySigner> {
        let trimmed = self.0.trim();
        let key_hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        key_hex
            .parse()
            .map_err(|_| BlockchainError::Wallet("Invalid private key format".to_string()))
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Produces signed, EIP-2718 encoded payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct PayloadSigner;

impl PayloadSigner {
    /// Sign `descriptor` with `credential`.
    ///
    /// The credential must control `descriptor.from`. Signing is
    /// deterministic (RFC 6979), so the same inputs yield the same bytes.
    pub async fn sign(
        &self,
        descriptor: &UnsignedDescriptor,
        credential: &Credential,
    ) -> BlockchainResult<SignedPayload> {
        let nonce = descriptor
            .nonce
            .ok_or(BlockchainError::IncompleteDescriptor("nonce"))?;
        let chain_id = descriptor
            .chain_id
            .ok_or(BlockchainError::IncompleteDescriptor("chain id"))?;
        if descriptor.gas_limit == 0 {
            return Err(BlockchainError::IncompleteDescriptor("gas limit"));
        }

        let signer = credential.parse()?;
        let address = signer.address();
        if address != descriptor.from {
            return Err(BlockchainError::Wallet(format!(
                "credential controls {} but the transaction is from {}",
                address, descriptor.from
            )));
        }

        let request = TransactionRequest::default()
            .with_from(descriptor.from)
            .with_to(descriptor.to)
            .with_value(descriptor.value)
            .with_input(descriptor.input.clone())
            .with_nonce(nonce)
            .with_gas_price(descriptor.gas_price)
            .with_gas_limit(descriptor.gas_limit)
            .with_chain_id(chain_id);

        let wallet = EthereumWallet::from(signer);
        let envelope = request
            .build(&wallet)
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Signing failed: {}", e)))?;

        let hash = *envelope.tx_hash();
        let raw_hex = alloy::hex::encode_prefixed(envelope.encoded_2718());

        let payload = SignedPayload {
            raw_hex,
            signer: address,
            hash,
        };
        payload.validate()?;
        Ok(payload)
    }
}
