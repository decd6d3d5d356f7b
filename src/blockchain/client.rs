//! Blockchain RPC client with timeout and error handling.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers)
//! - Query chain state needed by the relay (nonce, gas price, known transactions)
//! - Handle timeouts and network errors gracefully

use alloy::primitives::{Address, TxHash};
use alloy::providers::{Provider, ProviderBuilder};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::config::ChainConfig;
use crate::resilience::with_deadline;

/// Read access to a chain node.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Transaction count of `address` at the "latest" block.
    async fn transaction_count(&self, address: Address) -> BlockchainResult<u64>;

    /// Node's current gas price estimate in wei.
    async fn gas_price(&self) -> BlockchainResult<u128>;

    /// Whether the node knows a transaction with this hash (pending or mined).
    async fn transaction_known(&self, hash: TxHash) -> BlockchainResult<bool>;
}

/// Blockchain RPC client wrapper with failover support.
#[derive(Clone)]
pub struct BlockchainClient {
    /// List of providers (primary + failovers).
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    rpc_url: String,
    chain_id: u64,
    /// Request timeout duration.
    timeout_duration: Duration,
}

impl BlockchainClient {
    /// Create a new client for a configured chain.
    ///
    /// Fails only if the primary RPC URL cannot be parsed; connectivity is
    /// checked separately by [`BlockchainClient::verify_chain_id`].
    pub fn new(chain: &ChainConfig, timeout_duration: Duration) -> BlockchainResult<Self> {
        let mut providers = Vec::new();

        let primary_url: url::Url = chain.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", chain.rpc_url, e))
        })?;
        providers.push(
            Arc::new(ProviderBuilder::new().connect_http(primary_url))
                as Arc<dyn Provider + Send + Sync>,
        );

        for url_str in &chain.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url))
                    as Arc<dyn Provider + Send + Sync>);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        Ok(Self {
            providers,
            rpc_url: chain.rpc_url.clone(),
            chain_id: chain.chain_id,
            timeout_duration,
        })
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let actual = self.get_chain_id().await?;
        if actual != self.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<u64> {
        let mut timed_out = false;
        for (i, provider) in self.providers.iter().enumerate() {
            match with_deadline(self.timeout_duration, provider.get_chain_id()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(self.exhausted("chain id", timed_out))
    }

    fn exhausted(&self, what: &str, timed_out: bool) -> BlockchainError {
        if timed_out && self.providers.len() == 1 {
            BlockchainError::Timeout(self.timeout_duration.as_secs())
        } else {
            BlockchainError::Rpc(format!("All RPC providers failed to get {}", what))
        }
    }

    /// Configured chain id.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

#[async_trait]
impl ChainRpc for BlockchainClient {
    async fn transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        let mut timed_out = false;
        for (i, provider) in self.providers.iter().enumerate() {
            let fut = provider.get_transaction_count(address).latest();
            match with_deadline(self.timeout_duration, fut).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(provider_idx = i, "RPC timeout");
                }
            }
        }
        Err(self.exhausted("transaction count", timed_out))
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        let mut timed_out = false;
        for (i, provider) in self.providers.iter().enumerate() {
            match with_deadline(self.timeout_duration, provider.get_gas_price()).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(provider_idx = i, "RPC timeout");
                }
            }
        }
        Err(self.exhausted("gas price", timed_out))
    }

    async fn transaction_known(&self, hash: TxHash) -> BlockchainResult<bool> {
        let mut timed_out = false;
        for (i, provider) in self.providers.iter().enumerate() {
            match with_deadline(self.timeout_duration, provider.get_transaction_by_hash(hash)).await {
                Ok(Ok(result)) => return Ok(result.is_some()),
                Ok(Err(e)) => tracing::warn!(provider_idx = i, error = %e, "RPC error"),
                Err(_) => {
                    timed_out = true;
                    tracing::warn!(provider_idx = i, "RPC timeout");
                }
            }
        }
        Err(self.exhausted("transaction", timed_out))
    }
}

impl std::fmt::Debug for BlockchainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockchainClient")
            .field("rpc_url", &self.rpc_url)
            .field("chain_id", &self.chain_id)
            .field("providers", &self.providers.len())
            .field("timeout_secs", &self.timeout_duration.as_secs())
            .finish()
    }
}
