//! Per-chain wiring: RPC client, gas cache, builder and broadcast router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{BlockchainClient, BlockchainResult, ChainRpc, GasPriceCache, TransactionBuilder};
use crate::broadcast::{BroadcastRouter, BroadcastTransport, DirectRpcTransport, RelayApiTransport};
use crate::config::{normalize_chain_name, ChainConfig, PrimaryPath, RelayConfig};
use crate::relay::error::{RelayError, RelayResult};
use crate::resilience::RetryPolicy;

/// Everything the relay needs to serve one chain.
pub struct ChainHandle {
    pub config: ChainConfig,
    pub rpc: Arc<dyn ChainRpc>,
    pub gas: Arc<GasPriceCache>,
    pub builder: TransactionBuilder,
    pub router: BroadcastRouter,
}

impl ChainHandle {
    /// Assemble a handle from already-built collaborators.
    pub fn new(
        config: ChainConfig,
        rpc: Arc<dyn ChainRpc>,
        primary: Arc<dyn BroadcastTransport>,
        secondary: Option<Arc<dyn BroadcastTransport>>,
    ) -> Self {
        let gas = Arc::new(GasPriceCache::new(
            config.name.clone(),
            rpc.clone(),
            config.gas.clone(),
            RetryPolicy::default(),
        ));
        let builder = TransactionBuilder::new(config.clone());
        let router = BroadcastRouter::new(config.name.clone(), primary, secondary, Some(rpc.clone()));
        Self {
            config,
            rpc,
            gas,
            builder,
            router,
        }
    }

    /// Replace the retry bound used for inline gas price reads.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.gas = Arc::new(GasPriceCache::new(
            self.config.name.clone(),
            self.rpc.clone(),
            self.config.gas.clone(),
            retry,
        ));
        self
    }

    /// Build real network clients for a configured chain.
    pub fn from_config(config: &ChainConfig, upstream_timeout: Duration, retry: RetryPolicy) -> BlockchainResult<Self> {
        let client = BlockchainClient::new(config, upstream_timeout)?;
        let rpc: Arc<dyn ChainRpc> = Arc::new(client);

        let transport_err =
            |e: reqwest::Error| crate::blockchain::BlockchainError::Rpc(format!("HTTP client: {}", e));
        let direct: Arc<dyn BroadcastTransport> =
            Arc::new(DirectRpcTransport::new(config.rpc_url.clone(), upstream_timeout).map_err(transport_err)?);
        let relay: Option<Arc<dyn BroadcastTransport>> = match &config.relay {
            Some(relay) => Some(Arc::new(RelayApiTransport::new(relay, upstream_timeout).map_err(transport_err)?)),
            None => None,
        };

        let (primary, secondary) = match (config.primary, relay) {
            (PrimaryPath::Relay, Some(relay)) => (relay, Some(direct)),
            (PrimaryPath::Direct, relay) => (direct, relay),
            // rejected by config validation
            (PrimaryPath::Relay, None) => (direct, None),
        };

        tracing::info!(
            chain = %config.name,
            chain_id = config.chain_id,
            primary = %primary.path(),
            fallback = ?secondary.as_ref().map(|s| s.path()),
            "Chain configured"
        );
        Ok(Self::new(config.clone(), rpc, primary, secondary).with_retry(retry))
    }
}

/// Lookup of chain handles by canonical name or alias.
#[derive(Default)]
pub struct ChainRegistry {
    chains: HashMap<String, Arc<ChainHandle>>,
    aliases: HashMap<String, String>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &RelayConfig) -> BlockchainResult<Self> {
        let timeout = Duration::from_secs(config.timeouts.upstream_secs);
        let retry = RetryPolicy::from(&config.retries);
        let mut registry = Self::new();
        for chain in &config.chains {
            registry.insert(ChainHandle::from_config(chain, timeout, retry)?);
        }
        Ok(registry)
    }

    pub fn insert(&mut self, handle: ChainHandle) {
        let name = normalize_chain_name(&handle.config.name);
        for alias in &handle.config.aliases {
            self.aliases.insert(normalize_chain_name(alias), name.clone());
        }
        self.chains.insert(name, Arc::new(handle));
    }

    /// Resolve a caller-supplied chain name.
    pub fn resolve(&self, name: &str) -> RelayResult<Arc<ChainHandle>> {
        let key = normalize_chain_name(name);
        if key.is_empty() {
            return Err(RelayError::InvalidRequest("blockchain is required".into()));
        }
        let canonical = self.aliases.get(&key).unwrap_or(&key);
        self.chains
            .get(canonical)
            .cloned()
            .ok_or_else(|| RelayError::InvalidRequest(format!("unsupported blockchain '{}'", name.trim())))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ChainHandle>> {
        self.chains.values()
    }

    /// Canonical chain names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.chains.keys().cloned().collect();
        names.sort();
        names
    }
}
