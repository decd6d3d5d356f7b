//! Startup orchestration.
//!
//! # Responsibilities
//! - Build chain handles, the store and the relay service from config
//! - Restore reservations of reloaded records
//! - Start background tasks (gas refreshers, expiry sweeper)

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;

use crate::blockchain::{BlockchainClient, BlockchainError};
use crate::config::RelayConfig;
use crate::lifecycle::Shutdown;
use crate::relay::{
    ChainRegistry, EnvKeyProvider, ExpirySweeper, NonceAllocator, RelayService, StoreError, TransactionStore,
};
use crate::resilience::RetryPolicy;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("chain setup failed: {0}")]
    Chain(#[from] BlockchainError),

    #[error("transaction store could not be loaded: {0}")]
    Store(#[from] StoreError),
}

/// Assemble the relay service described by `config`.
pub async fn build_service(config: &RelayConfig) -> Result<Arc<RelayService>, StartupError> {
    let chains = ChainRegistry::from_config(config)?;
    verify_chains(config).await;

    let store = match &config.relay.store_path {
        Some(path) => TransactionStore::load_from_file(path)?,
        None => TransactionStore::new(None),
    };

    let service = RelayService::new(
        chains,
        NonceAllocator::new(RetryPolicy::from(&config.retries)),
        store,
        Arc::new(EnvKeyProvider::new(config.relay.key_env_prefix.clone())),
        config.relay.clone(),
    );
    service.restore().await;

    tracing::info!(
        chains = ?service.chains().names(),
        records = service.store().len(),
        ttl_secs = config.relay.ttl_secs,
        "Relay service ready"
    );
    Ok(Arc::new(service))
}

/// Compare each node's chain id with the configured one.
///
/// Unreachable nodes are tolerated at startup; reads retry later.
async fn verify_chains(config: &RelayConfig) {
    let timeout = Duration::from_secs(config.timeouts.upstream_secs);
    for chain in &config.chains {
        let result = match BlockchainClient::new(chain, timeout) {
            Ok(client) => client.verify_chain_id().await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::debug!(chain = %chain.name, chain_id = chain.chain_id, "Chain id verified"),
            Err(BlockchainError::ChainMismatch { expected, actual }) => tracing::error!(
                chain = %chain.name,
                expected,
                actual,
                "Node reports a different chain id; signed payloads will be rejected"
            ),
            Err(e) => tracing::warn!(chain = %chain.name, error = %e, "Could not verify chain id"),
        }
    }
}

/// Spawn gas refreshers and the expiry sweeper.
pub fn spawn_background(
    service: Arc<RelayService>,
    config: &RelayConfig,
    shutdown: &Shutdown,
) -> Vec<JoinHandle<()>> {
    let mut tasks = Vec::new();
    for chain in service.chains().iter() {
        let gas = chain.gas.clone();
        tasks.push(tokio::spawn(gas.run(shutdown.subscribe())));
    }

    let sweeper = ExpirySweeper::new(
        service,
        Duration::from_secs(config.relay.sweep_interval_secs),
    );
    tasks.push(tokio::spawn(sweeper.run(shutdown.subscribe())));
    tasks
}
