//! Gas price cache.
//!
//! One refresh task per chain polls the node; request handlers read the last
//! snapshot without a network round trip.

use arc_swap::ArcSwapOption;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::blockchain::client::ChainRpc;
use crate::blockchain::types::{BlockchainError, BlockchainResult};
use crate::config::GasConfig;
use crate::observability::metrics;
use crate::resilience::{retry_with_bound, RetryPolicy};

const WEI_PER_GWEI: u128 = 1_000_000_000;

/// A gas price observation after multiplier and floor are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasQuote {
    pub wei: u128,
    pub fetched_at: Instant,
}

/// Read-mostly gas price snapshot shared by all requests on a chain.
pub struct GasPriceCache {
    chain: String,
    rpc: Arc<dyn ChainRpc>,
    config: GasConfig,
    retry: RetryPolicy,
    latest: ArcSwapOption<GasQuote>,
}

impl GasPriceCache {
    pub fn new(chain: impl Into<String>, rpc: Arc<dyn ChainRpc>, config: GasConfig, retry: RetryPolicy) -> Self {
        Self {
            chain: chain.into(),
            rpc,
            config,
            retry,
            latest: ArcSwapOption::empty(),
        }
    }

    /// Current gas price in wei.
    ///
    /// Served from the snapshot unless it is missing or older than three
    /// refresh intervals, in which case the node is queried inline with
    /// bounded retries.
    pub async fn current(&self) -> BlockchainResult<u128> {
        let max_age = Duration::from_secs(self.config.refresh_secs.saturating_mul(3));
        let quote = match self.latest.load_full() {
            Some(q) if q.fetched_at.elapsed() <= max_age => *q,
            _ => {
                retry_with_bound(self.retry, "gas_price", BlockchainError::is_transient, |_| self.refresh())
                    .await?
            }
        };
        self.guard(quote.wei)
    }

    /// Fetch a fresh price from the node and store it.
    pub async fn refresh(&self) -> BlockchainResult<GasQuote> {
        let raw = self.rpc.gas_price().await?;
        let quote = GasQuote {
            wei: self.adjust(raw),
            fetched_at: Instant::now(),
        };
        self.latest.store(Some(Arc::new(quote)));
        metrics::record_gas_price(&self.chain, quote.wei);
        tracing::debug!(chain = %self.chain, raw_wei = raw, wei = quote.wei, "Gas price refreshed");
        Ok(quote)
    }

    /// Last stored quote, if any.
    pub fn snapshot(&self) -> Option<GasQuote> {
        self.latest.load_full().map(|q| *q)
    }

    fn adjust(&self, raw: u128) -> u128 {
        let scaled = (raw as f64 * self.config.multiplier) as u128;
        scaled.max(self.config.min_gwei as u128 * WEI_PER_GWEI)
    }

    fn guard(&self, wei: u128) -> BlockchainResult<u128> {
        let gwei = wei / WEI_PER_GWEI;
        if gwei > self.config.max_gwei as u128 {
            return Err(BlockchainError::GasPriceTooHigh {
                current_gwei: u64::try_from(gwei).unwrap_or(u64::MAX),
                max_gwei: self.config.max_gwei,
            });
        }
        Ok(wei)
    }

    /// Refresh on a fixed interval until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.refresh_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        tracing::warn!(chain = %self.chain, error = %e, "Gas price refresh failed");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!(chain = %self.chain, "Gas refresher stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::MockRpc;

    fn config() -> GasConfig {
        GasConfig {
            multiplier: 1.5,
            min_gwei: 30,
            max_gwei: 100,
            ..GasConfig::default()
        }
    }

    #[tokio::test]
    async fn test_multiplier_and_floor() {
        let rpc = Arc::new(MockRpc::new(0));
        rpc.set_gas_price(40 * WEI_PER_GWEI);
        let cache = GasPriceCache::new("polygon", rpc.clone(), config(), RetryPolicy::once());
        assert_eq!(cache.current().await.unwrap(), 60 * WEI_PER_GWEI);

        rpc.set_gas_price(WEI_PER_GWEI);
        cache.refresh().await.unwrap();
        assert_eq!(cache.current().await.unwrap(), 30 * WEI_PER_GWEI);
    }

    #[tokio::test]
    async fn test_serves_snapshot_between_refreshes() {
        let rpc = Arc::new(MockRpc::new(0));
        rpc.set_gas_price(40 * WEI_PER_GWEI);
        let cache = GasPriceCache::new("polygon", rpc.clone(), config(), RetryPolicy::once());
        cache.current().await.unwrap();
        cache.current().await.unwrap();
        assert_eq!(rpc.gas_price_calls(), 1);
    }

    #[tokio::test]
    async fn test_spike_rejected() {
        let rpc = Arc::new(MockRpc::new(0));
        rpc.set_gas_price(90 * WEI_PER_GWEI);
        let cache = GasPriceCache::new("polygon", rpc, config(), RetryPolicy::once());
        let err = cache.current().await.unwrap_err();
        assert!(matches!(err, BlockchainError::GasPriceTooHigh { current_gwei: 135, max_gwei: 100 }));
    }

    #[tokio::test]
    async fn test_inline_read_retries_transient_failure() {
        let rpc = Arc::new(MockRpc::new(0));
        rpc.set_gas_price(40 * WEI_PER_GWEI);
        rpc.fail_gas_reads(1);
        let retry = RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let cache = GasPriceCache::new("polygon", rpc.clone(), config(), retry);

        assert_eq!(cache.current().await.unwrap(), 60 * WEI_PER_GWEI);
        assert_eq!(rpc.gas_price_calls(), 2);
    }

    #[tokio::test]
    async fn test_inline_read_gives_up_after_bound() {
        let rpc = Arc::new(MockRpc::new(0));
        rpc.fail_gas_reads(5);
        let retry = RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 2,
        };
        let cache = GasPriceCache::new("polygon", rpc.clone(), config(), retry);

        assert!(cache.current().await.unwrap_err().is_transient());
        assert_eq!(rpc.gas_price_calls(), 2);
        assert!(cache.snapshot().is_none());
    }
}
