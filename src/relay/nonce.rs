//! Per-account nonce reservations.
//!
//! Each `(chain, address)` key has its own async mutex, held across the
//! upstream read so concurrent prepares for one sender are serialized while
//! different senders proceed in parallel. The next nonce is
//!
//! ```text
//! max(upstream latest count, floor, highest outstanding + 1)
//! ```
//!
//! where `floor` is one past the last nonce handed to the network. The floor
//! protects against a node whose "latest" count lags a send we just made.

use alloy::primitives::Address;
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::blockchain::{BlockchainError, ChainRpc};
use crate::observability::metrics;
use crate::relay::error::{RelayError, RelayResult};
use crate::resilience::{retry_with_bound, RetryPolicy};

type NonceKey = (String, Address);

#[derive(Debug)]
struct AccountNonces {
    floor: u64,
    outstanding: BTreeSet<u64>,
    touched: Instant,
}

impl Default for AccountNonces {
    fn default() -> Self {
        Self {
            floor: 0,
            outstanding: BTreeSet::new(),
            touched: Instant::now(),
        }
    }
}

impl AccountNonces {
    fn next(&self, upstream: u64) -> u64 {
        let after_outstanding = self.outstanding.last().map(|n| n + 1).unwrap_or(0);
        upstream.max(self.floor).max(after_outstanding)
    }
}

/// Hands out distinct nonces per sender until they reach a terminal state.
pub struct NonceAllocator {
    accounts: DashMap<NonceKey, Arc<Mutex<AccountNonces>>>,
    reservations: DashMap<String, usize>,
    retry: RetryPolicy,
}

impl NonceAllocator {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            accounts: DashMap::new(),
            reservations: DashMap::new(),
            retry,
        }
    }

    fn account(&self, address: Address, chain: &str) -> Arc<Mutex<AccountNonces>> {
        self.accounts
            .entry((chain.to_string(), address))
            .or_default()
            .clone()
    }

    fn adjust_reservations(&self, chain: &str, added: bool) {
        let mut count = self.reservations.entry(chain.to_string()).or_insert(0);
        if added {
            *count += 1;
        } else {
            *count = count.saturating_sub(1);
        }
        metrics::record_nonce_reservations(chain, *count);
    }

    async fn read_upstream(&self, address: Address, chain: &str, rpc: &dyn ChainRpc) -> RelayResult<u64> {
        retry_with_bound(
            self.retry,
            "transaction_count",
            BlockchainError::is_transient,
            move |_| rpc.transaction_count(address),
        )
        .await
        .map_err(|e| {
            tracing::warn!(chain, sender = %address, error = %e, "Nonce read failed");
            RelayError::UpstreamUnavailable(format!("could not read nonce: {}", e))
        })
    }

    /// Reserve the next nonce for `address` on `chain`.
    ///
    /// Nothing is reserved when the upstream read fails.
    pub async fn allocate(&self, address: Address, chain: &str, rpc: &dyn ChainRpc) -> RelayResult<u64> {
        let account = self.account(address, chain);
        let mut nonces = account.lock().await;

        let upstream = self.read_upstream(address, chain, rpc).await?;
        let nonce = nonces.next(upstream);
        nonces.outstanding.insert(nonce);
        nonces.touched = Instant::now();
        drop(nonces);

        self.adjust_reservations(chain, true);
        tracing::debug!(chain, sender = %address, upstream, nonce, "Nonce reserved");
        Ok(nonce)
    }

    /// Drop a reservation whose transaction never reached the network.
    pub async fn release(&self, address: Address, chain: &str, nonce: u64) {
        let account = self.account(address, chain);
        let removed = {
            let mut nonces = account.lock().await;
            nonces.touched = Instant::now();
            nonces.outstanding.remove(&nonce)
        };
        if removed {
            self.adjust_reservations(chain, false);
            tracing::debug!(chain, sender = %address, nonce, "Nonce released");
        }
    }

    /// Settle a reservation whose transaction was (or may have been) sent.
    pub async fn mark_broadcast(&self, address: Address, chain: &str, nonce: u64) {
        let account = self.account(address, chain);
        let mut nonces = account.lock().await;
        let removed = nonces.outstanding.remove(&nonce);
        nonces.floor = nonces.floor.max(nonce + 1);
        nonces.touched = Instant::now();
        drop(nonces);
        if removed {
            self.adjust_reservations(chain, false);
        }
    }

    /// Replace a nonce the chain refused with a freshly read one.
    ///
    /// `stale` means the chain reported the old nonce as already used; the
    /// floor then moves past it so the re-read cannot return it again.
    pub async fn reallocate(
        &self,
        address: Address,
        chain: &str,
        old: u64,
        stale: bool,
        rpc: &dyn ChainRpc,
    ) -> RelayResult<u64> {
        let account = self.account(address, chain);
        let mut nonces = account.lock().await;
        let removed = nonces.outstanding.remove(&old);
        if stale {
            nonces.floor = nonces.floor.max(old + 1);
        }
        nonces.touched = Instant::now();

        let upstream = match self.read_upstream(address, chain, rpc).await {
            Ok(upstream) => upstream,
            Err(e) => {
                drop(nonces);
                if removed {
                    self.adjust_reservations(chain, false);
                }
                return Err(e);
            }
        };
        let nonce = nonces.next(upstream);
        nonces.outstanding.insert(nonce);
        drop(nonces);
        if !removed {
            self.adjust_reservations(chain, true);
        }
        tracing::info!(chain, sender = %address, old, nonce, upstream, "Nonce reallocated");
        Ok(nonce)
    }

    /// Re-reserve a nonce recorded before a restart.
    pub async fn reserve_existing(&self, address: Address, chain: &str, nonce: u64) {
        let account = self.account(address, chain);
        let inserted = {
            let mut nonces = account.lock().await;
            nonces.touched = Instant::now();
            nonces.outstanding.insert(nonce)
        };
        if inserted {
            self.adjust_reservations(chain, true);
        }
    }

    /// Forget accounts with nothing reserved and no activity for `max_idle`.
    ///
    /// An entry still referenced by an in-flight call is kept. Returns the
    /// number of accounts dropped.
    pub fn prune_idle(&self, max_idle: Duration) -> usize {
        let before = self.accounts.len();
        self.accounts.retain(|_, account| {
            if Arc::strong_count(account) > 1 {
                return true;
            }
            match account.try_lock() {
                Ok(nonces) => !(nonces.outstanding.is_empty() && nonces.touched.elapsed() >= max_idle),
                Err(_) => true,
            }
        });
        before.saturating_sub(self.accounts.len())
    }

    /// Reservations counted for a chain, as reported to the gauge.
    pub fn reserved_count(&self, chain: &str) -> usize {
        self.reservations.get(chain).map(|c| *c).unwrap_or(0)
    }

    /// Number of accounts currently tracked.
    pub fn tracked_accounts(&self) -> usize {
        self.accounts.len()
    }

    /// Nonces currently reserved for an account, ascending.
    pub async fn outstanding(&self, address: Address, chain: &str) -> Vec<u64> {
        let account = self.account(address, chain);
        let nonces = account.lock().await;
        nonces.outstanding.iter().copied().collect()
    }
}
