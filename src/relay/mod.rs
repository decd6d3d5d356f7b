//! Two-phase transaction relay.
//!
//! # Data Flow
//! ```text
//! prepare(request)
//!     → chains.rs (resolve chain + alias)
//!     → TransactionBuilder::validate
//!     → GasPriceCache::current
//!     → nonce.rs (reserve next nonce for sender)
//!     → store.rs (PREPARED, expires after ttl)
//!
//! confirm(id)
//!     → store.rs claim (PREPARED → CONFIRMING, exactly one winner)
//!     → keys.rs (credential unless supplied)
//!     → PayloadSigner::sign
//!     → BroadcastRouter::broadcast
//!     → store.rs (SENT | FAILED), nonce settled or released
//!
//! sweeper.rs (interval)
//!     → PREPARED past ttl → EXPIRED, nonce released
//!     → terminal past grace → purged
//! ```
//!
//! # Design Decisions
//! - A nonce is released only when its payload provably never reached the network
//! - Signing failures return the record to PREPARED so the caller can retry
//! - Records owned by another user look exactly like missing ones

pub mod chains;
pub mod error;
pub mod keys;
pub mod nonce;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod types;

#[cfg(test)]
pub mod testing;

pub use chains::{ChainHandle, ChainRegistry};
pub use error::{RelayError, RelayResult};
pub use keys::{EnvKeyProvider, KeyError, KeyProvider};
pub use nonce::NonceAllocator;
pub use service::{ConfirmRequest, RelayService};
pub use store::{ClaimError, Completion, StoreError, TransactionStore};
pub use sweeper::ExpirySweeper;
pub use types::{ConfirmReceipt, PrepareReceipt, PreparedTransaction, TransactionState};
