//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! TransferRequest
//!     → transaction.rs (validate, assemble UnsignedDescriptor)
//!          ↑ nonce (relay::nonce)   ↑ gas price (gas.rs cache ← client.rs)
//!     → wallet.rs (sign with Credential → SignedPayload)
//!     → broadcast subsystem
//! ```
//!
//! # Security Constraints
//! - Credentials are never logged or persisted
//! - All RPC calls have configurable timeouts
//! - Graceful degradation when a chain node is unreachable

pub mod client;
pub mod gas;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{BlockchainClient, ChainRpc};
pub use gas::{GasPriceCache, GasQuote};
pub use transaction::{parse_address, parse_amount, TransactionBuilder, ValidatedTransfer};
pub use types::{
    BlockchainError, BlockchainResult, SignedPayload, TransferRequest, UnsignedDescriptor,
};
pub use wallet::{Credential, PayloadSigner};
