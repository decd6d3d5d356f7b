//! Caller-facing relay errors.

use thiserror::Error;

use crate::blockchain::BlockchainError;
use crate::broadcast::{ChainRejection, RejectionKind};
use crate::relay::keys::KeyError;
use crate::relay::store::StoreError;

/// Result type for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Everything prepare, confirm or lookup can fail with.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    /// Malformed address, amount, chain or body. Never retried.
    #[error("{0}")]
    InvalidRequest(String),

    /// Nonce or gas read failed after bounded retries.
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Bad credential or incomplete transaction.
    #[error("Signing failed: {0}")]
    SigningError(String),

    /// The chain still rejects the nonce after one re-read.
    #[error("Nonce conflict: {0}")]
    NonceConflict(String),

    /// Definite chain-level rejection.
    #[error("Broadcast rejected: {message}")]
    BroadcastRejected { kind: RejectionKind, message: String },

    /// Neither path confirmed or refuted the send.
    #[error("Broadcast outcome unknown: {0}")]
    AmbiguousBroadcastFailure(String),

    #[error("Transaction {0} not found")]
    NotFound(String),

    #[error("Transaction {0} is already being finalized")]
    AlreadyFinalizing(String),

    #[error("Transaction {0} has expired; prepare a new one")]
    Expired(String),

    #[error("Gas price {current_gwei} gwei exceeds maximum {max_gwei} gwei")]
    GasPriceTooHigh { current_gwei: u64, max_gwei: u64 },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl RelayError {
    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::InvalidRequest(_) => "InvalidRequest",
            RelayError::UpstreamUnavailable(_) => "UpstreamUnavailable",
            RelayError::SigningError(_) => "SigningError",
            RelayError::NonceConflict(_) => "NonceConflict",
            RelayError::BroadcastRejected { .. } => "BroadcastRejected",
            RelayError::AmbiguousBroadcastFailure(_) => "AmbiguousBroadcastFailure",
            RelayError::NotFound(_) => "NotFound",
            RelayError::AlreadyFinalizing(_) => "AlreadyFinalizing",
            RelayError::Expired(_) => "Expired",
            RelayError::GasPriceTooHigh { .. } => "GasPriceTooHigh",
            RelayError::Storage(_) => "Storage",
        }
    }
}

impl From<BlockchainError> for RelayError {
    fn from(err: BlockchainError) -> Self {
        match err {
            BlockchainError::Rpc(_) | BlockchainError::Timeout(_) | BlockchainError::ChainMismatch { .. } => {
                RelayError::UpstreamUnavailable(err.to_string())
            }
            BlockchainError::Wallet(msg) => RelayError::SigningError(msg),
            BlockchainError::IncompleteDescriptor(_) | BlockchainError::MalformedPayload(_) => {
                RelayError::SigningError(err.to_string())
            }
            BlockchainError::GasPriceTooHigh {
                current_gwei,
                max_gwei,
            } => RelayError::GasPriceTooHigh {
                current_gwei,
                max_gwei,
            },
            BlockchainError::InvalidAddress(msg) | BlockchainError::InvalidAmount(msg) => {
                RelayError::InvalidRequest(msg)
            }
        }
    }
}

impl From<ChainRejection> for RelayError {
    fn from(rejection: ChainRejection) -> Self {
        match rejection.kind {
            RejectionKind::NonceConflict | RejectionKind::NonceGap => {
                RelayError::NonceConflict(rejection.message)
            }
            kind => RelayError::BroadcastRejected {
                kind,
                message: rejection.message,
            },
        }
    }
}

impl From<KeyError> for RelayError {
    fn from(err: KeyError) -> Self {
        RelayError::SigningError(err.to_string())
    }
}

impl From<StoreError> for RelayError {
    fn from(err: StoreError) -> Self {
        RelayError::Storage(err.to_string())
    }
}
