//! Relay records and receipts.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::blockchain::{TransferRequest, UnsignedDescriptor};
use crate::broadcast::{BroadcastOutcome, BroadcastPath};

/// Lifecycle of a prepared transaction.
///
/// ```text
/// PREPARED ──claim──▶ CONFIRMING ──▶ SENT | FAILED
///    │  ▲                  │
///    │  └──signing error───┘
///    └──ttl──▶ EXPIRED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    Prepared,
    /// A confirm call holds the record.
    Confirming,
    Sent,
    Failed,
    Expired,
}

impl TransactionState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Sent | TransactionState::Failed | TransactionState::Expired
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Prepared => "PREPARED",
            TransactionState::Confirming => "CONFIRMING",
            TransactionState::Sent => "SENT",
            TransactionState::Failed => "FAILED",
            TransactionState::Expired => "EXPIRED",
        }
    }
}

/// A relay request and everything reserved for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreparedTransaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub request: TransferRequest,
    pub descriptor: UnsignedDescriptor,
    pub state: TransactionState,
    /// Unix seconds.
    pub created_at: u64,
    pub updated_at: u64,
    pub expires_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub broadcast_path: Option<BroadcastPath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub attempts: Vec<BroadcastOutcome>,
}

impl PreparedTransaction {
    pub fn nonce(&self) -> u64 {
        self.descriptor.nonce.unwrap_or_default()
    }
}

/// Result of a successful prepare.
#[derive(Debug, Clone)]
pub struct PrepareReceipt {
    pub record: PreparedTransaction,
    /// Maximum fee in whole native units.
    pub estimated_fee: String,
    pub explorer_url: String,
}

/// Result of a successful confirm.
#[derive(Debug, Clone)]
pub struct ConfirmReceipt {
    pub id: String,
    pub tx_hash: TxHash,
    pub state: TransactionState,
    pub path: BroadcastPath,
    /// The upstream answered with a non-2xx status but held the transaction.
    pub disguised: bool,
    pub explorer_url: String,
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Explorer link for a transaction hash, empty when no explorer is configured.
pub fn explorer_tx_url(explorer: &str, hash: &TxHash) -> String {
    if explorer.is_empty() {
        return String::new();
    }
    format!("{}/tx/{}", explorer.trim_end_matches('/'), hash)
}
