//! Upstream response classification.
//!
//! Broadcast providers do not agree on how to report an accepted
//! transaction: some answer 200 with a hash, some answer 400 to a redundant
//! resend of a transaction they already hold. Everything here is string and
//! field matching on provider bodies, checked in this order:
//!
//! 1. transport failure (timeout, connection refused)
//! 2. acceptance: a transaction hash in a known field, the locally computed
//!    hash anywhere in the body, or an acceptance phrase, under any status
//! 3. chain-level rejection phrases (never fixed by switching paths)
//! 4. gateway-style statuses (5xx, 401, 403, 404, 408, 429)
//! 5. everything else is ambiguous

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use crate::broadcast::BroadcastPath;

/// Raw HTTP answer from a broadcast upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamReply {
    pub status: u16,
    pub body: String,
}

/// The request never produced an HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportFailure {
    #[error("upstream timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Other(String),
}

/// Why a chain refused a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    /// Nonce already used or otherwise stale.
    NonceConflict,
    /// Nonce leaves a gap.
    NonceGap,
    InsufficientFunds,
    Underpriced,
    GasLimit,
    InvalidTransaction,
    Reverted,
    Other,
}

/// A definite chain-level rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainRejection {
    pub kind: RejectionKind,
    pub message: String,
}

/// Classified result of one broadcast attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The upstream holds the transaction. `disguised` is set when the
    /// acceptance arrived under a non-2xx status.
    Accepted { hash: TxHash, disguised: bool },
    Rejected(ChainRejection),
    /// No usable answer; another path may succeed.
    Transport(String),
    /// An answer that neither confirms nor refutes acceptance.
    Ambiguous(String),
}

impl Verdict {
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accepted { disguised: false, .. } => "accepted",
            Verdict::Accepted { disguised: true, .. } => "disguised_success",
            Verdict::Rejected(_) => "rejected",
            Verdict::Transport(_) => "transport",
            Verdict::Ambiguous(_) => "ambiguous",
        }
    }
}

const HASH_FIELDS: &[&str] = &[
    "txId",
    "txid",
    "tx_hash",
    "txHash",
    "transaction_hash",
    "transactionHash",
    "hash",
    "result",
];

const ACCEPTANCE_PHRASES: &[&str] = &[
    "transaction sent successfully",
    "already known",
    "known transaction",
    "already imported",
    "transaction already exists",
];

const REJECTION_PHRASES: &[(&str, RejectionKind)] = &[
    ("nonce too low", RejectionKind::NonceConflict),
    ("invalid nonce", RejectionKind::NonceConflict),
    ("nonce has already been used", RejectionKind::NonceConflict),
    ("nonce too high", RejectionKind::NonceGap),
    ("insufficient funds", RejectionKind::InsufficientFunds),
    ("replacement transaction underpriced", RejectionKind::Underpriced),
    ("transaction underpriced", RejectionKind::Underpriced),
    ("max fee per gas less than block base fee", RejectionKind::Underpriced),
    ("intrinsic gas too low", RejectionKind::GasLimit),
    ("exceeds block gas limit", RejectionKind::GasLimit),
    ("gas limit reached", RejectionKind::GasLimit),
    ("invalid sender", RejectionKind::InvalidTransaction),
    ("invalid signature", RejectionKind::InvalidTransaction),
    ("invalid chain id", RejectionKind::InvalidTransaction),
    ("only replay-protected", RejectionKind::InvalidTransaction),
    ("execution reverted", RejectionKind::Reverted),
];

/// JSON-RPC error codes a node uses for a transaction it refused.
const CHAIN_ERROR_CODES: &[i64] = &[-32000, -32003, -32602];

/// Classify one attempt. `local_hash` is the keccak hash of the payload sent.
pub fn classify(
    path: BroadcastPath,
    reply: &Result<UpstreamReply, TransportFailure>,
    local_hash: TxHash,
) -> Verdict {
    let reply = match reply {
        Ok(reply) => reply,
        Err(failure) => return Verdict::Transport(failure.to_string()),
    };

    let success_status = (200..300).contains(&reply.status);
    let lowered = reply.body.to_ascii_lowercase();
    let json: Option<Value> = serde_json::from_str(&reply.body).ok();

    if let Some(hash) = json.as_ref().and_then(find_hash) {
        if hash != local_hash {
            tracing::warn!(
                path = %path,
                upstream_hash = %hash,
                local_hash = %local_hash,
                "Upstream reported a different transaction hash"
            );
        }
        return Verdict::Accepted { hash, disguised: !success_status };
    }
    let local = local_hash.to_string();
    if lowered.contains(&local) || lowered.contains(local.trim_start_matches("0x"))
        || ACCEPTANCE_PHRASES.iter().any(|p| lowered.contains(p))
    {
        return Verdict::Accepted { hash: local_hash, disguised: !success_status };
    }

    let message = error_message(json.as_ref()).unwrap_or_else(|| truncate(&reply.body));
    if let Some((_, kind)) = REJECTION_PHRASES.iter().find(|(p, _)| lowered.contains(p)) {
        return Verdict::Rejected(ChainRejection { kind: *kind, message });
    }

    if reply.status >= 500 || matches!(reply.status, 401 | 403 | 404 | 408 | 429) {
        return Verdict::Transport(format!("upstream status {}: {}", reply.status, message));
    }

    if success_status {
        match (path, json.as_ref()) {
            (BroadcastPath::Direct, Some(v)) if v.get("error").is_some_and(|e| !e.is_null()) => {
                let code = v.get("error").and_then(|e| e.get("code")).and_then(Value::as_i64);
                if code.is_some_and(|c| CHAIN_ERROR_CODES.contains(&c)) {
                    return Verdict::Rejected(ChainRejection {
                        kind: RejectionKind::Other,
                        message,
                    });
                }
                // Internal errors and rate limits say nothing about the payload
                return Verdict::Transport(format!("node error {}: {}", code.unwrap_or_default(), message));
            }
            // Provider-assigned ids that are not hashes map onto the local hash
            (BroadcastPath::Relay, Some(v)) if has_opaque_id(v) => {
                return Verdict::Accepted { hash: local_hash, disguised: false };
            }
            _ => {}
        }
    }

    Verdict::Ambiguous(format!("upstream status {}: {}", reply.status, message))
}

/// Parse a 32-byte hex hash with or without `0x`.
pub fn normalize_hash(raw: &str) -> Option<TxHash> {
    let s = raw.trim();
    let body = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    if body.len() != 64 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    TxHash::from_str(body).ok()
}

fn find_hash(value: &Value) -> Option<TxHash> {
    match value {
        Value::Object(map) => {
            for field in HASH_FIELDS {
                if let Some(hash) = map.get(*field).and_then(Value::as_str).and_then(normalize_hash) {
                    return Some(hash);
                }
            }
            map.values().find_map(find_hash)
        }
        Value::Array(items) => items.iter().find_map(find_hash),
        _ => None,
    }
}

fn has_opaque_id(value: &Value) -> bool {
    ["txId", "txid", "id"]
        .iter()
        .any(|f| value.get(*f).and_then(Value::as_str).is_some_and(|s| !s.trim().is_empty()))
}

fn error_message(value: Option<&Value>) -> Option<String> {
    let value = value?;
    let pick = |v: &Value| -> Option<String> {
        ["message", "cause", "error", "detail"]
            .iter()
            .find_map(|f| v.get(*f).and_then(Value::as_str).map(String::from))
    };
    // JSON-RPC errors nest the message under "error"
    value
        .get("error")
        .filter(|e| e.is_object())
        .and_then(pick)
        .or_else(|| pick(value))
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 256;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut end = LIMIT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
