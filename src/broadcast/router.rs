//! Broadcast path selection and fallback.

use alloy::primitives::TxHash;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use crate::blockchain::{ChainRpc, SignedPayload};
use crate::broadcast::classify::{classify, ChainRejection, RejectionKind, Verdict};
use crate::broadcast::{BroadcastPath, BroadcastTransport};
use crate::observability::metrics;

/// Diagnostics for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
    pub path: BroadcastPath,
    pub verdict: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip)]
    pub body: Option<String>,
}

/// A send that reached the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSuccess {
    pub hash: TxHash,
    pub path: BroadcastPath,
    /// Acceptance arrived under a non-2xx status.
    pub disguised: bool,
    /// Acceptance was established by asking the node for the hash.
    pub probed: bool,
}

/// A send that did not provably reach the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastFailure {
    Rejected(ChainRejection),
    Ambiguous(String),
}

/// Every attempt made for one payload plus the final result.
#[derive(Debug, Clone)]
pub struct BroadcastReport {
    pub outcomes: Vec<BroadcastOutcome>,
    pub result: Result<BroadcastSuccess, BroadcastFailure>,
}

/// What the node said about a payload hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Probe {
    Known,
    Unknown,
    /// No probe configured or the lookup failed.
    Unavailable,
}

/// Routes a signed payload through the chain's primary path, falling back
/// to the secondary once on transport trouble.
pub struct BroadcastRouter {
    chain: String,
    primary: Arc<dyn BroadcastTransport>,
    secondary: Option<Arc<dyn BroadcastTransport>>,
    probe: Option<Arc<dyn ChainRpc>>,
}

impl BroadcastRouter {
    pub fn new(
        chain: impl Into<String>,
        primary: Arc<dyn BroadcastTransport>,
        secondary: Option<Arc<dyn BroadcastTransport>>,
        probe: Option<Arc<dyn ChainRpc>>,
    ) -> Self {
        Self {
            chain: chain.into(),
            primary,
            secondary,
            probe,
        }
    }

    pub fn primary_path(&self) -> BroadcastPath {
        self.primary.path()
    }

    pub async fn broadcast(&self, payload: &SignedPayload) -> BroadcastReport {
        let mut outcomes = Vec::with_capacity(2);

        let first = self.attempt(self.primary.as_ref(), payload, &mut outcomes).await;
        let hiccup = match first {
            Verdict::Accepted { hash, disguised } => {
                return self.success(outcomes, hash, self.primary.path(), disguised, false);
            }
            Verdict::Rejected(rejection) => {
                return BroadcastReport {
                    outcomes,
                    result: Err(BroadcastFailure::Rejected(rejection)),
                };
            }
            Verdict::Transport(reason) | Verdict::Ambiguous(reason) => reason,
        };

        let reason = match &self.secondary {
            Some(secondary) => {
                metrics::record_fallback(&self.chain);
                tracing::warn!(
                    chain = %self.chain,
                    from = %self.primary.path(),
                    to = %secondary.path(),
                    reason = %hiccup,
                    "Falling back to secondary broadcast path"
                );
                match self.attempt(secondary.as_ref(), payload, &mut outcomes).await {
                    Verdict::Accepted { hash, disguised } => {
                        return self.success(outcomes, hash, secondary.path(), disguised, false);
                    }
                    // The primary may have landed before its answer was lost
                    Verdict::Rejected(rejection) if rejection.kind == RejectionKind::NonceConflict => {
                        let result = match self.probe_known(payload.hash).await {
                            Probe::Known => {
                                return self.success(outcomes, payload.hash, self.primary.path(), false, true);
                            }
                            Probe::Unknown => Err(BroadcastFailure::Rejected(rejection)),
                            Probe::Unavailable => Err(BroadcastFailure::Ambiguous(format!(
                                "{} path: {}; {} path: {}; node could not say whether the payload landed",
                                self.primary.path(),
                                hiccup,
                                secondary.path(),
                                rejection.message
                            ))),
                        };
                        return BroadcastReport { outcomes, result };
                    }
                    Verdict::Rejected(rejection) => {
                        return BroadcastReport {
                            outcomes,
                            result: Err(BroadcastFailure::Rejected(rejection)),
                        };
                    }
                    Verdict::Transport(reason) | Verdict::Ambiguous(reason) => {
                        format!("{} path: {}; {} path: {}", self.primary.path(), hiccup, secondary.path(), reason)
                    }
                }
            }
            None => format!("{} path: {}", self.primary.path(), hiccup),
        };

        if self.probe_known(payload.hash).await == Probe::Known {
            return self.success(outcomes, payload.hash, self.primary.path(), false, true);
        }

        BroadcastReport {
            outcomes,
            result: Err(BroadcastFailure::Ambiguous(reason)),
        }
    }

    async fn attempt(
        &self,
        transport: &dyn BroadcastTransport,
        payload: &SignedPayload,
        outcomes: &mut Vec<BroadcastOutcome>,
    ) -> Verdict {
        let path = transport.path();
        let started = Instant::now();
        let reply = transport.submit(&payload.raw_hex).await;
        let verdict = classify(path, &reply, payload.hash);
        metrics::record_broadcast_attempt(&self.chain, path.as_str(), verdict.label(), started.elapsed());

        let (status, body) = match &reply {
            Ok(r) => (Some(r.status), Some(r.body.clone())),
            Err(_) => (None, None),
        };
        let (hash, error) = match &verdict {
            Verdict::Accepted { hash, .. } => (Some(*hash), None),
            Verdict::Rejected(r) => (None, Some(r.message.clone())),
            Verdict::Transport(e) | Verdict::Ambiguous(e) => (None, Some(e.clone())),
        };
        tracing::info!(
            chain = %self.chain,
            path = %path,
            verdict = verdict.label(),
            status = ?status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Broadcast attempt finished"
        );
        outcomes.push(BroadcastOutcome {
            path,
            verdict: verdict.label().to_string(),
            hash,
            error,
            status,
            body,
        });
        verdict
    }

    async fn probe_known(&self, hash: TxHash) -> Probe {
        let Some(rpc) = &self.probe else {
            return Probe::Unavailable;
        };
        match rpc.transaction_known(hash).await {
            Ok(known) => {
                tracing::info!(chain = %self.chain, tx_hash = %hash, known, "Probed node for transaction");
                if known {
                    Probe::Known
                } else {
                    Probe::Unknown
                }
            }
            Err(e) => {
                tracing::warn!(chain = %self.chain, error = %e, "Transaction probe failed");
                Probe::Unavailable
            }
        }
    }

    fn success(
        &self,
        outcomes: Vec<BroadcastOutcome>,
        hash: TxHash,
        path: BroadcastPath,
        disguised: bool,
        probed: bool,
    ) -> BroadcastReport {
        if disguised {
            metrics::record_disguised_success(&self.chain, path.as_str());
            tracing::info!(chain = %self.chain, path = %path, tx_hash = %hash, "Non-2xx answer reclassified as success");
        }
        BroadcastReport {
            outcomes,
            result: Ok(BroadcastSuccess {
                hash,
                path,
                disguised,
                probed,
            }),
        }
    }
}
