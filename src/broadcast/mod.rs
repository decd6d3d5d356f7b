//! Broadcast subsystem.
//!
//! # Data Flow
//! ```text
//! SignedPayload
//!     → router.rs (primary path for the chain)
//!         → direct.rs | relay_api.rs (one HTTP submission each)
//!         → classify.rs (Accepted | Rejected | Transport | Ambiguous)
//!     → on Transport/Ambiguous: secondary path, once
//!     → still unresolved: ask the node whether the local hash is known
//!     → BroadcastReport (every attempt + final result)
//! ```
//!
//! # Design Decisions
//! - Chain-level rejections never fall back; another path cannot fix them
//! - Acceptance is recognised under any HTTP status
//! - Provider ids are normalized to the 0x-prefixed keccak hash format

pub mod classify;
pub mod direct;
pub mod relay_api;
pub mod router;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use classify::{
    classify, normalize_hash, ChainRejection, RejectionKind, TransportFailure, UpstreamReply,
    Verdict,
};
pub use direct::DirectRpcTransport;
pub use relay_api::RelayApiTransport;
pub use router::{BroadcastFailure, BroadcastOutcome, BroadcastReport, BroadcastRouter, BroadcastSuccess};

/// Upstream path a payload was submitted through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastPath {
    Direct,
    Relay,
}

impl BroadcastPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastPath::Direct => "direct",
            BroadcastPath::Relay => "relay",
        }
    }
}

impl fmt::Display for BroadcastPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One way of getting a signed payload to the network.
#[async_trait]
pub trait BroadcastTransport: Send + Sync {
    fn path(&self) -> BroadcastPath;

    /// Submit the `0x`-prefixed payload and return the raw HTTP answer.
    async fn submit(&self, raw_hex: &str) -> Result<UpstreamReply, TransportFailure>;
}

pub(crate) fn map_reqwest_error(e: reqwest::Error) -> TransportFailure {
    if e.is_timeout() {
        TransportFailure::Timeout
    } else if e.is_connect() {
        TransportFailure::Connect(e.to_string())
    } else {
        TransportFailure::Other(e.to_string())
    }
}
