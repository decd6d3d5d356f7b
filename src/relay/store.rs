//! Transaction store with optional JSON persistence.
//!
//! Records live in a [`DashMap`]; every state transition is a
//! compare-and-set performed under the entry's shard lock, so exactly one
//! confirm call can move a record out of `PREPARED`.

use alloy::primitives::TxHash;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::blockchain::UnsignedDescriptor;
use crate::broadcast::{BroadcastOutcome, BroadcastPath};
use crate::observability::metrics;
use crate::relay::types::{PreparedTransaction, TransactionState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Why a record could not be claimed for confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Absent, owned by another user, or terminal beyond the grace window.
    NotFound,
    /// Another confirm holds it, or it already finished.
    AlreadyFinalizing,
    /// Past its TTL. Carries the record as it was before expiring.
    Expired(Box<PreparedTransaction>),
}

/// Final fields written when a confirm finishes.
#[derive(Debug, Clone)]
pub struct Completion {
    pub state: TransactionState,
    pub tx_hash: Option<TxHash>,
    pub path: Option<BroadcastPath>,
    pub error: Option<String>,
    pub attempts: Vec<BroadcastOutcome>,
}

/// Thread-safe store of prepared transactions.
#[derive(Clone, Default)]
pub struct TransactionStore {
    inner: Arc<DashMap<String, PreparedTransaction>>,
    persistence_path: Option<PathBuf>,
}

impl TransactionStore {
    /// Create a new empty store.
    pub fn new(persistence_path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Load from file if it exists, otherwise start empty.
    pub fn load_from_file(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let store = Self::new(Some(path.to_path_buf()));
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, PreparedTransaction> = serde_json::from_reader(reader)?;
            for (k, v) in map {
                store.inner.insert(k, v);
            }
            tracing::info!(path = %path.display(), records = store.inner.len(), "Loaded transaction store");
        }
        metrics::record_store_size(store.inner.len());
        Ok(store)
    }

    /// Write a snapshot to the persistence path, if one is configured.
    pub fn save_to_file(&self) -> StoreResult<()> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };
        let map: HashMap<_, _> = self
            .inner
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect();

        let tmp = path.with_extension("tmp");
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &map)?;
        }
        std::fs::rename(&tmp, path)?;
        tracing::debug!(path = %path.display(), records = map.len(), "Saved transaction store");
        Ok(())
    }

    pub fn insert(&self, record: PreparedTransaction) {
        self.inner.insert(record.id.clone(), record);
        metrics::record_store_size(self.inner.len());
    }

    pub fn get(&self, id: &str) -> Option<PreparedTransaction> {
        self.inner.get(id).map(|r| r.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Move a record from `PREPARED` to `CONFIRMING`.
    ///
    /// A `PREPARED` record past `expires_at` is expired here instead.
    pub fn claim(
        &self,
        id: &str,
        user_id: Option<&str>,
        now: u64,
        grace_secs: u64,
    ) -> Result<PreparedTransaction, ClaimError> {
        let mut entry = self.inner.get_mut(id).ok_or(ClaimError::NotFound)?;
        let record = entry.value_mut();

        if let Some(owner) = &record.user_id {
            if user_id != Some(owner.as_str()) {
                return Err(ClaimError::NotFound);
            }
        }

        match record.state {
            TransactionState::Prepared if now >= record.expires_at => {
                let before = record.clone();
                record.state = TransactionState::Expired;
                record.updated_at = now;
                Err(ClaimError::Expired(Box::new(before)))
            }
            TransactionState::Prepared => {
                record.state = TransactionState::Confirming;
                record.updated_at = now;
                Ok(record.clone())
            }
            TransactionState::Confirming => Err(ClaimError::AlreadyFinalizing),
            _ if now >= record.updated_at.saturating_add(grace_secs) => Err(ClaimError::NotFound),
            TransactionState::Expired => Err(ClaimError::Expired(Box::new(record.clone()))),
            TransactionState::Sent | TransactionState::Failed => Err(ClaimError::AlreadyFinalizing),
        }
    }

    /// Return a claimed record to `PREPARED` so the caller may retry.
    pub fn release_claim(&self, id: &str, now: u64) -> bool {
        match self.inner.get_mut(id) {
            Some(mut entry) if entry.state == TransactionState::Confirming => {
                entry.state = TransactionState::Prepared;
                entry.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Swap the descriptor of a claimed record (nonce reallocation).
    pub fn update_descriptor(&self, id: &str, descriptor: UnsignedDescriptor, now: u64) -> bool {
        match self.inner.get_mut(id) {
            Some(mut entry) if entry.state == TransactionState::Confirming => {
                entry.descriptor = descriptor;
                entry.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Move a claimed record to a terminal state.
    pub fn finish(&self, id: &str, completion: Completion, now: u64) -> Option<PreparedTransaction> {
        let mut entry = self.inner.get_mut(id)?;
        if entry.state != TransactionState::Confirming || !completion.state.is_terminal() {
            return None;
        }
        entry.state = completion.state;
        entry.tx_hash = completion.tx_hash;
        entry.broadcast_path = completion.path;
        entry.error = completion.error;
        entry.attempts.extend(completion.attempts);
        entry.updated_at = now;
        Some(entry.clone())
    }

    /// Expire every `PREPARED` record whose deadline has passed.
    pub fn expire_stale(&self, now: u64) -> Vec<PreparedTransaction> {
        let mut expired = Vec::new();
        for mut entry in self.inner.iter_mut() {
            if entry.state == TransactionState::Prepared && now >= entry.expires_at {
                entry.state = TransactionState::Expired;
                entry.updated_at = now;
                expired.push(entry.clone());
            }
        }
        expired
    }

    /// Drop terminal records older than the grace window.
    pub fn purge_terminal(&self, now: u64, grace_secs: u64) -> usize {
        let before = self.inner.len();
        self.inner
            .retain(|_, r| !(r.state.is_terminal() && now >= r.updated_at.saturating_add(grace_secs)));
        let purged = before.saturating_sub(self.inner.len());
        metrics::record_store_size(self.inner.len());
        purged
    }

    /// Fail records left in `CONFIRMING` by an interrupted process.
    pub fn fail_interrupted(&self, now: u64) -> Vec<PreparedTransaction> {
        let mut failed = Vec::new();
        for mut entry in self.inner.iter_mut() {
            if entry.state == TransactionState::Confirming {
                entry.state = TransactionState::Failed;
                entry.error = Some("interrupted before the broadcast outcome was recorded".into());
                entry.updated_at = now;
                failed.push(entry.clone());
            }
        }
        failed
    }

    /// Snapshot of all records in a state.
    pub fn in_state(&self, state: TransactionState) -> Vec<PreparedTransaction> {
        self.inner
            .iter()
            .filter(|r| r.state == state)
            .map(|r| r.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::testing::record_fixture;

    #[test]
    fn test_claim_is_exclusive() {
        let store = TransactionStore::new(None);
        store.insert(record_fixture("t1", Some("u1"), 100, 700));

        assert!(store.claim("t1", Some("u1"), 101, 3600).is_ok());
        assert_eq!(store.claim("t1", Some("u1"), 101, 3600), Err(ClaimError::AlreadyFinalizing));
        assert!(store.release_claim("t1", 102));
        assert!(store.claim("t1", Some("u1"), 103, 3600).is_ok());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let store = TransactionStore::new(None);
        store.insert(record_fixture("t1", None, 100, 700));

        let winners: usize = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| store.claim("t1", None, 101, 3600).is_ok()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap() as usize).sum()
        });
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_other_user_sees_not_found() {
        let store = TransactionStore::new(None);
        store.insert(record_fixture("t1", Some("u1"), 100, 700));
        assert_eq!(store.claim("t1", Some("u2"), 101, 3600), Err(ClaimError::NotFound));
        assert_eq!(store.claim("t1", None, 101, 3600), Err(ClaimError::NotFound));
        assert_eq!(store.claim("missing", None, 101, 3600), Err(ClaimError::NotFound));
    }

    #[test]
    fn test_claim_past_ttl_expires() {
        let store = TransactionStore::new(None);
        store.insert(record_fixture("t1", None, 100, 700));
        assert!(matches!(store.claim("t1", None, 700, 3600), Err(ClaimError::Expired(_))));
        assert_eq!(store.get("t1").unwrap().state, TransactionState::Expired);
    }

    #[test]
    fn test_finish_only_from_confirming() {
        let store = TransactionStore::new(None);
        store.insert(record_fixture("t1", None, 100, 700));
        let done = Completion {
            state: TransactionState::Sent,
            tx_hash: Some(TxHash::repeat_byte(1)),
            path: Some(BroadcastPath::Relay),
            error: None,
            attempts: Vec::new(),
        };
        assert!(store.finish("t1", done.clone(), 101).is_none());

        store.claim("t1", None, 101, 3600).unwrap();
        let record = store.finish("t1", done.clone(), 102).unwrap();
        assert_eq!(record.state, TransactionState::Sent);
        assert!(store.finish("t1", done, 103).is_none());

        // terminal within grace, then beyond it
        assert_eq!(store.claim("t1", None, 200, 3600), Err(ClaimError::AlreadyFinalizing));
        assert_eq!(store.claim("t1", None, 102 + 3600, 3600), Err(ClaimError::NotFound));
    }

    #[test]
    fn test_sweep_and_purge() {
        let store = TransactionStore::new(None);
        store.insert(record_fixture("old", None, 100, 700));
        store.insert(record_fixture("fresh", None, 600, 1200));
        store.insert(record_fixture("busy", None, 100, 700));
        store.claim("busy", None, 150, 3600).unwrap();

        let expired = store.expire_stale(800);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "old");
        assert_eq!(store.get("busy").unwrap().state, TransactionState::Confirming);

        assert_eq!(store.purge_terminal(800 + 10, 60), 0);
        assert_eq!(store.purge_terminal(800 + 60, 60), 1);
        assert!(store.get("old").is_none());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = TransactionStore::new(Some(path.clone()));
        store.insert(record_fixture("t1", Some("u1"), 100, 700));
        store.insert(record_fixture("t2", None, 100, 700));
        store.claim("t2", None, 101, 3600).unwrap();
        store.save_to_file().unwrap();

        let loaded = TransactionStore::load_from_file(&path).unwrap();
        assert_eq!(loaded.get("t1").unwrap(), store.get("t1").unwrap());

        let failed = loaded.fail_interrupted(200);
        assert_eq!(failed.len(), 1);
        assert_eq!(loaded.get("t2").unwrap().state, TransactionState::Failed);
        assert_eq!(loaded.in_state(TransactionState::Prepared).len(), 1);
    }
}
