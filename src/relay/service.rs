//! Two-phase relay orchestration.
//!
//! prepare: validate → gas snapshot → reserve nonce → build → store PREPARED
//! confirm: claim (CAS) → resolve credential → sign → broadcast → SENT | FAILED

use std::sync::Arc;
use std::time::Duration;

use crate::blockchain::{Credential, PayloadSigner, SignedPayload, TransferRequest, UnsignedDescriptor};
use crate::broadcast::{BroadcastFailure, BroadcastOutcome, RejectionKind};
use crate::config::LifecycleConfig;
use crate::observability::metrics;
use crate::relay::chains::{ChainHandle, ChainRegistry};
use crate::relay::error::{RelayError, RelayResult};
use crate::relay::keys::KeyProvider;
use crate::relay::nonce::NonceAllocator;
use crate::relay::store::{ClaimError, Completion, TransactionStore};
use crate::relay::types::{
    explorer_tx_url, unix_now, ConfirmReceipt, PrepareReceipt, PreparedTransaction, TransactionState,
};

/// A confirm request.
#[derive(Debug, Clone, Default)]
pub struct ConfirmRequest {
    pub transaction_id: String,
    pub user_id: Option<String>,
    /// Caller-supplied key. Resolved through the key provider when absent.
    pub credential: Option<Credential>,
    /// Chain named by the caller, checked against the prepared record.
    pub chain: Option<String>,
}

/// The relay core behind the HTTP surface.
pub struct RelayService {
    chains: ChainRegistry,
    nonces: NonceAllocator,
    store: TransactionStore,
    keys: Arc<dyn KeyProvider>,
    signer: PayloadSigner,
    lifecycle: LifecycleConfig,
}

impl RelayService {
    pub fn new(
        chains: ChainRegistry,
        nonces: NonceAllocator,
        store: TransactionStore,
        keys: Arc<dyn KeyProvider>,
        lifecycle: LifecycleConfig,
    ) -> Self {
        Self {
            chains,
            nonces,
            store,
            keys,
            signer: PayloadSigner,
            lifecycle,
        }
    }

    pub fn chains(&self) -> &ChainRegistry {
        &self.chains
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    /// Reserve a nonce and gas snapshot for a transfer and record it.
    pub async fn prepare(
        &self,
        mut request: TransferRequest,
        user_id: Option<String>,
    ) -> RelayResult<PrepareReceipt> {
        let chain = self.chains.resolve(&request.chain)?;
        request.chain = chain.config.name.clone();

        let result = self.prepare_on(&chain, request, user_id).await;
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_prepare(&chain.config.name, outcome);
        result
    }

    async fn prepare_on(
        &self,
        chain: &ChainHandle,
        request: TransferRequest,
        user_id: Option<String>,
    ) -> RelayResult<PrepareReceipt> {
        let transfer = chain.builder.validate(&request)?;
        let gas_price = chain.gas.current().await?;
        let gas_limit = chain.builder.gas_limit_for(&request);

        let nonce = self
            .nonces
            .allocate(transfer.sender, &chain.config.name, chain.rpc.as_ref())
            .await?;
        let descriptor = match chain.builder.build(&request, nonce, gas_price, gas_limit) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                self.nonces.release(transfer.sender, &chain.config.name, nonce).await;
                return Err(e.into());
            }
        };

        let now = unix_now();
        let record = PreparedTransaction {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            request,
            descriptor,
            state: TransactionState::Prepared,
            created_at: now,
            updated_at: now,
            expires_at: now.saturating_add(self.lifecycle.ttl_secs),
            tx_hash: None,
            broadcast_path: None,
            error: None,
            attempts: Vec::new(),
        };
        self.store.insert(record.clone());

        tracing::info!(
            tx_id = %record.id,
            chain = %chain.config.name,
            sender = %transfer.sender,
            nonce,
            gas_price,
            gas_limit,
            "Transaction prepared"
        );

        Ok(PrepareReceipt {
            estimated_fee: chain.builder.format_native(record.descriptor.max_fee()),
            explorer_url: chain.config.explorer_url.clone(),
            record,
        })
    }

    /// Sign and broadcast a prepared transaction.
    ///
    /// The claim-to-completion section runs on its own task, so a dropped
    /// caller (request timeout, client disconnect) never strands a claimed
    /// record.
    pub async fn confirm(self: &Arc<Self>, request: ConfirmRequest) -> RelayResult<ConfirmReceipt> {
        let id = request.transaction_id.trim().to_string();
        if id.is_empty() {
            return Err(RelayError::InvalidRequest("transaction_id is required".into()));
        }
        let existing = self.store.get(&id).ok_or_else(|| RelayError::NotFound(id.clone()))?;
        let chain = self.chains.resolve(&existing.request.chain)?;
        if let Some(named) = request.chain.as_deref().filter(|c| !c.trim().is_empty()) {
            let named = self.chains.resolve(named)?;
            if named.config.name != chain.config.name {
                return Err(RelayError::InvalidRequest(format!(
                    "transaction {} was prepared for {}",
                    id, chain.config.name
                )));
            }
        }

        let service = Arc::clone(self);
        let task_chain = Arc::clone(&chain);
        let task_id = id.clone();
        let task = tokio::spawn(async move { service.confirm_on(&task_chain, &task_id, request).await });
        let result = match task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(tx_id = %id, chain = %chain.config.name, error = %e, "Confirm task aborted");
                self.abandon(&chain, &id).await;
                Err(RelayError::AmbiguousBroadcastFailure(format!("confirm aborted: {}", e)))
            }
        };
        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_confirm(&chain.config.name, outcome);
        result
    }

    async fn confirm_on(
        &self,
        chain: &ChainHandle,
        id: &str,
        request: ConfirmRequest,
    ) -> RelayResult<ConfirmReceipt> {
        let chain_name = chain.config.name.as_str();
        let record = match self.store.claim(
            id,
            request.user_id.as_deref(),
            unix_now(),
            self.lifecycle.grace_secs,
        ) {
            Ok(record) => record,
            Err(ClaimError::NotFound) => return Err(RelayError::NotFound(id.to_string())),
            Err(ClaimError::AlreadyFinalizing) => return Err(RelayError::AlreadyFinalizing(id.to_string())),
            Err(ClaimError::Expired(before)) => {
                if before.state == TransactionState::Prepared {
                    self.nonces
                        .release(before.descriptor.from, chain_name, before.nonce())
                        .await;
                    metrics::record_expired(chain_name, 1);
                    tracing::info!(tx_id = %id, chain = chain_name, "Transaction expired at confirm");
                }
                return Err(RelayError::Expired(id.to_string()));
            }
        };

        let sender = record.descriptor.from;
        let credential = match request.credential {
            Some(credential) => credential,
            None => match self.keys.resolve(sender, chain_name).await {
                Ok(credential) => credential,
                Err(e) => {
                    self.store.release_claim(id, unix_now());
                    return Err(e.into());
                }
            },
        };

        let mut descriptor = record.descriptor.clone();
        let mut payload = match self.sign(&descriptor, &credential).await {
            Ok(payload) => payload,
            Err(e) => {
                self.store.release_claim(id, unix_now());
                tracing::warn!(tx_id = %id, chain = chain_name, error = %e, "Signing failed");
                return Err(e);
            }
        };

        let mut attempts: Vec<BroadcastOutcome> = Vec::new();
        let mut nonce_retried = false;
        loop {
            let nonce = descriptor.nonce.unwrap_or_default();
            let report = chain.router.broadcast(&payload).await;
            attempts.extend(report.outcomes);

            match report.result {
                Ok(success) => {
                    self.nonces.mark_broadcast(sender, chain_name, nonce).await;
                    self.finish(id, Completion {
                        state: TransactionState::Sent,
                        tx_hash: Some(success.hash),
                        path: Some(success.path),
                        error: None,
                        attempts,
                    });
                    tracing::info!(
                        tx_id = %id,
                        chain = chain_name,
                        tx_hash = %success.hash,
                        path = %success.path,
                        disguised = success.disguised,
                        probed = success.probed,
                        nonce,
                        "Transaction sent"
                    );
                    return Ok(ConfirmReceipt {
                        id: id.to_string(),
                        tx_hash: success.hash,
                        state: TransactionState::Sent,
                        path: success.path,
                        disguised: success.disguised,
                        explorer_url: explorer_tx_url(&chain.config.explorer_url, &success.hash),
                    });
                }
                Err(BroadcastFailure::Rejected(rejection))
                    if !nonce_retried
                        && matches!(rejection.kind, RejectionKind::NonceConflict | RejectionKind::NonceGap) =>
                {
                    nonce_retried = true;
                    let stale = rejection.kind == RejectionKind::NonceConflict;
                    tracing::warn!(
                        tx_id = %id,
                        chain = chain_name,
                        nonce,
                        reason = %rejection.message,
                        "Nonce rejected, re-reading once"
                    );
                    let fresh = match self
                        .nonces
                        .reallocate(sender, chain_name, nonce, stale, chain.rpc.as_ref())
                        .await
                    {
                        Ok(fresh) => fresh,
                        Err(_) => {
                            self.finish(id, failed(&rejection.message, attempts));
                            return Err(RelayError::NonceConflict(rejection.message));
                        }
                    };
                    descriptor.nonce = Some(fresh);
                    self.store.update_descriptor(id, descriptor.clone(), unix_now());
                    payload = match self.sign(&descriptor, &credential).await {
                        Ok(payload) => payload,
                        Err(e) => {
                            self.nonces.release(sender, chain_name, fresh).await;
                            self.finish(id, failed(&e.to_string(), attempts));
                            return Err(e);
                        }
                    };
                }
                Err(BroadcastFailure::Rejected(rejection)) => {
                    self.nonces.release(sender, chain_name, nonce).await;
                    self.finish(id, failed(&rejection.message, attempts));
                    tracing::warn!(
                        tx_id = %id,
                        chain = chain_name,
                        kind = ?rejection.kind,
                        reason = %rejection.message,
                        "Broadcast rejected"
                    );
                    return Err(rejection.into());
                }
                Err(BroadcastFailure::Ambiguous(reason)) => {
                    // The payload may still land; never hand its nonce out again
                    self.nonces.mark_broadcast(sender, chain_name, nonce).await;
                    self.finish(id, failed(&reason, attempts));
                    tracing::error!(tx_id = %id, chain = chain_name, reason = %reason, "Broadcast outcome unknown");
                    return Err(RelayError::AmbiguousBroadcastFailure(reason));
                }
            }
        }
    }

    async fn sign(&self, descriptor: &UnsignedDescriptor, credential: &Credential) -> RelayResult<SignedPayload> {
        let payload = self.signer.sign(descriptor, credential).await?;
        payload.validate()?;
        if payload.signer != descriptor.from {
            return Err(RelayError::SigningError("payload signer does not match sender".into()));
        }
        Ok(payload)
    }

    /// Settle a record whose confirm task died while holding the claim.
    /// It may already have been broadcast, so its nonce is never reissued.
    async fn abandon(&self, chain: &ChainHandle, id: &str) {
        let Some(record) = self.store.get(id) else {
            return;
        };
        if record.state != TransactionState::Confirming {
            return;
        }
        self.nonces
            .mark_broadcast(record.descriptor.from, &chain.config.name, record.nonce())
            .await;
        self.finish(id, failed("confirm aborted", record.attempts));
    }

    fn finish(&self, id: &str, completion: Completion) {
        if self.store.finish(id, completion, unix_now()).is_none() {
            tracing::error!(tx_id = %id, "Claimed record vanished before completion");
        }
    }

    /// Look up a record. Records bound to a user are visible to that user only.
    pub fn get(&self, id: &str, user_id: Option<&str>) -> RelayResult<PreparedTransaction> {
        let record = self
            .store
            .get(id)
            .ok_or_else(|| RelayError::NotFound(id.to_string()))?;
        match &record.user_id {
            Some(owner) if user_id != Some(owner.as_str()) => Err(RelayError::NotFound(id.to_string())),
            _ => Ok(record),
        }
    }

    /// Expire stale records, release their nonces and purge old terminal ones.
    pub async fn expire_sweep(&self, now: u64) -> usize {
        let expired = self.store.expire_stale(now);
        for record in &expired {
            self.nonces
                .release(record.descriptor.from, &record.request.chain, record.nonce())
                .await;
            metrics::record_expired(&record.request.chain, 1);
            tracing::info!(tx_id = %record.id, chain = %record.request.chain, nonce = record.nonce(), "Transaction expired");
        }

        let purged = self.store.purge_terminal(now, self.lifecycle.grace_secs);
        if purged > 0 {
            tracing::debug!(purged, "Purged terminal records");
        }
        let pruned = self.nonces.prune_idle(Duration::from_secs(self.lifecycle.grace_secs));
        if pruned > 0 {
            tracing::debug!(pruned, "Dropped idle nonce accounts");
        }
        expired.len()
    }

    /// Re-reserve nonces of reloaded records and fail interrupted confirms.
    pub async fn restore(&self) {
        let now = unix_now();
        for record in self.store.fail_interrupted(now) {
            // may have been sent before the restart
            self.nonces
                .mark_broadcast(record.descriptor.from, &record.request.chain, record.nonce())
                .await;
            tracing::warn!(tx_id = %record.id, "Interrupted confirm marked failed");
        }
        for record in self.store.in_state(TransactionState::Prepared) {
            self.nonces
                .reserve_existing(record.descriptor.from, &record.request.chain, record.nonce())
                .await;
        }
    }

    /// Persist the store snapshot, if persistence is configured.
    pub fn persist(&self) -> RelayResult<()> {
        self.store.save_to_file()?;
        Ok(())
    }
}

fn failed(reason: &str, attempts: Vec<BroadcastOutcome>) -> Completion {
    Completion {
        state: TransactionState::Failed,
        tx_hash: None,
        path: None,
        error: Some(reason.to_string()),
        attempts,
    }
}
