//! In-crate test doubles.

use alloy::primitives::{keccak256, Address, TxHash};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::blockchain::{
    BlockchainError, BlockchainResult, ChainRpc, Credential, PayloadSigner, SignedPayload, TransferRequest,
    UnsignedDescriptor,
};
use crate::broadcast::{BroadcastPath, BroadcastTransport, TransportFailure, UpstreamReply};
use crate::relay::keys::{KeyError, KeyProvider};
use crate::relay::types::{PreparedTransaction, TransactionState};

/// Anvil account #0.
pub const TEST_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const TEST_ADDRESS: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const TEST_RECIPIENT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";

/// Programmable chain node.
pub struct MockRpc {
    nonce: AtomicU64,
    gas_price: Mutex<u128>,
    nonce_failures: AtomicU32,
    gas_failures: AtomicU32,
    probe_fails: AtomicBool,
    nonce_calls: AtomicU32,
    gas_calls: AtomicU32,
    probe_calls: AtomicU32,
    known: Mutex<HashSet<TxHash>>,
}

impl MockRpc {
    pub fn new(nonce: u64) -> Self {
        Self {
            nonce: AtomicU64::new(nonce),
            gas_price: Mutex::new(30_000_000_000),
            nonce_failures: AtomicU32::new(0),
            gas_failures: AtomicU32::new(0),
            probe_fails: AtomicBool::new(false),
            nonce_calls: AtomicU32::new(0),
            gas_calls: AtomicU32::new(0),
            probe_calls: AtomicU32::new(0),
            known: Mutex::new(HashSet::new()),
        }
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn set_gas_price(&self, wei: u128) {
        *self.gas_price.lock().unwrap() = wei;
    }

    /// Fail the next `n` nonce reads with a transient error.
    pub fn fail_nonce_reads(&self, n: u32) {
        self.nonce_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` gas price reads with a transient error.
    pub fn fail_gas_reads(&self, n: u32) {
        self.gas_failures.store(n, Ordering::SeqCst);
    }

    /// Make every transaction lookup fail.
    pub fn fail_probes(&self) {
        self.probe_fails.store(true, Ordering::SeqCst);
    }

    pub fn mark_known(&self, hash: TxHash) {
        self.known.lock().unwrap().insert(hash);
    }

    pub fn nonce_calls(&self) -> u32 {
        self.nonce_calls.load(Ordering::SeqCst)
    }

    pub fn gas_price_calls(&self) -> u32 {
        self.gas_calls.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> u32 {
        self.probe_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainRpc for MockRpc {
    async fn transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
        self.nonce_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .nonce_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlockchainError::Rpc("connection refused".into()));
        }
        // yield so concurrent callers interleave
        tokio::task::yield_now().await;
        Ok(self.nonce.load(Ordering::SeqCst))
    }

    async fn gas_price(&self) -> BlockchainResult<u128> {
        self.gas_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .gas_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BlockchainError::Rpc("connection refused".into()));
        }
        Ok(*self.gas_price.lock().unwrap())
    }

    async fn transaction_known(&self, hash: TxHash) -> BlockchainResult<bool> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        if self.probe_fails.load(Ordering::SeqCst) {
            return Err(BlockchainError::Rpc("header not found".into()));
        }
        Ok(self.known.lock().unwrap().contains(&hash))
    }
}

/// Broadcast path that replays queued answers.
///
/// With an empty queue an accepting transport answers like a healthy
/// upstream; otherwise it fails at the transport level.
pub struct ScriptedTransport {
    path: BroadcastPath,
    accept_when_empty: bool,
    script: Mutex<VecDeque<Result<UpstreamReply, TransportFailure>>>,
    submitted: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedTransport {
    pub fn new(path: BroadcastPath) -> Self {
        Self {
            path,
            accept_when_empty: false,
            script: Mutex::new(VecDeque::new()),
            submitted: Mutex::new(Vec::new()),
            delay: Mutex::new(None),
        }
    }

    pub fn accepting(path: BroadcastPath) -> Self {
        Self {
            accept_when_empty: true,
            ..Self::new(path)
        }
    }

    pub fn push(&self, reply: Result<UpstreamReply, TransportFailure>) {
        self.script.lock().unwrap().push_back(reply);
    }

    pub fn push_reply(&self, status: u16, body: &str) {
        self.push(Ok(UpstreamReply {
            status,
            body: body.to_string(),
        }));
    }

    /// Hold every answer back for `delay`.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.submitted.lock().unwrap().len()
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl BroadcastTransport for ScriptedTransport {
    fn path(&self) -> BroadcastPath {
        self.path
    }

    async fn submit(&self, raw_hex: &str) -> Result<UpstreamReply, TransportFailure> {
        self.submitted.lock().unwrap().push(raw_hex.to_string());
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(reply) = self.script.lock().unwrap().pop_front() {
            return reply;
        }
        if !self.accept_when_empty {
            return Err(TransportFailure::Connect("no scripted reply".into()));
        }
        let hash = alloy::hex::decode(raw_hex)
            .map(keccak256)
            .map_err(|e| TransportFailure::Other(e.to_string()))?;
        let body = match self.path {
            BroadcastPath::Direct => format!(r#"{{"jsonrpc":"2.0","id":1,"result":"{}"}}"#, hash),
            BroadcastPath::Relay => format!(r#"{{"txId":"{}"}}"#, hash),
        };
        Ok(UpstreamReply { status: 200, body })
    }
}

/// Key provider backed by a fixed map.
#[derive(Default)]
pub struct StaticKeyProvider {
    keys: HashMap<Address, String>,
}

impl StaticKeyProvider {
    pub fn with_key(address: &str, key: &str) -> Self {
        let mut keys = HashMap::new();
        keys.insert(Address::from_str(address).unwrap(), key.to_string());
        Self { keys }
    }
}

#[async_trait]
impl KeyProvider for StaticKeyProvider {
    async fn resolve(&self, address: Address, _chain: &str) -> Result<Credential, KeyError> {
        self.keys
            .get(&address)
            .map(|k| Credential::new(k.clone()))
            .ok_or(KeyError::NotFound(address))
    }
}

pub fn descriptor_fixture() -> UnsignedDescriptor {
    UnsignedDescriptor {
        from: Address::from_str(TEST_ADDRESS).unwrap(),
        to: Address::from_str(TEST_RECIPIENT).unwrap(),
        value: alloy::primitives::U256::from(1_000_000_000_000_000u64),
        input: Default::default(),
        nonce: Some(0),
        gas_price: 30_000_000_000,
        gas_limit: 21_000,
        chain_id: Some(137),
    }
}

pub async fn signed_fixture() -> SignedPayload {
    PayloadSigner
        .sign(&descriptor_fixture(), &Credential::new(TEST_KEY))
        .await
        .unwrap()
}

pub fn record_fixture(id: &str, user_id: Option<&str>, created_at: u64, expires_at: u64) -> PreparedTransaction {
    PreparedTransaction {
        id: id.to_string(),
        user_id: user_id.map(String::from),
        request: TransferRequest {
            chain: "polygon".into(),
            sender: TEST_ADDRESS.into(),
            recipient: TEST_RECIPIENT.into(),
            amount: "0.001".into(),
            contract_address: None,
        },
        descriptor: descriptor_fixture(),
        state: TransactionState::Prepared,
        created_at,
        updated_at: created_at,
        expires_at,
        tx_hash: None,
        broadcast_path: None,
        error: None,
        attempts: Vec::new(),
    }
}
