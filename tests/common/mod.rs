//! Shared mock upstreams and server bootstrap for integration tests.
#![allow(dead_code)]

use alloy::primitives::keccak256;
use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use tx_relay::config::{ChainConfig, PrimaryPath, RelayApiConfig, RelayConfig};
use tx_relay::lifecycle::{build_service, Shutdown};
use tx_relay::HttpServer;

/// Anvil account #0.
pub const SENDER: &str = "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266";
pub const SENDER_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const RECIPIENT: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const API_KEY: &str = "test-api-key";

/// Hash a `0x` raw transaction the way a node would.
pub fn tx_hash_of(raw_hex: &str) -> String {
    let bytes = alloy::hex::decode(raw_hex).unwrap();
    keccak256(bytes).to_string()
}

async fn serve(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

/// Scripted answer to one `eth_sendRawTransaction`.
#[derive(Debug, Clone)]
pub enum SendReply {
    /// JSON-RPC error object with this message.
    Error(String),
    /// Bare HTTP status with a text body.
    Status(u16),
}

#[derive(Default)]
struct NodeState {
    chain_id: u64,
    nonce: AtomicU64,
    gas_price: AtomicU64,
    sends: Mutex<VecDeque<SendReply>>,
    submitted: Mutex<Vec<String>>,
}

/// A JSON-RPC chain node.
pub struct MockNode {
    pub addr: SocketAddr,
    state: Arc<NodeState>,
}

impl MockNode {
    pub async fn start(chain_id: u64) -> Self {
        let state = Arc::new(NodeState {
            chain_id,
            gas_price: AtomicU64::new(30_000_000_000),
            ..NodeState::default()
        });
        let router = Router::new().route("/", post(node_rpc)).with_state(state.clone());
        let addr = serve(router).await;
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_nonce(&self, nonce: u64) {
        self.state.nonce.store(nonce, Ordering::SeqCst);
    }

    pub fn push_send(&self, reply: SendReply) {
        self.state.sends.lock().unwrap().push_back(reply);
    }

    /// Raw payloads the node accepted.
    pub fn submitted(&self) -> Vec<String> {
        self.state.submitted.lock().unwrap().clone()
    }
}

async fn node_rpc(State(state): State<Arc<NodeState>>, Json(request): Json<Value>) -> (StatusCode, Json<Value>) {
    let id = request.get("id").cloned().unwrap_or(json!(1));
    let result = |value: Value| (StatusCode::OK, Json(json!({"jsonrpc": "2.0", "id": id, "result": value})));

    match request["method"].as_str().unwrap_or_default() {
        "eth_chainId" => result(json!(format!("0x{:x}", state.chain_id))),
        "eth_getTransactionCount" => result(json!(format!("0x{:x}", state.nonce.load(Ordering::SeqCst)))),
        "eth_gasPrice" => result(json!(format!("0x{:x}", state.gas_price.load(Ordering::SeqCst)))),
        "eth_getTransactionByHash" => result(Value::Null),
        "eth_sendRawTransaction" => {
            let raw = request["params"][0].as_str().unwrap_or_default().to_string();
            let scripted = state.sends.lock().unwrap().pop_front();
            match scripted {
                Some(SendReply::Error(message)) => (
                    StatusCode::OK,
                    Json(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32000, "message": message},
                    })),
                ),
                Some(SendReply::Status(status)) => (
                    StatusCode::from_u16(status).unwrap(),
                    Json(json!({"message": "upstream unavailable"})),
                ),
                None => {
                    let hash = tx_hash_of(&raw);
                    state.submitted.lock().unwrap().push(raw);
                    state.nonce.fetch_add(1, Ordering::SeqCst);
                    result(json!(hash))
                }
            }
        }
        other => (
            StatusCode::OK,
            Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("method {} not found", other)},
            })),
        ),
    }
}

/// Scripted answer of the managed broadcast API.
#[derive(Debug, Clone)]
pub enum RelayReply {
    /// 200 with `{"txId": <hash>}`.
    Accept,
    /// Status and body; `{hash}` in the body is replaced by the payload hash.
    Respond(u16, String),
    /// Sleep before accepting.
    Hang(Duration),
}

#[derive(Default)]
struct RelayState {
    replies: Mutex<VecDeque<RelayReply>>,
    received: Mutex<Vec<String>>,
    api_keys: Mutex<Vec<String>>,
}

/// A managed broadcast API.
pub struct MockRelayApi {
    pub addr: SocketAddr,
    state: Arc<RelayState>,
}

impl MockRelayApi {
    pub async fn start() -> Self {
        let state = Arc::new(RelayState::default());
        let router = Router::new()
            .route("/v3/polygon/broadcast", post(relay_broadcast))
            .with_state(state.clone());
        let addr = serve(router).await;
        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}/v3/polygon/broadcast", self.addr)
    }

    pub fn push(&self, reply: RelayReply) {
        self.state.replies.lock().unwrap().push_back(reply);
    }

    pub fn received(&self) -> Vec<String> {
        self.state.received.lock().unwrap().clone()
    }

    pub fn api_keys(&self) -> Vec<String> {
        self.state.api_keys.lock().unwrap().clone()
    }
}

async fn relay_broadcast(
    State(state): State<Arc<RelayState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    let raw = body["txData"].as_str().unwrap_or_default().to_string();
    let hash = tx_hash_of(&raw);
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        state.api_keys.lock().unwrap().push(key.to_string());
    }
    state.received.lock().unwrap().push(raw);

    let reply = state.replies.lock().unwrap().pop_front().unwrap_or(RelayReply::Accept);
    match reply {
        RelayReply::Accept => (StatusCode::OK, json!({"txId": hash}).to_string()),
        RelayReply::Respond(status, template) => {
            (StatusCode::from_u16(status).unwrap(), template.replace("{hash}", &hash))
        }
        RelayReply::Hang(delay) => {
            tokio::time::sleep(delay).await;
            (StatusCode::OK, json!({"txId": hash}).to_string())
        }
    }
}

/// Polygon-like chain pointing at the mocks.
pub fn chain_config(node: &MockNode, relay: Option<&MockRelayApi>) -> ChainConfig {
    ChainConfig {
        name: "polygon".into(),
        aliases: vec!["matic".into()],
        chain_id: 137,
        rpc_url: node.url(),
        primary: if relay.is_some() { PrimaryPath::Relay } else { PrimaryPath::Direct },
        explorer_url: "https://polygonscan.com".into(),
        relay: relay.map(|r| RelayApiConfig {
            url: r.url(),
            api_key: Some(API_KEY.into()),
            api_key_env: None,
            ..RelayApiConfig::default()
        }),
        ..ChainConfig::default()
    }
}

pub fn relay_config(chain: ChainConfig) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.timeouts.upstream_secs = 1;
    config.retries.base_delay_ms = 10;
    config.retries.max_delay_ms = 20;
    config.chains.push(chain);
    config
}

/// A running relay bound to an ephemeral port.
pub struct TestRelay {
    pub addr: SocketAddr,
    pub client: reqwest::Client,
    shutdown: Shutdown,
}

impl TestRelay {
    pub async fn start(config: RelayConfig) -> Self {
        let service = build_service(&config).await.unwrap();
        let shutdown = Shutdown::new();
        let server = HttpServer::new(config, service);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, rx).await;
        });

        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        Self { addr, client, shutdown }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    pub async fn get(&self, path: &str, user: Option<&str>) -> (u16, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(user) = user {
            request = request.header("UserID", user);
        }
        let response = request.send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    /// Prepare a 0.001 native transfer and return its id.
    pub async fn prepare(&self, user: &str) -> String {
        let (status, body) = self
            .post(
                "/send/polygon/prepare",
                json!({
                    "UserID": user,
                    "sender_address": SENDER,
                    "recipient_address": RECIPIENT,
                    "amount": "0.001",
                }),
            )
            .await;
        assert_eq!(status, 200, "prepare failed: {}", body);
        body["transaction_id"].as_str().unwrap().to_string()
    }

    pub async fn confirm(&self, user: &str, id: &str) -> (u16, Value) {
        self.post(
            "/send/polygon/confirm",
            json!({"UserID": user, "transaction_id": id, "private_key": SENDER_KEY}),
        )
        .await
    }
}

impl Drop for TestRelay {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}
