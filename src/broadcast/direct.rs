//! Direct path: `eth_sendRawTransaction` against the chain node.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::broadcast::classify::{TransportFailure, UpstreamReply};
use crate::broadcast::{map_reqwest_error, BroadcastPath, BroadcastTransport};

/// Submits raw transactions to a JSON-RPC node.
#[derive(Debug, Clone)]
pub struct DirectRpcTransport {
    http: reqwest::Client,
    rpc_url: String,
}

impl DirectRpcTransport {
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            rpc_url: rpc_url.into(),
        })
    }
}

#[async_trait]
impl BroadcastTransport for DirectRpcTransport {
    fn path(&self) -> BroadcastPath {
        BroadcastPath::Direct
    }

    async fn submit(&self, raw_hex: &str) -> Result<UpstreamReply, TransportFailure> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "eth_sendRawTransaction",
            "params": [raw_hex],
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(UpstreamReply { status, body })
    }
}
