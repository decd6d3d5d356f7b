//! Relay path: a managed broadcast API authenticated by an API key.
//!
//! Request: `POST <url>` with `{"txData": "0x..."}` and the key in a
//! configurable header. Success answers carry a provider `txId`.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;

use crate::broadcast::classify::{TransportFailure, UpstreamReply};
use crate::broadcast::{map_reqwest_error, BroadcastPath, BroadcastTransport};
use crate::config::RelayApiConfig;

/// Submits raw transactions to a managed broadcast API.
#[derive(Clone)]
pub struct RelayApiTransport {
    http: reqwest::Client,
    url: String,
    api_key_header: String,
    api_key: Option<String>,
}

impl RelayApiTransport {
    pub fn new(config: &RelayApiConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        let api_key = config.resolve_api_key();
        if api_key.is_none() {
            tracing::warn!(url = %config.url, "No API key configured for relay broadcast API");
        }
        Ok(Self {
            http,
            url: config.url.clone(),
            api_key_header: config.api_key_header.clone(),
            api_key,
        })
    }
}

impl std::fmt::Debug for RelayApiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayApiTransport")
            .field("url", &self.url)
            .field("api_key_header", &self.api_key_header)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[async_trait]
impl BroadcastTransport for RelayApiTransport {
    fn path(&self) -> BroadcastPath {
        BroadcastPath::Relay
    }

    async fn submit(&self, raw_hex: &str) -> Result<UpstreamReply, TransportFailure> {
        let mut request = self.http.post(&self.url).json(&json!({ "txData": raw_hex }));
        if let Some(key) = &self.api_key {
            request = request.header(self.api_key_header.as_str(), key.as_str());
        }

        let response = request.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(UpstreamReply { status, body })
    }
}
