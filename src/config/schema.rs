//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the relay.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Root configuration for the transaction relay.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Retry configuration for upstream reads.
    pub retries: RetryConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Prepared-transaction lifecycle settings.
    pub relay: LifecycleConfig,

    /// Supported chains.
    pub chains: Vec<ChainConfig>,
}

impl RelayConfig {
    /// Find a chain by canonical name or alias (case-insensitive).
    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        let wanted = normalize_chain_name(name);
        self.chains.iter().find(|c| {
            normalize_chain_name(&c.name) == wanted
                || c.aliases.iter().any(|a| normalize_chain_name(a) == wanted)
        })
    }
}

/// Lower-case and trim a chain name as supplied by callers.
pub fn normalize_chain_name(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:5000").
    pub bind_address: String,

    /// Optional TLS configuration.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:5000".to_string(),
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Inbound request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for every outbound call (node RPC, relay API) in seconds.
    pub upstream_secs: u64,

    /// Graceful shutdown drain period in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 90,
            upstream_secs: 30,
            shutdown_secs: 10,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 2000,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Lifecycle of prepared transactions.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Seconds a prepared transaction may wait for confirm before it expires.
    pub ttl_secs: u64,

    /// Seconds a terminal record is retained before it is purged.
    pub grace_secs: u64,

    /// Interval of the expiry sweep in seconds.
    pub sweep_interval_secs: u64,

    /// Optional JSON snapshot file for the transaction store.
    pub store_path: Option<String>,

    /// Prefix of environment variables holding signing keys per address.
    pub key_env_prefix: String,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            grace_secs: 3600,
            sweep_interval_secs: 30,
            store_path: None,
            key_env_prefix: "RELAY_KEY".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Which broadcast path a chain tries first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PrimaryPath {
    /// Raw transaction straight to the chain node.
    Direct,
    /// Managed broadcast API.
    #[default]
    Relay,
}

/// Chain configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Canonical chain name used in paths (e.g., "polygon").
    pub name: String,

    /// Alternative names accepted from callers (e.g., "matic").
    pub aliases: Vec<String>,

    /// Chain ID for EIP-155 replay protection (e.g., 137 for Polygon).
    pub chain_id: u64,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs for reads.
    pub failover_urls: Vec<String>,

    /// Broadcast path tried first.
    pub primary: PrimaryPath,

    /// Block explorer base URL (e.g., "https://polygonscan.com").
    pub explorer_url: String,

    /// Decimals of the native asset.
    pub native_decimals: u8,

    /// Decimals assumed for token contracts without an override.
    pub default_token_decimals: u8,

    /// Per-contract decimals overrides, keyed by contract address.
    pub token_decimals: HashMap<String, u8>,

    /// Gas pricing and limits.
    pub gas: GasConfig,

    /// Managed relay broadcast API. Absent means direct path only.
    pub relay: Option<RelayApiConfig>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            aliases: Vec::new(),
            chain_id: 1,
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            primary: PrimaryPath::Relay,
            explorer_url: String::new(),
            native_decimals: 18,
            default_token_decimals: 18,
            token_decimals: HashMap::new(),
            gas: GasConfig::default(),
            relay: None,
        }
    }
}

impl ChainConfig {
    /// Decimals for a token contract, honouring overrides.
    pub fn decimals_for(&self, contract: &str) -> u8 {
        let wanted = contract.to_ascii_lowercase();
        self.token_decimals
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == wanted)
            .map(|(_, d)| *d)
            .unwrap_or(self.default_token_decimals)
    }
}

/// Gas configuration for a chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GasConfig {
    /// Gas price cache refresh interval in seconds.
    pub refresh_secs: u64,

    /// Gas price multiplier (1.0 = node estimate, 1.2 = 20% buffer).
    pub multiplier: f64,

    /// Floor gas price in gwei.
    pub min_gwei: u64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gwei: u64,

    /// Gas limit for native transfers.
    pub transfer_limit: u64,

    /// Gas limit for token contract calls.
    pub contract_limit: u64,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 15,
            multiplier: 1.0,
            min_gwei: 0,
            max_gwei: 500,
            transfer_limit: 21_000,
            contract_limit: 100_000,
        }
    }
}

/// Managed broadcast API settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelayApiConfig {
    /// Full broadcast URL (e.g., "https://api.tatum.io/v3/polygon/broadcast").
    pub url: String,

    /// Inline API key. Prefer `api_key_env`.
    pub api_key: Option<String>,

    /// Environment variable holding the API key.
    pub api_key_env: Option<String>,

    /// Header carrying the API key.
    pub api_key_header: String,
}

impl Default for RelayApiConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            api_key_env: Some("TATUM_API_KEY".to_string()),
            api_key_header: "x-api-key".to_string(),
        }
    }
}

impl RelayApiConfig {
    /// Resolve the API key, inline value first, then the environment.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        self.api_key_env
            .as_ref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_parse_from_empty_toml() {
        let config: RelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.timeouts.upstream_secs, 30);
        assert_eq!(config.relay.ttl_secs, 600);
        assert!(config.chains.is_empty());
    }

    #[test]
    fn test_chain_lookup_by_alias() {
        let config: RelayConfig = toml::from_str(
            r#"
            [[chains]]
            name = "polygon"
            aliases = ["matic"]
            chain_id = 137
            "#,
        )
        .unwrap();

        assert_eq!(config.chain(" MATIC ").unwrap().chain_id, 137);
        assert_eq!(config.chain("Polygon").unwrap().name, "polygon");
        assert!(config.chain("tron").is_none());
        assert_eq!(config.chains[0].gas.transfer_limit, 21_000);
        assert_eq!(config.chains[0].primary, PrimaryPath::Relay);
    }

    #[test]
    fn test_token_decimals_override() {
        let mut chain = ChainConfig::default();
        chain
            .token_decimals
            .insert("0xc2132D05D31c914a87C6611C10748AEb04B58e8F".into(), 6);
        assert_eq!(chain.decimals_for("0xc2132d05d31c914a87c6611c10748aeb04b58e8f"), 6);
        assert_eq!(chain.decimals_for("0x0000000000000000000000000000000000000001"), 18);
    }

    #[test]
    fn test_inline_api_key_wins() {
        let relay = RelayApiConfig {
            api_key: Some("inline".into()),
            api_key_env: Some("TX_RELAY_TEST_UNSET_VAR".into()),
            ..RelayApiConfig::default()
        };
        assert_eq!(relay.resolve_api_key().as_deref(), Some("inline"));

        let relay = RelayApiConfig {
            api_key: None,
            api_key_env: Some("TX_RELAY_TEST_UNSET_VAR".into()),
            ..RelayApiConfig::default()
        };
        assert!(relay.resolve_api_key().is_none());
    }
}
