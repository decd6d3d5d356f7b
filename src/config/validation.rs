//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, gas bounds ordered)
//! - Detect duplicate chain names and aliases
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RelayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use crate::config::schema::{normalize_chain_name, PrimaryPath, RelayConfig};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &RelayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.timeouts.upstream_secs == 0 {
        errors.push(ValidationError::new("timeouts.upstream_secs", "must be > 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be >= 1"));
    }
    if config.relay.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("relay.sweep_interval_secs", "must be > 0"));
    }
    if config.relay.key_env_prefix.is_empty() {
        errors.push(ValidationError::new("relay.key_env_prefix", "must not be empty"));
    }
    if !matches!(config.observability.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new(
            "observability.log_format",
            "must be 'pretty' or 'json'",
        ));
    }

    let mut names = HashSet::new();
    for (i, chain) in config.chains.iter().enumerate() {
        let prefix = format!("chains[{}]", i);

        if chain.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{prefix}.name"), "must not be empty"));
        }
        for name in std::iter::once(&chain.name).chain(chain.aliases.iter()) {
            let normalized = normalize_chain_name(name);
            if !normalized.is_empty() && !names.insert(normalized.clone()) {
                errors.push(ValidationError::new(
                    format!("{prefix}.name"),
                    format!("'{}' is used by more than one chain", normalized),
                ));
            }
        }
        if chain.rpc_url.parse::<url::Url>().is_err() {
            errors.push(ValidationError::new(
                format!("{prefix}.rpc_url"),
                format!("'{}' is not a URL", chain.rpc_url),
            ));
        }
        if chain.gas.refresh_secs == 0 {
            errors.push(ValidationError::new(format!("{prefix}.gas.refresh_secs"), "must be > 0"));
        }
        if chain.gas.multiplier <= 0.0 {
            errors.push(ValidationError::new(format!("{prefix}.gas.multiplier"), "must be > 0"));
        }
        if chain.gas.min_gwei > chain.gas.max_gwei {
            errors.push(ValidationError::new(
                format!("{prefix}.gas.min_gwei"),
                "must not exceed max_gwei",
            ));
        }
        if chain.gas.transfer_limit < 21_000 {
            errors.push(ValidationError::new(
                format!("{prefix}.gas.transfer_limit"),
                "must be at least 21000",
            ));
        }
        if chain.gas.contract_limit < chain.gas.transfer_limit {
            errors.push(ValidationError::new(
                format!("{prefix}.gas.contract_limit"),
                "must not be below transfer_limit",
            ));
        }
        match &chain.relay {
            Some(relay) => {
                if relay.url.parse::<url::Url>().is_err() {
                    errors.push(ValidationError::new(
                        format!("{prefix}.relay.url"),
                        format!("'{}' is not a URL", relay.url),
                    ));
                }
                if relay.api_key_header.is_empty() {
                    errors.push(ValidationError::new(
                        format!("{prefix}.relay.api_key_header"),
                        "must not be empty",
                    ));
                }
            }
            None if chain.primary == PrimaryPath::Relay => {
                errors.push(ValidationError::new(
                    format!("{prefix}.primary"),
                    "primary is 'relay' but no [relay] section is configured",
                ));
            }
            None => {}
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
