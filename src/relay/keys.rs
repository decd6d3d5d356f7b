//! Signing key resolution.
//!
//! # Security
//! - Providers hand out a [`Credential`] per call and keep no copy
//! - Lookup failures never echo key material

use alloy::primitives::Address;
use async_trait::async_trait;
use thiserror::Error;

pub use crate::blockchain::Credential;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("no signing key available for {0}")]
    NotFound(Address),

    #[error("key backend error: {0}")]
    Backend(String),
}

/// Resolves the signing credential controlling an address on a chain.
#[async_trait]
pub trait KeyProvider: Send + Sync {
    async fn resolve(&self, address: Address, chain: &str) -> Result<Credential, KeyError>;
}

/// Reads keys from the environment.
///
/// Looks up `<PREFIX>_<CHAIN>_<ADDRESS>` first, then `<PREFIX>_<ADDRESS>`,
/// where the address is upper-case hex without `0x`.
#[derive(Debug, Clone)]
pub struct EnvKeyProvider {
    prefix: String,
}

impl EnvKeyProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn candidates(&self, address: Address, chain: &str) -> [String; 2] {
        let addr = alloy::hex::encode(address.as_slice()).to_ascii_uppercase();
        let chain = chain.to_ascii_uppercase().replace('-', "_");
        [
            format!("{}_{}_{}", self.prefix, chain, addr),
            format!("{}_{}", self.prefix, addr),
        ]
    }
}

#[async_trait]
impl KeyProvider for EnvKeyProvider {
    async fn resolve(&self, address: Address, chain: &str) -> Result<Credential, KeyError> {
        self.candidates(address, chain)
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
            .map(Credential::new)
            .ok_or(KeyError::NotFound(address))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_variable_names() {
        let provider = EnvKeyProvider::new("RELAY_KEY");
        let address = Address::from_str("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266").unwrap();
        let [chain_specific, generic] = provider.candidates(address, "polygon");
        assert_eq!(chain_specific, "RELAY_KEY_POLYGON_F39FD6E51AAD88F6F4CE6AB8827279CFFFB92266");
        assert_eq!(generic, "RELAY_KEY_F39FD6E51AAD88F6F4CE6AB8827279CFFFB92266");
    }

    #[tokio::test]
    async fn test_missing_key() {
        let provider = EnvKeyProvider::new("TX_RELAY_TEST_NO_SUCH_PREFIX");
        let err = provider.resolve(Address::repeat_byte(0x11), "polygon").await.unwrap_err();
        assert!(matches!(err, KeyError::NotFound(_)));
    }
}
