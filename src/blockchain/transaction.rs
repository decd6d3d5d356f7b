//! Transaction assembly.
//!
//! # Responsibilities
//! - Validate addresses and amounts of a transfer request
//! - Encode token transfers as ERC-20 `transfer` calls
//! - Select the configured gas limit for the transfer kind
//!
//! Building is pure: no network access, no nonce bookkeeping.

use alloy::primitives::utils::{format_units, parse_units, ParseUnits};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use std::str::FromStr;

use crate::blockchain::types::{
    BlockchainError, BlockchainResult, TransferRequest, UnsignedDescriptor,
};
use crate::config::ChainConfig;

sol! {
    function transfer(address to, uint256 amount) external returns (bool);
}

/// A transfer request whose fields have been parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTransfer {
    pub sender: Address,
    pub recipient: Address,
    pub contract: Option<Address>,
    /// Amount in the asset's smallest unit.
    pub amount: U256,
}

/// Assembles unsigned legacy transactions for one chain.
#[derive(Debug, Clone)]
pub struct TransactionBuilder {
    chain: ChainConfig,
}

impl TransactionBuilder {
    pub fn new(chain: ChainConfig) -> Self {
        Self { chain }
    }

    /// Parse and check a request without building anything.
    pub fn validate(&self, request: &TransferRequest) -> BlockchainResult<ValidatedTransfer> {
        let sender = parse_address(&request.sender, "sender_address")?;
        let recipient = parse_address(&request.recipient, "recipient_address")?;
        if sender == recipient {
            return Err(BlockchainError::InvalidAddress(
                "cannot send to your own address".into(),
            ));
        }

        let contract = request
            .contract()
            .map(|c| parse_address(c, "smart_contract_address"))
            .transpose()?;

        let decimals = match request.contract() {
            Some(c) => self.chain.decimals_for(c),
            None => self.chain.native_decimals,
        };
        let amount = parse_amount(&request.amount, decimals)?;

        Ok(ValidatedTransfer {
            sender,
            recipient,
            contract,
            amount,
        })
    }

    /// Gas limit for the request kind: plain transfer or contract call.
    pub fn gas_limit_for(&self, request: &TransferRequest) -> u64 {
        if request.contract().is_some() {
            self.chain.gas.contract_limit
        } else {
            self.chain.gas.transfer_limit
        }
    }

    /// Build the unsigned descriptor for a request.
    pub fn build(
        &self,
        request: &TransferRequest,
        nonce: u64,
        gas_price: u128,
        gas_limit: u64,
    ) -> BlockchainResult<UnsignedDescriptor> {
        let transfer = self.validate(request)?;

        let (to, value, input) = match transfer.contract {
            Some(contract) => {
                let call = transferCall {
                    to: transfer.recipient,
                    amount: transfer.amount,
                };
                (contract, U256::ZERO, Bytes::from(call.abi_encode()))
            }
            None => (transfer.recipient, transfer.amount, Bytes::new()),
        };

        Ok(UnsignedDescriptor {
            from: transfer.sender,
            to,
            value,
            input,
            nonce: Some(nonce),
            gas_price,
            gas_limit,
            chain_id: Some(self.chain.chain_id),
        })
    }

    /// Render a wei amount in whole native units.
    pub fn format_native(&self, wei: U256) -> String {
        format_units(wei, self.chain.native_decimals).unwrap_or_else(|_| wei.to_string())
    }
}

/// Parse a `0x`-prefixed 20-byte address.
///
/// Mixed-case input must carry a valid EIP-55 checksum; the zero address is
/// never a valid party to a transfer.
pub fn parse_address(raw: &str, field: &str) -> BlockchainResult<Address> {
    let s = raw.trim();
    let body = s
        .strip_prefix("0x")
        .ok_or_else(|| BlockchainError::InvalidAddress(format!("{} must start with 0x", field)))?;
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(BlockchainError::InvalidAddress(format!(
            "{} must be 0x followed by 40 hex characters",
            field
        )));
    }

    let mixed_case = body.chars().any(|c| c.is_ascii_uppercase())
        && body.chars().any(|c| c.is_ascii_lowercase());
    let address = if mixed_case {
        Address::parse_checksummed(s, None)
            .map_err(|_| BlockchainError::InvalidAddress(format!("{} has a bad checksum", field)))?
    } else {
        Address::from_str(s).map_err(|e| BlockchainError::InvalidAddress(format!("{}: {}", field, e)))?
    };

    if address == Address::ZERO {
        return Err(BlockchainError::InvalidAddress(format!(
            "{} must not be the zero address",
            field
        )));
    }
    Ok(address)
}

/// Parse a non-negative decimal amount into base units.
pub fn parse_amount(raw: &str, decimals: u8) -> BlockchainResult<U256> {
    let s = raw.trim();
    let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
    let digits_only = |part: &str| part.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !digits_only(whole) || !digits_only(fraction) {
        return Err(BlockchainError::InvalidAmount(format!(
            "'{}' is not a non-negative decimal number",
            raw
        )));
    }
    if fraction.len() > decimals as usize {
        return Err(BlockchainError::InvalidAmount(format!(
            "'{}' has more than {} decimal places",
            raw, decimals
        )));
    }

    let whole = if whole.is_empty() { "0" } else { whole };
    let normalized = if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    };

    match parse_units(&normalized, decimals) {
        Ok(ParseUnits::U256(value)) => Ok(value),
        Ok(ParseUnits::I256(_)) => Err(BlockchainError::InvalidAmount("amount must not be negative".into())),
        Err(e) => Err(BlockchainError::InvalidAmount(format!("'{}': {}", raw, e))),
    }
}
