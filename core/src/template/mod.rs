mod encoder;
mod placeholder;
mod resolver;
mod validator;

pub use encoder::{encode_call, parse_interface};
pub use placeholder::{Placeholder, PlaceholderSpan, find_placeholders, whole_placeholder};
pub use resolver::{ResolveOptions, resolve_template, resolve_value};
pub use validator::{required_tokens, validate_template};

use std::collections::HashMap;

use alloy::primitives::{Address, Bytes, U256};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Manager-supplied instruction. One template fans out to many wallets;
/// `args`, `value` and raw `data` may contain placeholders at any depth,
/// `contract_address` never does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum Template {
    #[serde(rename_all = "camelCase")]
    Abi {
        contract_address: String,
        /// Either a JSON ABI document or an array of human-readable
        /// signature strings.
        interface: Value,
        function_name: String,
        args: Vec<Value>,
        #[serde(default)]
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    Raw {
        contract_address: String,
        data: String,
        #[serde(default)]
        value: Value,
    },
}

impl Template {
    pub fn contract_address(&self) -> &str {
        match self {
            Template::Abi { contract_address, .. } | Template::Raw { contract_address, .. } => contract_address,
        }
    }
}

/// Live per-wallet state a resolution runs against. Built immediately before
/// resolving one wallet, discarded after encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletContext {
    pub wallet_address: Address,
    pub native_balance: U256,
    pub token_balances: HashMap<Address, U256>,
    pub block_timestamp: u64,
}

/// Fully concrete call, ready to wrap into a wallet operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedCall {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
}
