//! Symbol -> ERC-20 contract lookup used to route on-chain pressure reads.

use std::collections::HashMap;

use crate::config::Settings;
use crate::signals::onchain_pressure::canonical_address;

const DEFAULT_TOKEN_CONTRACTS: &[(&str, &str)] = &[
    ("ARB", "0xB50721BCf8d664c30412Cfbc6cf7a15145234ad1"),
    ("UNI", "0x1f9840a85d5aF5bf1D1762F925BDADdC4201F984"),
    ("LDO", "0x5A98FcBEA516Cf06857215779Fd812CA3beF1B32"),
];

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    contracts: HashMap<String, String>,
}

impl TokenRegistry {
    pub fn with_defaults() -> Self {
        let mut registry = Self::default();
        for (symbol, address) in DEFAULT_TOKEN_CONTRACTS {
            registry.insert(symbol, address);
        }
        registry
    }

    /// Defaults overlaid with `TOKEN_CONTRACTS`.
    pub fn from_settings(settings: &Settings) -> Self {
        let mut registry = Self::with_defaults();
        for (symbol, address) in &settings.token_contracts {
            registry.insert(symbol, address);
        }
        registry
    }

    pub fn insert(&mut self, symbol: &str, address: &str) -> bool {
        let Some(address) = canonical_address(address) else {
            return false;
        };
        self.contracts.insert(base_asset(symbol), address);
        true
    }

    /// Contract for `ARB`, `arb` or `ARB/USDT`. Tokens not on Ethereum have none.
    pub fn contract_for(&self, symbol: &str) -> Option<&str> {
        self.contracts.get(&base_asset(symbol)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

fn base_asset(symbol: &str) -> String {
    let upper = symbol.trim().to_uppercase();
    match upper.split_once('/') {
        Some((base, _)) => base.to_string(),
        None => upper,
    }
}
