use cvm_types::{ContractInfo, CurrencyInfo, StateError, StateResult};
use serde::{Deserialize, Serialize};

/// Initial balance of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisBalance {
    pub addr: String,
    pub symbol: String,
    /// Base-10 amount
    pub amount: String,
}

/// Seed document for a [`crate::MemoryChainState`]
///
/// Contract codes are hex text including the 10-byte framing prefix, exactly
/// as [`ContractInfo`] serializes them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Genesis {
    #[serde(default)]
    pub height: u64,
    #[serde(default)]
    pub currencies: Vec<CurrencyInfo>,
    #[serde(default)]
    pub balances: Vec<GenesisBalance>,
    #[serde(default)]
    pub contracts: Vec<ContractInfo>,
}

impl Genesis {
    pub fn from_json(text: &str) -> StateResult<Self> {
        serde_json::from_str(text).map_err(|e| StateError::Storage(format!("invalid genesis: {}", e)))
    }

    pub fn to_json(&self) -> StateResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| StateError::Storage(format!("cannot serialize genesis: {}", e)))
    }
}
