/*!
# Contract VM Types

Types shared between the contract execution core, its chain-state
collaborators and the tooling around them: invocation params and results,
deployed-contract metadata with its code framing, and currency amounts.
*/

pub mod contract;
pub mod currency;
pub mod error;

pub use contract::{
    code_prefix, frame_code, sort_params, ContractInfo, ContractKind, ContractPattern,
    ContractResult, ContractState, ContractValue, Param, ReturnKind, UnsupportedReturnKind,
    CODE_PREFIX_LEN, CONTRACT_ENTRY,
};
pub use currency::{parse_amount, Amount, Currency, CurrencyInfo};
pub use error::{StateError, StateResult};

/// Serde helpers for byte fields carried as hex text
pub mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        hex::decode(text.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}
