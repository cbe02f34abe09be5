use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

/// Registered token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyInfo {
    pub symbol: String,
    pub decimal: i64,
    #[serde(rename = "totalSupply")]
    pub total_supply: String,
}

/// Symbol plus decimals
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Currency {
    pub symbol: String,
    pub decimal: i64,
}

/// An unsigned quantity of a currency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amount {
    pub currency: Currency,
    pub value: BigUint,
}

impl Amount {
    pub fn new(symbol: &str, decimal: i64, value: BigUint) -> Self {
        Self {
            currency: Currency {
                symbol: symbol.to_string(),
                decimal,
            },
            value,
        }
    }
}

/// Parses a base-10 unsigned amount
pub fn parse_amount(text: &str) -> StateResult<BigUint> {
    BigUint::parse_bytes(text.trim().as_bytes(), 10)
        .ok_or_else(|| StateError::InvalidAmount(text.to_string()))
}
