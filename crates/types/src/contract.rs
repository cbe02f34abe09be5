use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the framing prefix stored in front of every contract's wasm code
pub const CODE_PREFIX_LEN: usize = 10;

/// Name of the single export used by pattern-2 contracts
pub const CONTRACT_ENTRY: &str = "ContractEntry";

/// A single argument of a contract invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    /// Position of the argument in the callee's parameter list
    pub index: i32,

    /// Argument name, used for event tags
    #[serde(default)]
    pub name: String,

    /// One of `string`, `int32`, `int64`
    #[serde(rename = "paramType")]
    pub param_type: String,

    /// Raw JSON value
    pub value: serde_json::Value,
}

impl Param {
    pub fn string(index: i32, name: &str, value: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
            param_type: "string".to_string(),
            value: serde_json::Value::String(value.to_string()),
        }
    }

    pub fn int32(index: i32, name: &str, value: i32) -> Self {
        Self {
            index,
            name: name.to_string(),
            param_type: "int32".to_string(),
            value: serde_json::Value::from(value),
        }
    }

    pub fn int64(index: i32, name: &str, value: i64) -> Self {
        Self {
            index,
            name: name.to_string(),
            param_type: "int64".to_string(),
            value: serde_json::Value::from(value),
        }
    }

    /// Renders the value the way event tags carry it: strings verbatim,
    /// anything else as JSON text
    pub fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Sorts params by their declared index, the order in which they are marshaled
pub fn sort_params(params: &mut [Param]) {
    params.sort_by_key(|p| p.index);
}

/// Value unmarshaled from a contract function's return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContractValue {
    None,
    Bool(bool),
    I32(i32),
    I64(i64),
    String(String),
}

impl ContractValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ContractValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for ContractValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContractValue::None => write!(f, "<none>"),
            ContractValue::Bool(b) => write!(f, "{}", b),
            ContractValue::I32(v) => write!(f, "{}", v),
            ContractValue::I64(v) => write!(f, "{}", v),
            ContractValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// How the raw return of a contract function is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    None,
    String,
    Int32,
    Int64,
    Bool,
}

impl ReturnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnKind::None => "",
            ReturnKind::String => "string",
            ReturnKind::Int32 => "int32",
            ReturnKind::Int64 => "int64",
            ReturnKind::Bool => "bool",
        }
    }
}

/// Return-type string that names no known kind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported return type: {0}")]
pub struct UnsupportedReturnKind(pub String);

impl FromStr for ReturnKind {
    type Err = UnsupportedReturnKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(ReturnKind::None),
            "string" => Ok(ReturnKind::String),
            "int32" => Ok(ReturnKind::Int32),
            "int64" => Ok(ReturnKind::Int64),
            "bool" => Ok(ReturnKind::Bool),
            other => Err(UnsupportedReturnKind(other.to_string())),
        }
    }
}

/// Outcome of a contract invocation as reported to the transaction layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractResult {
    #[serde(rename = "issuccess")]
    pub is_success: bool,

    #[serde(rename = "resultType")]
    pub result_type: String,

    pub value: ContractValue,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ContractResult {
    pub fn success(result_type: &str, value: ContractValue) -> Self {
        Self {
            is_success: true,
            result_type: result_type.to_string(),
            value,
            error: None,
        }
    }

    pub fn failure(result_type: &str, error: impl Into<String>) -> Self {
        Self {
            is_success: false,
            result_type: result_type.to_string(),
            value: ContractValue::None,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle state of a deployed contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractState {
    #[default]
    Normal,
    Suspended,
}

/// Implementation kind recorded in the code prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractKind {
    Native = 0x01,
    Runtime = 0x02,
}

/// Calling convention of a contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractPattern {
    /// Each method is its own export, args marshaled one by one
    Pattern1 = 0x01,
    /// A single `ContractEntry(method, json_args)` export
    Pattern2 = 0x02,
}

impl ContractPattern {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(ContractPattern::Pattern1),
            0x02 => Some(ContractPattern::Pattern2),
            _ => None,
        }
    }
}

const VM_TYPE_WASM: u8 = 0x01;

/// Builds the framing prefix for runtime (wasm) contract code
pub fn code_prefix(kind: ContractKind, pattern: ContractPattern) -> [u8; CODE_PREFIX_LEN] {
    let mut prefix = [0u8; CODE_PREFIX_LEN];
    prefix[0] = kind as u8;
    prefix[1] = VM_TYPE_WASM;
    prefix[2] = pattern as u8;
    prefix
}

/// Prepends the runtime-contract prefix to raw wasm bytes
pub fn frame_code(pattern: ContractPattern, wasm: &[u8]) -> Vec<u8> {
    let mut code = code_prefix(ContractKind::Runtime, pattern).to_vec();
    code.extend_from_slice(wasm);
    code
}

/// A deployed contract as kept in chain state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInfo {
    pub addr: String,
    pub name: String,
    #[serde(rename = "owneraddr")]
    pub owner: String,
    #[serde(with = "crate::hex_bytes")]
    pub code: Vec<u8>,
    #[serde(default, rename = "codesdesc")]
    pub code_desc: String,
    #[serde(default)]
    pub state: ContractState,
    #[serde(default, rename = "relatedinfos")]
    pub related: BTreeMap<String, String>,
}

impl ContractInfo {
    /// A normal runtime contract wrapping `wasm` in the framing prefix
    pub fn new(addr: &str, name: &str, owner: &str, pattern: ContractPattern, wasm: &[u8]) -> Self {
        Self {
            addr: addr.to_string(),
            name: name.to_string(),
            owner: owner.to_string(),
            code: frame_code(pattern, wasm),
            code_desc: String::new(),
            state: ContractState::Normal,
            related: BTreeMap::new(),
        }
    }

    /// The wasm module with the framing prefix removed
    pub fn wasm_code(&self) -> Option<&[u8]> {
        if self.code.len() < CODE_PREFIX_LEN {
            return None;
        }
        Some(&self.code[CODE_PREFIX_LEN..])
    }

    /// Calling convention decoded from the prefix
    pub fn pattern(&self) -> Option<ContractPattern> {
        if self.code.len() < CODE_PREFIX_LEN || self.code[1] != VM_TYPE_WASM {
            return None;
        }
        ContractPattern::from_byte(self.code[2])
    }

    pub fn is_normal(&self) -> bool {
        self.state == ContractState::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_json_field_names() {
        let json = r#"[{"index":1,"name":"to","paramType":"string","value":"addr-2"},
                       {"index":0,"name":"n","paramType":"int32","value":7}]"#;
        let mut params: Vec<Param> = serde_json::from_str(json).unwrap();
        sort_params(&mut params);

        assert_eq!(params[0].name, "n");
        assert_eq!(params[0].value.as_i64(), Some(7));
        assert_eq!(params[1].value_text(), "addr-2");
    }

    #[test]
    fn test_return_kind_parsing() {
        assert_eq!("".parse::<ReturnKind>().unwrap(), ReturnKind::None);
        assert_eq!("string".parse::<ReturnKind>().unwrap(), ReturnKind::String);
        assert_eq!("int64".parse::<ReturnKind>().unwrap(), ReturnKind::Int64);
        assert!("float".parse::<ReturnKind>().is_err());
    }

    #[test]
    fn test_code_framing() {
        let wasm = b"\0asm\x01\0\0\0";
        let info = ContractInfo {
            addr: "c1".into(),
            name: "token".into(),
            owner: "o1".into(),
            code: frame_code(ContractPattern::Pattern2, wasm),
            code_desc: String::new(),
            state: ContractState::Normal,
            related: BTreeMap::new(),
        };

        assert_eq!(info.wasm_code(), Some(&wasm[..]));
        assert_eq!(info.pattern(), Some(ContractPattern::Pattern2));
    }

    #[test]
    fn test_state_defaults_to_normal() {
        assert_eq!(ContractState::default(), ContractState::Normal);
        let info: ContractInfo =
            serde_json::from_str(r#"{"addr":"c1","name":"n","owneraddr":"o1","code":""}"#).unwrap();
        assert_eq!(info.state, ContractState::Normal);
    }

    #[test]
    fn test_short_code_has_no_wasm() {
        let info = ContractInfo {
            addr: "c1".into(),
            name: "broken".into(),
            owner: "o1".into(),
            code: vec![1, 2, 3],
            code_desc: String::new(),
            state: ContractState::Suspended,
            related: BTreeMap::new(),
        };

        assert!(info.wasm_code().is_none());
        assert!(info.pattern().is_none());
        assert!(!info.is_normal());
    }
}
