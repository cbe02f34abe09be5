/*!
# Host Function Registry

The fixed table of host functions contracts may import from `env`.

Each entry is a [`HostCall`] variant. The variant knows its import name, its
wasm signature and the native function that implements it, so linking is a
plain `match` with no runtime type inspection. A [`ModuleEnv`] is built once
by the embedding node and shared read-only by every VM.
*/

use std::collections::HashMap;
use std::fmt;

use wasmtime::{FuncType, Linker, ValType};

use crate::context::VmState;
use crate::{
    contract_helpers, economics_helpers, identity_helpers, json_helpers, logging_helpers,
    storage_helpers, string_helpers, ConstructionError, ENV_MODULE,
};

/// Wasm value type as seen at the host boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    I32,
    I64,
    F32,
    F64,
    V128,
    FuncRef,
    ExternRef,
}

impl From<&ValType> for ValueKind {
    fn from(ty: &ValType) -> Self {
        match ty {
            ValType::I32 => ValueKind::I32,
            ValType::I64 => ValueKind::I64,
            ValType::F32 => ValueKind::F32,
            ValType::F64 => ValueKind::F64,
            ValType::V128 => ValueKind::V128,
            ValType::FuncRef => ValueKind::FuncRef,
            ValType::ExternRef => ValueKind::ExternRef,
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::I32 => "i32",
            ValueKind::I64 => "i64",
            ValueKind::F32 => "f32",
            ValueKind::F64 => "f64",
            ValueKind::V128 => "v128",
            ValueKind::FuncRef => "funcref",
            ValueKind::ExternRef => "externref",
        };
        f.write_str(name)
    }
}

/// Parameter and result types of a function
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    pub params: Vec<ValueKind>,
    pub results: Vec<ValueKind>,
}

impl Signature {
    pub fn new(params: &[ValueKind], results: &[ValueKind]) -> Self {
        Self {
            params: params.to_vec(),
            results: results.to_vec(),
        }
    }
}

impl From<&FuncType> for Signature {
    fn from(ty: &FuncType) -> Self {
        Self {
            params: ty.params().map(|p| ValueKind::from(&p)).collect(),
            results: ty.results().map(|r| ValueKind::from(&r)).collect(),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |kinds: &[ValueKind]| {
            kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>().join(", ")
        };
        write!(f, "({}) -> ({})", join(&self.params), join(&self.results))
    }
}

/// Every host function a contract can import
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostCall {
    PrintS,
    PrintI,
    Strlen,
    Strcmp,
    Strcat,
    Atoi,
    Itoa,
    BigIntAdd,
    BigIntSub,
    BigIntCmp,
    JsonObjectIndex,
    JsonCreateObject,
    JsonGetInt,
    JsonGetString,
    JsonPutInt,
    JsonPutString,
    JsonToString,
    ContractCall,
    ContractDelegateCall,
    TrigEvent,
    SenderAddr,
    OwnerAddr,
    ContractAddr,
    Height,
    Balance,
    SetBalance,
    Allowance,
    SetAllowance,
    CreateCurrency,
    BuildCurrencyCAddrMap,
    IsContractNormal,
    SuspendContract,
    UnsuspendContract,
    ChangeContractOwner,
    StoreJsonObject,
    LoadJsonObject,
}

impl HostCall {
    /// Registration order of the default registry
    pub const ALL: [HostCall; 36] = [
        HostCall::PrintS,
        HostCall::PrintI,
        HostCall::Strlen,
        HostCall::Strcmp,
        HostCall::Strcat,
        HostCall::Atoi,
        HostCall::Itoa,
        HostCall::BigIntAdd,
        HostCall::BigIntSub,
        HostCall::BigIntCmp,
        HostCall::JsonObjectIndex,
        HostCall::JsonCreateObject,
        HostCall::JsonGetInt,
        HostCall::JsonGetString,
        HostCall::JsonPutInt,
        HostCall::JsonPutString,
        HostCall::JsonToString,
        HostCall::ContractCall,
        HostCall::ContractDelegateCall,
        HostCall::TrigEvent,
        HostCall::SenderAddr,
        HostCall::OwnerAddr,
        HostCall::ContractAddr,
        HostCall::Height,
        HostCall::Balance,
        HostCall::SetBalance,
        HostCall::Allowance,
        HostCall::SetAllowance,
        HostCall::CreateCurrency,
        HostCall::BuildCurrencyCAddrMap,
        HostCall::IsContractNormal,
        HostCall::SuspendContract,
        HostCall::UnsuspendContract,
        HostCall::ChangeContractOwner,
        HostCall::StoreJsonObject,
        HostCall::LoadJsonObject,
    ];

    /// Import name used by contracts
    pub fn name(&self) -> &'static str {
        match self {
            HostCall::PrintS => "print_s",
            HostCall::PrintI => "print_i",
            HostCall::Strlen => "strlen",
            HostCall::Strcmp => "strcmp",
            HostCall::Strcat => "strcat",
            HostCall::Atoi => "Atoi",
            HostCall::Itoa => "Itoa",
            HostCall::BigIntAdd => "BigIntAdd",
            HostCall::BigIntSub => "BigIntSub",
            HostCall::BigIntCmp => "BigIntCmp",
            HostCall::JsonObjectIndex => "JsonObjectIndex",
            HostCall::JsonCreateObject => "JsonCreateObject",
            HostCall::JsonGetInt => "JsonGetInt",
            HostCall::JsonGetString => "JsonGetString",
            HostCall::JsonPutInt => "JsonPutInt",
            HostCall::JsonPutString => "JsonPutString",
            HostCall::JsonToString => "JsonToString",
            HostCall::ContractCall => "ContractCall",
            HostCall::ContractDelegateCall => "ContractDelegateCall",
            HostCall::TrigEvent => "TrigEvent",
            HostCall::SenderAddr => "SenderAddr",
            HostCall::OwnerAddr => "OwnerAddr",
            HostCall::ContractAddr => "ContractAddr",
            HostCall::Height => "Height",
            HostCall::Balance => "Balance",
            HostCall::SetBalance => "SetBalance",
            HostCall::Allowance => "Allowance",
            HostCall::SetAllowance => "SetAllowance",
            HostCall::CreateCurrency => "CreateCurrency",
            HostCall::BuildCurrencyCAddrMap => "BuildCurrencyCAddrMap",
            HostCall::IsContractNormal => "IsContractNormal",
            HostCall::SuspendContract => "SuspendContract",
            HostCall::UnsuspendContract => "UnsuspendContract",
            HostCall::ChangeContractOwner => "ChangeContractOwner",
            HostCall::StoreJsonObject => "StoreJsonObject",
            HostCall::LoadJsonObject => "LoadJsonObject",
        }
    }

    pub fn signature(&self) -> Signature {
        use ValueKind::{I32, I64};

        match self {
            HostCall::PrintS | HostCall::PrintI => Signature::new(&[I32], &[]),
            HostCall::JsonPutInt | HostCall::JsonPutString => Signature::new(&[I32, I32, I32], &[]),
            HostCall::JsonCreateObject
            | HostCall::SenderAddr
            | HostCall::OwnerAddr
            | HostCall::ContractAddr
            | HostCall::Height => Signature::new(&[], &[I32]),
            HostCall::Strlen
            | HostCall::Atoi
            | HostCall::Itoa
            | HostCall::JsonObjectIndex
            | HostCall::JsonToString
            | HostCall::IsContractNormal
            | HostCall::SuspendContract
            | HostCall::UnsuspendContract => Signature::new(&[I32], &[I32]),
            HostCall::Strcmp
            | HostCall::Strcat
            | HostCall::BigIntAdd
            | HostCall::BigIntSub
            | HostCall::BigIntCmp
            | HostCall::JsonGetInt
            | HostCall::JsonGetString
            | HostCall::TrigEvent
            | HostCall::Balance
            | HostCall::BuildCurrencyCAddrMap
            | HostCall::ChangeContractOwner
            | HostCall::LoadJsonObject => Signature::new(&[I32, I32], &[I32]),
            HostCall::SetBalance
            | HostCall::Allowance
            | HostCall::CreateCurrency
            | HostCall::StoreJsonObject => Signature::new(&[I32, I32, I32], &[I32]),
            HostCall::SetAllowance => Signature::new(&[I32, I32, I32, I32], &[I32]),
            HostCall::ContractCall | HostCall::ContractDelegateCall => {
                Signature::new(&[I32, I32, I32, I32], &[I64])
            }
        }
    }

    /// Registers the native implementation under `env.<name>`
    pub fn define(&self, linker: &mut Linker<VmState>) -> anyhow::Result<()> {
        let name = self.name();
        match self {
            HostCall::PrintS => linker.func_wrap(ENV_MODULE, name, logging_helpers::print_s)?,
            HostCall::PrintI => linker.func_wrap(ENV_MODULE, name, logging_helpers::print_i)?,
            HostCall::Strlen => linker.func_wrap(ENV_MODULE, name, string_helpers::strlen)?,
            HostCall::Strcmp => linker.func_wrap(ENV_MODULE, name, string_helpers::strcmp)?,
            HostCall::Strcat => linker.func_wrap(ENV_MODULE, name, string_helpers::strcat)?,
            HostCall::Atoi => linker.func_wrap(ENV_MODULE, name, string_helpers::atoi)?,
            HostCall::Itoa => linker.func_wrap(ENV_MODULE, name, string_helpers::itoa)?,
            HostCall::BigIntAdd => linker.func_wrap(ENV_MODULE, name, string_helpers::big_int_add)?,
            HostCall::BigIntSub => linker.func_wrap(ENV_MODULE, name, string_helpers::big_int_sub)?,
            HostCall::BigIntCmp => linker.func_wrap(ENV_MODULE, name, string_helpers::big_int_cmp)?,
            HostCall::JsonObjectIndex => {
                linker.func_wrap(ENV_MODULE, name, json_helpers::json_object_index)?
            }
            HostCall::JsonCreateObject => {
                linker.func_wrap(ENV_MODULE, name, json_helpers::json_create_object)?
            }
            HostCall::JsonGetInt => linker.func_wrap(ENV_MODULE, name, json_helpers::json_get_int)?,
            HostCall::JsonGetString => {
                linker.func_wrap(ENV_MODULE, name, json_helpers::json_get_string)?
            }
            HostCall::JsonPutInt => linker.func_wrap(ENV_MODULE, name, json_helpers::json_put_int)?,
            HostCall::JsonPutString => {
                linker.func_wrap(ENV_MODULE, name, json_helpers::json_put_string)?
            }
            HostCall::JsonToString => {
                linker.func_wrap(ENV_MODULE, name, json_helpers::json_to_string)?
            }
            HostCall::ContractCall => {
                linker.func_wrap(ENV_MODULE, name, contract_helpers::contract_call)?
            }
            HostCall::ContractDelegateCall => {
                linker.func_wrap(ENV_MODULE, name, contract_helpers::contract_delegate_call)?
            }
            HostCall::TrigEvent => linker.func_wrap(ENV_MODULE, name, contract_helpers::trig_event)?,
            HostCall::SenderAddr => {
                linker.func_wrap(ENV_MODULE, name, identity_helpers::sender_addr)?
            }
            HostCall::OwnerAddr => linker.func_wrap(ENV_MODULE, name, identity_helpers::owner_addr)?,
            HostCall::ContractAddr => {
                linker.func_wrap(ENV_MODULE, name, identity_helpers::contract_addr)?
            }
            HostCall::Height => linker.func_wrap(ENV_MODULE, name, identity_helpers::height)?,
            HostCall::Balance => linker.func_wrap(ENV_MODULE, name, economics_helpers::balance)?,
            HostCall::SetBalance => {
                linker.func_wrap(ENV_MODULE, name, economics_helpers::set_balance)?
            }
            HostCall::Allowance => linker.func_wrap(ENV_MODULE, name, economics_helpers::allowance)?,
            HostCall::SetAllowance => {
                linker.func_wrap(ENV_MODULE, name, economics_helpers::set_allowance)?
            }
            HostCall::CreateCurrency => {
                linker.func_wrap(ENV_MODULE, name, economics_helpers::create_currency)?
            }
            HostCall::BuildCurrencyCAddrMap => {
                linker.func_wrap(ENV_MODULE, name, economics_helpers::build_currency_contract_map)?
            }
            HostCall::IsContractNormal => {
                linker.func_wrap(ENV_MODULE, name, contract_helpers::is_contract_normal)?
            }
            HostCall::SuspendContract => {
                linker.func_wrap(ENV_MODULE, name, contract_helpers::suspend_contract)?
            }
            HostCall::UnsuspendContract => {
                linker.func_wrap(ENV_MODULE, name, contract_helpers::unsuspend_contract)?
            }
            HostCall::ChangeContractOwner => {
                linker.func_wrap(ENV_MODULE, name, contract_helpers::change_contract_owner)?
            }
            HostCall::StoreJsonObject => {
                linker.func_wrap(ENV_MODULE, name, storage_helpers::store_json_object)?
            }
            HostCall::LoadJsonObject => {
                linker.func_wrap(ENV_MODULE, name, storage_helpers::load_json_object)?
            }
        };
        Ok(())
    }
}

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFunction {
    pub name: &'static str,
    pub signature: Signature,
    pub call: HostCall,
}

/// Immutable registry of host functions, indexed in registration order
#[derive(Debug, Clone)]
pub struct ModuleEnv {
    functions: Vec<HostFunction>,
    by_name: HashMap<&'static str, usize>,
}

impl Default for ModuleEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleEnv {
    /// Registry with every host function
    pub fn new() -> Self {
        Self::with_calls(&HostCall::ALL)
    }

    /// Registry restricted to `calls`; later duplicates are ignored
    pub fn with_calls(calls: &[HostCall]) -> Self {
        let mut functions = Vec::with_capacity(calls.len());
        let mut by_name = HashMap::with_capacity(calls.len());

        for call in calls {
            if by_name.contains_key(call.name()) {
                continue;
            }
            by_name.insert(call.name(), functions.len());
            functions.push(HostFunction {
                name: call.name(),
                signature: call.signature(),
                call: *call,
            });
        }

        Self { functions, by_name }
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&HostFunction> {
        self.by_name.get(name).map(|&index| &self.functions[index])
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn functions(&self) -> &[HostFunction] {
        &self.functions
    }

    /// Defines every registered function in `linker`
    pub fn define_all(&self, linker: &mut Linker<VmState>) -> Result<(), ConstructionError> {
        for function in &self.functions {
            function.call.define(linker).map_err(|e| {
                ConstructionError::Instantiation(format!(
                    "failed to link host function {}: {}",
                    function.name, e
                ))
            })?;
        }
        Ok(())
    }
}
