#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use cvm_core_vm::{
    ChainState, EventPublisher, GasBudget, GasMeter, HostContext, InvocationFrame, ModuleEnv,
    RuntimeInvoker, VmConfig, WasmVirtualMachine,
};
use cvm_types::{
    Amount, ContractInfo, ContractPattern, ContractState, CurrencyInfo, StateError, StateResult,
};
use num_bigint::BigUint;

/// Minimal chain state kept in hash maps
#[derive(Default)]
pub struct MockChain {
    pub height: u64,
    pub currencies: Mutex<HashMap<String, CurrencyInfo>>,
    pub balances: Mutex<HashMap<(String, String), BigUint>>,
    pub allowances: Mutex<HashMap<(String, String, String), BigUint>>,
    pub contracts: Mutex<HashMap<String, ContractInfo>>,
    pub currency_contracts: Mutex<HashMap<String, String>>,
    pub related: Mutex<HashMap<(String, String), String>>,
}

impl MockChain {
    pub fn deploy(&self, info: ContractInfo) {
        self.contracts.lock().unwrap().insert(info.addr.clone(), info);
    }
}

impl ChainState for MockChain {
    fn height(&self) -> u64 {
        self.height
    }

    fn create_currency(&self, symbol: &str, info: CurrencyInfo) -> StateResult<()> {
        let mut currencies = self.currencies.lock().unwrap();
        if currencies.contains_key(symbol) {
            return Err(StateError::AlreadyExists(symbol.to_string()));
        }
        currencies.insert(symbol.to_string(), info);
        Ok(())
    }

    fn currency_info(&self, symbol: &str) -> StateResult<CurrencyInfo> {
        self.currencies
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .ok_or_else(|| StateError::NotFound(symbol.to_string()))
    }

    fn set_balance(&self, addr: &str, amount: Amount) -> StateResult<()> {
        self.balances
            .lock()
            .unwrap()
            .insert((addr.to_string(), amount.currency.symbol), amount.value);
        Ok(())
    }

    fn balance(&self, addr: &str, symbol: &str) -> StateResult<BigUint> {
        self.balances
            .lock()
            .unwrap()
            .get(&(addr.to_string(), symbol.to_string()))
            .cloned()
            .ok_or_else(|| StateError::NotFound(addr.to_string()))
    }

    fn set_allowance(&self, owner: &str, spender: &str, amount: Amount) -> StateResult<()> {
        self.allowances.lock().unwrap().insert(
            (owner.to_string(), spender.to_string(), amount.currency.symbol),
            amount.value,
        );
        Ok(())
    }

    fn allowance(&self, owner: &str, spender: &str, symbol: &str) -> StateResult<BigUint> {
        self.allowances
            .lock()
            .unwrap()
            .get(&(owner.to_string(), spender.to_string(), symbol.to_string()))
            .cloned()
            .ok_or_else(|| StateError::NotFound(owner.to_string()))
    }

    fn build_currency_contract_map(&self, symbol: &str, contract_addr: &str) -> StateResult<()> {
        self.currency_contracts
            .lock()
            .unwrap()
            .insert(symbol.to_string(), contract_addr.to_string());
        Ok(())
    }

    fn load_contract(&self, addr: &str) -> StateResult<ContractInfo> {
        self.contracts
            .lock()
            .unwrap()
            .get(addr)
            .cloned()
            .ok_or_else(|| StateError::NotFound(addr.to_string()))
    }

    fn is_contract_normal(&self, addr: &str) -> bool {
        self.contracts
            .lock()
            .unwrap()
            .get(addr)
            .map(|c| c.is_normal())
            .unwrap_or(false)
    }

    fn update_contract_state(&self, addr: &str, state: ContractState) -> StateResult<()> {
        let mut contracts = self.contracts.lock().unwrap();
        let contract = contracts
            .get_mut(addr)
            .ok_or_else(|| StateError::NotFound(addr.to_string()))?;
        contract.state = state;
        Ok(())
    }

    fn change_contract_owner(&self, addr: &str, owner: &str) -> StateResult<()> {
        let mut contracts = self.contracts.lock().unwrap();
        let contract = contracts
            .get_mut(addr)
            .ok_or_else(|| StateError::NotFound(addr.to_string()))?;
        contract.owner = owner.to_string();
        Ok(())
    }

    fn add_contract_related_object(&self, addr: &str, key: &str, json: &str) -> StateResult<()> {
        self.related
            .lock()
            .unwrap()
            .insert((addr.to_string(), key.to_string()), json.to_string());
        Ok(())
    }

    fn load_contract_related_object(&self, addr: &str, key: &str) -> StateResult<String> {
        self.related
            .lock()
            .unwrap()
            .get(&(addr.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| StateError::NotFound(key.to_string()))
    }
}

/// Publisher that keeps every event in memory
#[derive(Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl EventPublisher for RecordingEvents {
    fn publish_with_tags(&self, event: &str, tags: &BTreeMap<String, String>) -> StateResult<()> {
        self.events.lock().unwrap().push((event.to_string(), tags.clone()));
        Ok(())
    }
}

pub struct Harness {
    pub chain: Arc<MockChain>,
    pub events: Arc<RecordingEvents>,
    pub gas: Arc<GasBudget>,
    pub config: VmConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        Self {
            chain: Arc::new(MockChain::default()),
            events: Arc::new(RecordingEvents::default()),
            gas: Arc::new(GasBudget::unlimited()),
            config,
        }
    }

    pub fn frame() -> InvocationFrame {
        InvocationFrame {
            contract_addr: "contract-1".to_string(),
            owner_addr: "owner-1".to_string(),
            caller_addr: "sender-1".to_string(),
        }
    }

    pub fn context(&self) -> HostContext {
        let gas: Arc<dyn GasMeter> = self.gas.clone();
        HostContext::new(
            Self::frame(),
            self.chain.clone(),
            self.events.clone(),
            gas,
            Arc::new(self.config.clone()),
        )
    }

    pub fn vm(&self) -> WasmVirtualMachine {
        let engine = self.config.engine().unwrap();
        WasmVirtualMachine::new(&engine, Arc::new(ModuleEnv::new()), self.context())
    }

    /// Compiles `wat` and loads it into a fresh VM
    pub fn load(&self, wat: &str) -> WasmVirtualMachine {
        let wasm = wat::parse_str(wat).unwrap();
        let mut vm = self.vm();
        vm.load(&wasm).unwrap();
        vm
    }

    /// Invoker sharing this harness's chain, events and gas meter
    pub fn invoker(&self) -> Arc<RuntimeInvoker> {
        RuntimeInvoker::new(
            self.config.clone(),
            Arc::new(ModuleEnv::new()),
            self.chain.clone(),
            self.events.clone(),
            self.gas.clone(),
        )
        .unwrap()
    }

    /// Deploys `wat` as a normal contract at `addr`
    pub fn deploy(&self, addr: &str, owner: &str, pattern: ContractPattern, wat: &str) {
        let wasm = wat::parse_str(wat).unwrap();
        self.chain.deploy(ContractInfo::new(addr, addr, owner, pattern, &wasm));
    }
}
