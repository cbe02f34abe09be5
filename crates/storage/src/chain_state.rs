use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use cvm_core_vm::ChainState;
use cvm_types::{Amount, ContractInfo, ContractState, CurrencyInfo, StateError, StateResult};
use hashbrown::HashMap;
use num_bigint::BigUint;
use tracing::{debug, info};

use crate::genesis::Genesis;

type BalanceKey = (String, String);
type AllowanceKey = (String, String, String);

fn read<T>(lock: &RwLock<T>) -> StateResult<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|e| StateError::Storage(format!("lock poisoned: {}", e)))
}

fn write<T>(lock: &RwLock<T>) -> StateResult<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|e| StateError::Storage(format!("lock poisoned: {}", e)))
}

/// Chain state held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryChainState {
    height: AtomicU64,
    currencies: RwLock<HashMap<String, CurrencyInfo>>,
    /// Keyed by (account, symbol)
    balances: RwLock<HashMap<BalanceKey, BigUint>>,
    /// Keyed by (owner, spender, symbol)
    allowances: RwLock<HashMap<AllowanceKey, BigUint>>,
    contracts: RwLock<HashMap<String, ContractInfo>>,
    currency_contracts: RwLock<HashMap<String, String>>,
}

impl MemoryChainState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a chain state seeded from a genesis document
    pub fn from_genesis(genesis: &Genesis) -> StateResult<Self> {
        let state = Self::new();
        state.set_height(genesis.height);

        for currency in &genesis.currencies {
            state.create_currency(&currency.symbol, currency.clone())?;
        }
        for balance in &genesis.balances {
            let info = state.currency_info(&balance.symbol)?;
            let value = cvm_types::parse_amount(&balance.amount)?;
            state.set_balance(&balance.addr, Amount::new(&balance.symbol, info.decimal, value))?;
        }
        for contract in &genesis.contracts {
            state.deploy_contract(contract.clone())?;
        }

        info!(
            height = genesis.height,
            currencies = genesis.currencies.len(),
            contracts = genesis.contracts.len(),
            "Chain state loaded from genesis"
        );
        Ok(state)
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    /// Registers a new contract; an address can only be deployed once
    pub fn deploy_contract(&self, info: ContractInfo) -> StateResult<()> {
        let mut contracts = write(&self.contracts)?;
        if contracts.contains_key(&info.addr) {
            return Err(StateError::AlreadyExists(info.addr));
        }
        debug!(addr = %info.addr, name = %info.name, owner = %info.owner, "Contract deployed");
        contracts.insert(info.addr.clone(), info);
        Ok(())
    }

    /// Addresses of every deployed contract, sorted
    pub fn contract_addrs(&self) -> StateResult<Vec<String>> {
        let mut addrs: Vec<String> = read(&self.contracts)?.keys().cloned().collect();
        addrs.sort();
        Ok(addrs)
    }

    /// Contract registered as the governor of `symbol`
    pub fn currency_contract(&self, symbol: &str) -> StateResult<String> {
        read(&self.currency_contracts)?
            .get(symbol)
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("currency contract for {}", symbol)))
    }

    fn with_contract<R>(&self, addr: &str, f: impl FnOnce(&mut ContractInfo) -> R) -> StateResult<R> {
        let mut contracts = write(&self.contracts)?;
        let contract = contracts
            .get_mut(addr)
            .ok_or_else(|| StateError::NotFound(format!("contract {}", addr)))?;
        Ok(f(contract))
    }

    fn check_currency(&self, amount: &Amount) -> StateResult<()> {
        if read(&self.currencies)?.contains_key(&amount.currency.symbol) {
            Ok(())
        } else {
            Err(StateError::NotFound(format!("currency {}", amount.currency.symbol)))
        }
    }
}

impl ChainState for MemoryChainState {
    fn height(&self) -> u64 {
        self.height.load(Ordering::SeqCst)
    }

    fn create_currency(&self, symbol: &str, info: CurrencyInfo) -> StateResult<()> {
        let mut currencies = write(&self.currencies)?;
        if currencies.contains_key(symbol) {
            return Err(StateError::AlreadyExists(format!("currency {}", symbol)));
        }
        info!(symbol, decimal = info.decimal, total_supply = %info.total_supply, "Currency created");
        currencies.insert(symbol.to_string(), info);
        Ok(())
    }

    fn currency_info(&self, symbol: &str) -> StateResult<CurrencyInfo> {
        read(&self.currencies)?
            .get(symbol)
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("currency {}", symbol)))
    }

    fn set_balance(&self, addr: &str, amount: Amount) -> StateResult<()> {
        self.check_currency(&amount)?;
        write(&self.balances)?.insert((addr.to_string(), amount.currency.symbol), amount.value);
        Ok(())
    }

    fn balance(&self, addr: &str, symbol: &str) -> StateResult<BigUint> {
        read(&self.balances)?
            .get(&(addr.to_string(), symbol.to_string()))
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("balance of {} in {}", addr, symbol)))
    }

    fn set_allowance(&self, owner: &str, spender: &str, amount: Amount) -> StateResult<()> {
        self.check_currency(&amount)?;
        write(&self.allowances)?.insert(
            (owner.to_string(), spender.to_string(), amount.currency.symbol),
            amount.value,
        );
        Ok(())
    }

    fn allowance(&self, owner: &str, spender: &str, symbol: &str) -> StateResult<BigUint> {
        read(&self.allowances)?
            .get(&(owner.to_string(), spender.to_string(), symbol.to_string()))
            .cloned()
            .ok_or_else(|| {
                StateError::NotFound(format!("allowance of {} for {} in {}", owner, spender, symbol))
            })
    }

    fn build_currency_contract_map(&self, symbol: &str, contract_addr: &str) -> StateResult<()> {
        write(&self.currency_contracts)?.insert(symbol.to_string(), contract_addr.to_string());
        Ok(())
    }

    fn load_contract(&self, addr: &str) -> StateResult<ContractInfo> {
        read(&self.contracts)?
            .get(addr)
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("contract {}", addr)))
    }

    fn is_contract_normal(&self, addr: &str) -> bool {
        read(&self.contracts)
            .map(|contracts| contracts.get(addr).map(|c| c.is_normal()).unwrap_or(false))
            .unwrap_or(false)
    }

    fn update_contract_state(&self, addr: &str, state: ContractState) -> StateResult<()> {
        self.with_contract(addr, |contract| contract.state = state)?;
        info!(addr, ?state, "Contract state updated");
        Ok(())
    }

    fn change_contract_owner(&self, addr: &str, owner: &str) -> StateResult<()> {
        self.with_contract(addr, |contract| contract.owner = owner.to_string())?;
        info!(addr, owner, "Contract owner changed");
        Ok(())
    }

    fn add_contract_related_object(&self, addr: &str, key: &str, json: &str) -> StateResult<()> {
        self.with_contract(addr, |contract| {
            contract.related.insert(key.to_string(), json.to_string());
        })
    }

    fn load_contract_related_object(&self, addr: &str, key: &str) -> StateResult<String> {
        read(&self.contracts)?
            .get(addr)
            .ok_or_else(|| StateError::NotFound(format!("contract {}", addr)))?
            .related
            .get(key)
            .cloned()
            .ok_or_else(|| StateError::NotFound(format!("object {} of contract {}", key, addr)))
    }
}
