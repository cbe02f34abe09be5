/*!
# Execution Context

Collaborator interfaces the VM consumes (chain state, event publication, gas
metering, nested contract invocation) and the per-frame state that wasmtime
host functions see through their `Caller`.
*/

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cvm_types::{
    Amount, ContractInfo, ContractState, ContractValue, CurrencyInfo, Param, ReturnKind,
    StateResult,
};
use num_bigint::BigUint;
use tracing::Span;
use wasmtime::Memory;

use crate::config::VmConfig;
use crate::heap::HeapMemory;
use crate::VmError;

/// Chain-state queries and mutations available to contracts
pub trait ChainState: Send + Sync {
    fn height(&self) -> u64;

    fn create_currency(&self, symbol: &str, info: CurrencyInfo) -> StateResult<()>;

    fn currency_info(&self, symbol: &str) -> StateResult<CurrencyInfo>;

    fn set_balance(&self, addr: &str, amount: Amount) -> StateResult<()>;

    /// Balance of `addr`; `NotFound` when the account holds nothing of `symbol`
    fn balance(&self, addr: &str, symbol: &str) -> StateResult<BigUint>;

    fn set_allowance(&self, owner: &str, spender: &str, amount: Amount) -> StateResult<()>;

    fn allowance(&self, owner: &str, spender: &str, symbol: &str) -> StateResult<BigUint>;

    /// Records which contract governs `symbol`
    fn build_currency_contract_map(&self, symbol: &str, contract_addr: &str) -> StateResult<()>;

    fn load_contract(&self, addr: &str) -> StateResult<ContractInfo>;

    fn is_contract_normal(&self, addr: &str) -> bool;

    fn update_contract_state(&self, addr: &str, state: ContractState) -> StateResult<()>;

    fn change_contract_owner(&self, addr: &str, owner: &str) -> StateResult<()>;

    /// Stores a JSON document under `key` in the contract's scope
    fn add_contract_related_object(&self, addr: &str, key: &str, json: &str) -> StateResult<()>;

    fn load_contract_related_object(&self, addr: &str, key: &str) -> StateResult<String>;
}

/// Sink for contract events
pub trait EventPublisher: Send + Sync {
    fn publish_with_tags(&self, event: &str, tags: &BTreeMap<String, String>) -> StateResult<()>;
}

/// Gas accounting shared by every frame of one invocation
pub trait GasMeter: Send + Sync {
    /// Deducts `amount`; returns false once the budget cannot cover it
    fn spend_gas(&self, amount: u64) -> bool;
}

/// Atomic gas counter with an optional upper limit
#[derive(Debug, Default)]
pub struct GasBudget {
    limit: Option<u64>,
    used: AtomicU64,
}

impl GasBudget {
    pub fn limited(limit: u64) -> Self {
        Self {
            limit: Some(limit),
            used: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> Option<u64> {
        self.limit.map(|limit| limit.saturating_sub(self.used()))
    }
}

impl GasMeter for GasBudget {
    fn spend_gas(&self, amount: u64) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                let next = used.checked_add(amount)?;
                match self.limit {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            })
            .is_ok()
    }
}

/// Identities visible to one call frame
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InvocationFrame {
    /// Contract being executed
    pub contract_addr: String,
    /// Owner of that contract
    pub owner_addr: String,
    /// Account (or contract owner) that issued the call
    pub caller_addr: String,
}

/// A contract call issued from inside a running contract
#[derive(Debug, Clone)]
pub struct NestedCall {
    pub contract_addr: String,
    pub caller_addr: String,
    pub method: String,
    pub params: Vec<Param>,
    pub return_type: ReturnKind,
    /// Depth of the callee frame
    pub depth: u32,
}

/// Capability used by `ContractCall`/`ContractDelegateCall` to run another contract
pub trait ContractInvoker: Send + Sync {
    fn invoke_internal(&self, call: NestedCall) -> Result<ContractValue, VmError>;
}

/// Everything injected into one VM frame
#[derive(Clone)]
pub struct HostContext {
    pub frame: InvocationFrame,
    pub chain: Arc<dyn ChainState>,
    pub events: Arc<dyn EventPublisher>,
    pub gas: Arc<dyn GasMeter>,
    pub config: Arc<VmConfig>,
    pub depth: u32,
    pub execution_id: String,
    /// Diagnostics of this frame are recorded under this span
    pub span: Span,
}

impl HostContext {
    pub fn new(
        frame: InvocationFrame,
        chain: Arc<dyn ChainState>,
        events: Arc<dyn EventPublisher>,
        gas: Arc<dyn GasMeter>,
        config: Arc<VmConfig>,
    ) -> Self {
        let execution_id = uuid::Uuid::new_v4().to_string();
        let span = frame_span(&frame, &execution_id, 0);

        Self {
            frame,
            chain,
            events,
            gas,
            config,
            depth: 0,
            execution_id,
            span,
        }
    }

    /// Same collaborators, nested at `depth`
    pub fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self.span = frame_span(&self.frame, &self.execution_id, depth);
        self
    }
}

fn frame_span(frame: &InvocationFrame, execution_id: &str, depth: u32) -> Span {
    tracing::info_span!(
        "contract",
        contract = %frame.contract_addr,
        execution_id = %execution_id,
        depth
    )
}

/// Store data of one VM: the host context plus guest-heap bookkeeping
pub struct VmState {
    pub(crate) ctx: HostContext,
    pub(crate) heap: HeapMemory,
    /// Guest address of heap offset zero
    pub(crate) heap_base: usize,
    pub(crate) memory: Option<Memory>,
    pub(crate) json_objects: Vec<serde_json::Map<String, serde_json::Value>>,
    pub(crate) invoker: Option<Arc<dyn ContractInvoker>>,
}

impl VmState {
    pub fn new(ctx: HostContext) -> Self {
        Self {
            ctx,
            heap: HeapMemory::new(),
            heap_base: 0,
            memory: None,
            json_objects: Vec::new(),
            invoker: None,
        }
    }

    pub fn context(&self) -> &HostContext {
        &self.ctx
    }

    pub fn heap(&self) -> &HeapMemory {
        &self.heap
    }

    pub fn heap_base(&self) -> usize {
        self.heap_base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limited_budget() {
        let gas = GasBudget::limited(25);
        assert!(gas.spend_gas(10));
        assert!(gas.spend_gas(10));
        assert!(!gas.spend_gas(10));
        assert_eq!(gas.used(), 20);
        assert_eq!(gas.remaining(), Some(5));
        assert!(gas.spend_gas(5));
        assert_eq!(gas.remaining(), Some(0));
    }

    #[test]
    fn test_unlimited_budget() {
        let gas = GasBudget::unlimited();
        assert!(gas.spend_gas(u64::MAX / 2));
        assert!(gas.spend_gas(u64::MAX / 2));
        assert_eq!(gas.remaining(), None);
        assert!(!gas.spend_gas(u64::MAX));
    }
}
