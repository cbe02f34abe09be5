/*!
# Runtime Invoker

Drives contract invocations end to end. Every frame, nested ones included,
gets its own VM with its own heap and JSON table; only chain state, the
event publisher and the gas meter are shared between frames.

Two calling conventions are supported:

- **Pattern 1**: each method is an export of its own and arguments are
  marshaled one by one (`string` through the guest heap, integers raw).
- **Pattern 2**: a single `ContractEntry(method, json_args)` export.
*/

use std::sync::{Arc, Weak};

use cvm_types::{
    sort_params, ContractPattern, ContractResult, ContractValue, Param, ReturnKind, StateError,
    CONTRACT_ENTRY,
};
use tracing::{debug, info, warn};
use wasmtime::Engine;

use crate::config::VmConfig;
use crate::context::{
    ChainState, ContractInvoker, EventPublisher, GasMeter, HostContext, InvocationFrame, NestedCall,
};
use crate::module_env::ModuleEnv;
use crate::vm::WasmVirtualMachine;
use crate::{ConstructionError, InvocationError, VmResult};

/// A single frame to execute
#[derive(Debug, Clone)]
pub struct InvokeRequest {
    pub frame: InvocationFrame,
    /// Raw wasm bytes, without the chain framing prefix
    pub code: Vec<u8>,
    pub contract_name: String,
    pub method: String,
    pub params: Vec<Param>,
    pub return_type: ReturnKind,
    pub pattern: ContractPattern,
    pub depth: u32,
}

pub struct RuntimeInvoker {
    engine: Engine,
    env: Arc<ModuleEnv>,
    config: Arc<VmConfig>,
    chain: Arc<dyn ChainState>,
    events: Arc<dyn EventPublisher>,
    gas: Arc<dyn GasMeter>,
    this: Weak<RuntimeInvoker>,
}

impl RuntimeInvoker {
    pub fn new(
        config: VmConfig,
        env: Arc<ModuleEnv>,
        chain: Arc<dyn ChainState>,
        events: Arc<dyn EventPublisher>,
        gas: Arc<dyn GasMeter>,
    ) -> Result<Arc<Self>, ConstructionError> {
        config.validate()?;
        let engine = config.engine()?;

        Ok(Arc::new_cyclic(|this| Self {
            engine,
            env,
            config: Arc::new(config),
            chain,
            events,
            gas,
            this: this.clone(),
        }))
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn module_env(&self) -> &Arc<ModuleEnv> {
        &self.env
    }

    /// Runs one frame over raw wasm code
    pub fn invoke(&self, request: InvokeRequest) -> VmResult<ContractValue> {
        if request.depth > self.config.max_call_depth {
            return Err(InvocationError::CallDepthExceeded {
                depth: request.depth,
                max: self.config.max_call_depth,
            }
            .into());
        }

        let ctx = HostContext::new(
            request.frame,
            self.chain.clone(),
            self.events.clone(),
            self.gas.clone(),
            self.config.clone(),
        )
        .at_depth(request.depth);
        let span = ctx.span.clone();
        let _enter = span.enter();

        info!(
            contract_name = %request.contract_name,
            method = %request.method,
            pattern = ?request.pattern,
            "Invoking contract"
        );

        let mut vm = WasmVirtualMachine::with_code(&self.engine, self.env.clone(), ctx, &request.code)?;
        if let Some(this) = self.this.upgrade() {
            vm.set_contract_invoker(this);
        }

        let result = match request.pattern {
            ContractPattern::Pattern1 => {
                call_pattern1(&mut vm, &request.method, request.params, request.return_type)
            }
            ContractPattern::Pattern2 => {
                call_pattern2(&mut vm, &request.method, &request.params, request.return_type)
            }
        };

        let fuel = vm.fuel_consumed();
        debug!(fuel, "Frame finished");
        if !self.gas.spend_gas(fuel) {
            warn!(fuel, "Gas meter cannot cover consumed fuel");
            return Err(InvocationError::OutOfGas.into());
        }

        result
    }

    /// Loads the deployed contract at `contract_addr` and runs `method`
    fn run_contract(
        &self,
        contract_addr: &str,
        caller_addr: &str,
        method: &str,
        params: Vec<Param>,
        return_type: ReturnKind,
        depth: u32,
    ) -> VmResult<ContractValue> {
        if depth > self.config.max_call_depth {
            return Err(InvocationError::CallDepthExceeded {
                depth,
                max: self.config.max_call_depth,
            }
            .into());
        }

        let info = self.chain.load_contract(contract_addr)?;
        if !info.is_normal() {
            return Err(StateError::InvalidState(format!("contract {} is suspended", contract_addr)).into());
        }

        let code = info.wasm_code().ok_or_else(|| {
            ConstructionError::MalformedModule("contract code shorter than its prefix".to_string())
        })?;
        let pattern = info.pattern().ok_or_else(|| {
            ConstructionError::MalformedModule("unknown contract pattern".to_string())
        })?;

        self.invoke(InvokeRequest {
            frame: InvocationFrame {
                contract_addr: info.addr.clone(),
                owner_addr: info.owner.clone(),
                caller_addr: caller_addr.to_string(),
            },
            code: code.to_vec(),
            contract_name: info.name.clone(),
            method: method.to_string(),
            params,
            return_type,
            pattern,
            depth,
        })
    }

    /// Top-level entry used by the transaction layer
    pub fn invoke_contract(
        &self,
        contract_addr: &str,
        sender: &str,
        method: &str,
        params: Vec<Param>,
        return_type: ReturnKind,
    ) -> ContractResult {
        match self.run_contract(contract_addr, sender, method, params, return_type, 0) {
            Ok(value) => ContractResult::success(return_type.as_str(), value),
            Err(e) => {
                warn!(contract = %contract_addr, method = %method, error = %e, "Contract invocation failed");
                ContractResult::failure(return_type.as_str(), e.to_string())
            }
        }
    }
}

impl ContractInvoker for RuntimeInvoker {
    fn invoke_internal(&self, call: NestedCall) -> VmResult<ContractValue> {
        self.run_contract(
            &call.contract_addr,
            &call.caller_addr,
            &call.method,
            call.params,
            call.return_type,
            call.depth,
        )
    }
}

fn export_index(vm: &WasmVirtualMachine, name: &str) -> Result<usize, InvocationError> {
    vm.exported_function_index(name)
        .ok_or_else(|| InvocationError::UnknownExport(name.to_string()))
}

fn int_param(param: &Param) -> Result<i64, InvocationError> {
    param
        .value
        .as_i64()
        .or_else(|| param.value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            InvocationError::InvalidParam(format!("param {} is not an integer: {}", param.index, param.value))
        })
}

/// Marshals one argument into its raw call representation
fn marshal_param(vm: &mut WasmVirtualMachine, param: &Param) -> VmResult<u64> {
    match param.param_type.as_str() {
        "string" => {
            let text = param.value.as_str().ok_or_else(|| {
                InvocationError::InvalidParam(format!("param {} is not a string", param.index))
            })?;
            Ok(vm.write_bytes(text.as_bytes())? as u32 as u64)
        }
        "int32" => {
            let value = i32::try_from(int_param(param)?).map_err(|_| {
                InvocationError::InvalidParam(format!("param {} out of int32 range", param.index))
            })?;
            Ok(value as u32 as u64)
        }
        "int64" => Ok(int_param(param)? as u64),
        other => Err(InvocationError::UnsupportedValueType(other.to_string()).into()),
    }
}

fn call_pattern1(
    vm: &mut WasmVirtualMachine,
    method: &str,
    mut params: Vec<Param>,
    return_type: ReturnKind,
) -> VmResult<ContractValue> {
    let index = export_index(vm, method)?;
    let signature = vm.signature(index)?;
    if signature.params.len() != params.len() {
        return Err(InvocationError::ArityMismatch {
            expected: signature.params.len(),
            found: params.len(),
        }
        .into());
    }

    sort_params(&mut params);
    let args = params
        .iter()
        .map(|param| marshal_param(vm, param))
        .collect::<VmResult<Vec<_>>>()?;

    vm.execute(index, return_type, &args)
}

fn call_pattern2(
    vm: &mut WasmVirtualMachine,
    method: &str,
    params: &[Param],
    return_type: ReturnKind,
) -> VmResult<ContractValue> {
    let index = export_index(vm, CONTRACT_ENTRY)?;
    let signature = vm.signature(index)?;
    if signature.params.len() != 2 {
        return Err(InvocationError::ArityMismatch {
            expected: 2,
            found: signature.params.len(),
        }
        .into());
    }
    if params.len() > 1 {
        return Err(InvocationError::ArityMismatch {
            expected: 1,
            found: params.len(),
        }
        .into());
    }

    // A string value is taken as JSON text, anything else is serialized
    let json = match params.first().map(|p| &p.value) {
        None => "{}".to_string(),
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(value) => value.to_string(),
    };

    let method_ptr = vm.write_bytes(method.as_bytes())?;
    let json_ptr = vm.write_bytes(json.as_bytes())?;
    vm.execute(index, return_type, &[method_ptr as u32 as u64, json_ptr as u32 as u64])
}
