/*!
# WASM Virtual Machine

One contract instance bound to one frame: loads the bytecode, validates its
imports against the host registry, places the guest heap in its linear
memory and marshals calls into its exports.

```text
Unloaded --load--> Loaded --instantiate--> Ready
    \                 \
     `-----------------`--> Failed
```
*/

use std::sync::Arc;

use cvm_types::{ContractValue, ReturnKind};
use tracing::{debug, error, warn};
use wasmtime::{Engine, ExternType, Func, Linker, Memory, Module, Store, Trap, Val, ValType};

use crate::context::{ContractInvoker, HostContext, VmState};
use crate::host_abi::GasExhausted;
use crate::import_resolver::{ImportBinding, ImportResolver, MEMORY_IMPORT};
use crate::mem_helpers;
use crate::module_env::{ModuleEnv, Signature, ValueKind};
use crate::{AllocationError, ConstructionError, InvocationError, VmResult, ENV_MODULE};

/// Lifecycle of a VM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmStatus {
    Unloaded,
    Loaded,
    Ready,
    Failed,
}

/// An exported function of the instantiated contract
struct Export {
    name: String,
    func: Func,
}

pub struct WasmVirtualMachine {
    engine: Engine,
    resolver: ImportResolver,
    store: Store<VmState>,
    module: Option<Module>,
    exports: Vec<Export>,
    status: VmStatus,
}

impl WasmVirtualMachine {
    /// Creates an unloaded VM for the frame described by `ctx`
    pub fn new(engine: &Engine, env: Arc<ModuleEnv>, ctx: HostContext) -> Self {
        Self {
            engine: engine.clone(),
            resolver: ImportResolver::new(env),
            store: Store::new(engine, VmState::new(ctx)),
            module: None,
            exports: Vec::new(),
            status: VmStatus::Unloaded,
        }
    }

    /// Creates a VM and loads `code` into it
    pub fn with_code(
        engine: &Engine,
        env: Arc<ModuleEnv>,
        ctx: HostContext,
        code: &[u8],
    ) -> Result<Self, ConstructionError> {
        let mut vm = Self::new(engine, env, ctx);
        vm.load(code)?;
        Ok(vm)
    }

    pub fn status(&self) -> VmStatus {
        self.status
    }

    pub fn context(&self) -> &HostContext {
        &self.store.data().ctx
    }

    /// Compiles, links and instantiates `code`
    pub fn load(&mut self, code: &[u8]) -> Result<(), ConstructionError> {
        if self.status != VmStatus::Unloaded {
            return Err(ConstructionError::Instantiation(format!(
                "cannot load into a VM in state {:?}",
                self.status
            )));
        }

        let span = self.store.data().ctx.span.clone();
        let _enter = span.enter();

        match self.load_inner(code) {
            Ok(()) => {
                self.status = VmStatus::Ready;
                debug!(exports = self.exports.len(), "Contract loaded");
                Ok(())
            }
            Err(e) => {
                self.status = VmStatus::Failed;
                error!(error = %e, "Contract load failed");
                Err(e)
            }
        }
    }

    fn load_inner(&mut self, code: &[u8]) -> Result<(), ConstructionError> {
        let module = Module::new(&self.engine, code)
            .map_err(|e| ConstructionError::MalformedModule(e.to_string()))?;
        self.status = VmStatus::Loaded;

        let mut memory_import = None;
        for import in module.imports() {
            if let ImportBinding::Memory(ty) = self.resolver.bind(import.module(), import.name(), &import.ty())? {
                memory_import = Some(ty);
            }
        }

        let mut linker = Linker::new(&self.engine);
        self.resolver.module_env().define_all(&mut linker)?;

        if let Some(ty) = memory_import {
            let memory = Memory::new(&mut self.store, ty)
                .map_err(|e| ConstructionError::Instantiation(e.to_string()))?;
            mem_helpers::bind_heap(&mut self.store, memory)?;
            linker
                .define(&self.store, ENV_MODULE, MEMORY_IMPORT, memory)
                .map_err(|e| ConstructionError::Instantiation(e.to_string()))?;
        }

        let fuel = self.store.data().ctx.config.fuel_limit;
        self.store
            .add_fuel(fuel)
            .map_err(|e| ConstructionError::Engine(e.to_string()))?;

        let instance = linker
            .instantiate(&mut self.store, &module)
            .map_err(|e| ConstructionError::Instantiation(e.to_string()))?;

        if mem_helpers::guest_memory(&self.store).is_none() {
            let memory = instance
                .get_memory(&mut self.store, MEMORY_IMPORT)
                .ok_or_else(|| {
                    AllocationError::LinearMemory("module neither imports nor exports memory".to_string())
                })?;
            mem_helpers::bind_heap(&mut self.store, memory)?;
        }

        let mut exports = Vec::new();
        for export in module.exports() {
            if let ExternType::Func(_) = export.ty() {
                if let Some(func) = instance.get_func(&mut self.store, export.name()) {
                    exports.push(Export {
                        name: export.name().to_string(),
                        func,
                    });
                }
            }
        }

        self.exports = exports;
        self.module = Some(module);
        Ok(())
    }

    /// The compiled module, once loaded
    pub fn module(&self) -> Option<&Module> {
        self.module.as_ref()
    }

    /// Index of the exported function `name`, if any
    pub fn exported_function_index(&self, name: &str) -> Option<usize> {
        self.exports.iter().position(|e| e.name == name)
    }

    /// Names of the exported functions, in index order
    pub fn exported_functions(&self) -> Vec<&str> {
        self.exports.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn signature(&self, index: usize) -> Result<Signature, InvocationError> {
        let export = self.export(index)?;
        Ok(Signature::from(&export.func.ty(&self.store)))
    }

    /// Copies `bytes` (NUL-terminated) onto the guest heap and returns the pointer
    pub fn write_bytes(&mut self, bytes: &[u8]) -> VmResult<i32> {
        Ok(mem_helpers::write_bytes(&mut self.store, bytes)?)
    }

    /// Reads the NUL-terminated string at `ptr`
    pub fn read_string(&self, ptr: i32) -> VmResult<String> {
        Ok(mem_helpers::read_string(&self.store, ptr)?)
    }

    /// Releases a block returned by `write_bytes`
    pub fn free_bytes(&mut self, ptr: i32) -> VmResult<()> {
        Ok(mem_helpers::free_guest(&mut self.store, ptr)?)
    }

    pub fn set_contract_invoker(&mut self, invoker: Arc<dyn ContractInvoker>) {
        self.store.data_mut().invoker = Some(invoker);
    }

    pub fn contract_invoker(&self) -> Option<Arc<dyn ContractInvoker>> {
        self.store.data().invoker.clone()
    }

    /// Fuel burned by this VM so far
    pub fn fuel_consumed(&self) -> u64 {
        self.store.fuel_consumed().unwrap_or(0)
    }

    /// Size of the guest heap in bytes
    pub fn heap_capacity(&self) -> VmResult<usize> {
        Ok(self.store.data().heap.capacity()?)
    }

    /// Calls export `index` with raw integer arguments and unmarshals the result
    pub fn execute(&mut self, index: usize, return_kind: ReturnKind, args: &[u64]) -> VmResult<ContractValue> {
        if self.status != VmStatus::Ready {
            return Err(InvocationError::NotReady.into());
        }

        let func = self.export(index)?.func;
        let ty = func.ty(&self.store);
        if ty.params().len() != args.len() {
            return Err(InvocationError::ArityMismatch {
                expected: ty.params().len(),
                found: args.len(),
            }
            .into());
        }

        let params = ty
            .params()
            .zip(args)
            .map(|(kind, &raw)| match kind {
                ValType::I32 => Ok(Val::I32(raw as i32)),
                ValType::I64 => Ok(Val::I64(raw as i64)),
                other => Err(InvocationError::UnsupportedValueType(ValueKind::from(&other).to_string())),
            })
            .collect::<Result<Vec<_>, _>>()?;
        let mut results = vec![Val::I32(0); ty.results().len()];

        let span = self.store.data().ctx.span.clone();
        let _enter = span.enter();

        func.call(&mut self.store, &params, &mut results)
            .map_err(classify_failure)?;

        self.unmarshal(return_kind, results.first())
    }

    fn unmarshal(&self, return_kind: ReturnKind, raw: Option<&Val>) -> VmResult<ContractValue> {
        if return_kind == ReturnKind::None {
            return Ok(ContractValue::None);
        }

        let raw = match raw {
            Some(Val::I32(v)) => i64::from(*v),
            Some(Val::I64(v)) => *v,
            Some(other) => {
                let kind = ValueKind::from(&other.ty());
                return Err(InvocationError::UnsupportedReturnType(kind.to_string()).into());
            }
            None => return Err(InvocationError::MissingResult.into()),
        };

        Ok(match return_kind {
            ReturnKind::None => ContractValue::None,
            ReturnKind::Bool => ContractValue::Bool(raw != 0),
            ReturnKind::Int32 => ContractValue::I32(raw as i32),
            ReturnKind::Int64 => ContractValue::I64(raw),
            ReturnKind::String => ContractValue::String(self.read_string(raw as i32)?),
        })
    }

    fn export(&self, index: usize) -> Result<&Export, InvocationError> {
        self.exports.get(index).ok_or(InvocationError::FunctionIndexOutOfRange {
            index,
            count: self.exports.len(),
        })
    }
}

/// Maps a wasmtime call failure onto the invocation taxonomy
fn classify_failure(err: anyhow::Error) -> InvocationError {
    if err.downcast_ref::<GasExhausted>().is_some() {
        return InvocationError::OutOfGas;
    }
    if let Some(Trap::OutOfFuel) = err.downcast_ref::<Trap>() {
        warn!("Contract ran out of fuel");
        return InvocationError::OutOfGas;
    }
    InvocationError::Trap(format!("{:#}", err))
}
