/*!
# Contract Core VM

Executes WebAssembly smart contracts inside a sandboxed wasmtime instance.

The crate is organised bottom-up:

- [`allocator`] and [`heap`] manage the guest heap that host functions use
  to pass strings into the contract's linear memory.
- [`module_env`] and [`import_resolver`] describe the host functions the
  `env` import module exposes and validate contract imports against them.
- [`vm`] wraps a single instantiated contract and marshals calls into it.
- [`invoker`] drives whole contract invocations, including nested calls
  issued by a running contract.
*/

pub mod allocator;
pub mod config;
pub mod context;
pub mod heap;
pub mod host_abi;
pub mod import_resolver;
pub mod invoker;
pub mod mem_helpers;
pub mod module_env;
pub mod vm;

mod contract_helpers;
mod economics_helpers;
mod identity_helpers;
mod json_helpers;
mod logging_helpers;
mod storage_helpers;
mod string_helpers;

use cvm_types::StateError;
use thiserror::Error;

pub use allocator::BuddyAllocator;
pub use config::VmConfig;
pub use contract_helpers::CONTRACT_EVENT;
pub use context::{
    ChainState, ContractInvoker, EventPublisher, GasBudget, GasMeter, HostContext, InvocationFrame,
    NestedCall, VmState,
};
pub use heap::HeapMemory;
pub use import_resolver::{ImportResolver, ResolvedModule};
pub use invoker::{InvokeRequest, RuntimeInvoker};
pub use module_env::{HostCall, HostFunction, ModuleEnv, Signature, ValueKind};
pub use vm::{VmStatus, WasmVirtualMachine};

/// Name of the only import module contracts may link against
pub const ENV_MODULE: &str = "env";

/// Errors raised by the guest heap and its allocator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AllocationError {
    #[error("allocator capacity must be a power of two, got {0}")]
    InvalidCapacity(usize),

    #[error("no free block of {requested} bytes (largest free block is {largest_free})")]
    InsufficientMemory { requested: usize, largest_free: usize },

    #[error("offset {offset} is outside the heap of {total} bytes")]
    InvalidOffset { offset: usize, total: usize },

    #[error("offset {0} does not belong to an allocated block")]
    NotAllocated(usize),

    #[error("cannot grow heap of {total} bytes by {additional} bytes")]
    InvalidGrow { additional: usize, total: usize },

    #[error("heap allocator is not initialized")]
    AllocatorNotInitialized,

    #[error("heap no longer ends at the end of linear memory")]
    HeapNotContiguous,

    #[error("linear memory error: {0}")]
    LinearMemory(String),
}

/// Errors raised while compiling, validating or instantiating a contract
#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error("engine configuration error: {0}")]
    Engine(String),

    #[error("malformed module: {0}")]
    MalformedModule(String),

    #[error("import module '{0}' is not supported")]
    UnsupportedImportModule(String),

    #[error("unresolved import {module}.{name}")]
    UnresolvedImport { module: String, name: String },

    #[error("import {name} signature mismatch: expected {expected}, found {found}")]
    ImportSignatureMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("failed to attach heap: {0}")]
    HeapAttach(#[from] AllocationError),

    #[error("instantiation failed: {0}")]
    Instantiation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Errors raised while calling into an instantiated contract
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("contract does not export a function named '{0}'")]
    UnknownExport(String),

    #[error("function index {index} out of range ({count} exported functions)")]
    FunctionIndexOutOfRange { index: usize, count: usize },

    #[error("expected {expected} arguments, got {found}")]
    ArityMismatch { expected: usize, found: usize },

    #[error("unsupported parameter type {0}")]
    UnsupportedValueType(String),

    #[error("unsupported return type {0}")]
    UnsupportedReturnType(String),

    #[error("function returned no value")]
    MissingResult,

    #[error("execution trapped: {0}")]
    Trap(String),

    #[error("out of gas")]
    OutOfGas,

    #[error("call depth {depth} exceeds maximum {max}")]
    CallDepthExceeded { depth: u32, max: u32 },

    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    #[error("virtual machine is not ready")]
    NotReady,

    #[error("guest memory error: {0}")]
    GuestMemory(String),
}

/// Top-level error of the core VM
#[derive(Error, Debug)]
pub enum VmError {
    #[error("construction error: {0}")]
    Construction(#[from] ConstructionError),

    #[error("allocation error: {0}")]
    Allocation(#[from] AllocationError),

    #[error("invocation error: {0}")]
    Invocation(#[from] InvocationError),

    #[error("state error: {0}")]
    State(#[from] StateError),
}

pub type VmResult<T> = Result<T, VmError>;
