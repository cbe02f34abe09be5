use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use cvm_core_vm::{GasBudget, ImportResolver, ModuleEnv, RuntimeInvoker, Signature, VmConfig};
use cvm_storage::{ContractEvent, EventBus, Genesis, MemoryChainState};
use cvm_types::{ContractInfo, ContractPattern, ContractResult, Param, ReturnKind};
use serde::Serialize;
use tracing::{debug, info};
use wasmtime::{ExternType, Module};

/// Address a contract given with `--code` is deployed at
pub const SCRATCH_ADDR: &str = "scratch-contract";

#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Contract code, binary wasm or WAT text
    #[arg(long)]
    pub code: Option<PathBuf>,

    /// Run a contract already present in the genesis state instead of --code
    #[arg(long, conflicts_with = "code")]
    pub contract: Option<String>,

    /// Method to invoke
    #[arg(long, short = 'm')]
    pub method: String,

    /// Params as a JSON array of {index, name, paramType, value}
    #[arg(long, short = 'p')]
    pub params: Option<String>,

    /// Return type: string, int32, int64, bool, or empty for none
    #[arg(long, default_value = "")]
    pub rtn_type: String,

    /// Calling convention of --code (1 or 2)
    #[arg(long, default_value_t = 1)]
    pub pattern: u8,

    /// Transaction sender
    #[arg(long, default_value = "sender")]
    pub sender: String,

    /// Genesis document seeding the chain state
    #[arg(long)]
    pub genesis: Option<PathBuf>,

    /// Gas available to the whole invocation
    #[arg(long)]
    pub gas_limit: Option<u64>,
}

#[derive(Debug, Clone, Args)]
pub struct InspectArgs {
    /// Contract code, binary wasm or WAT text
    #[arg(long)]
    pub code: PathBuf,
}

/// What `cvm run` prints
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub result: ContractResult,
    pub events: Vec<ContractEvent>,
    pub gas_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub module: String,
    pub name: String,
    pub kind: String,
    pub resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub name: String,
    pub signature: String,
}

/// What `cvm inspect` prints
#[derive(Debug, Clone, Serialize)]
pub struct InspectReport {
    pub imports: Vec<ImportReport>,
    pub exports: Vec<ExportReport>,
}

/// Reads contract code; WAT text is compiled, binary wasm is passed through
pub fn read_code(path: &Path) -> Result<Vec<u8>> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read code file {}", path.display()))?;
    let wasm = wat::parse_bytes(&bytes)
        .with_context(|| format!("Failed to parse WAT in {}", path.display()))?;
    Ok(wasm.into_owned())
}

fn parse_params(text: Option<&str>) -> Result<Vec<Param>> {
    match text {
        Some(text) if !text.trim().is_empty() => {
            serde_json::from_str(text).context("Params must be a JSON array of params")
        }
        _ => Ok(Vec::new()),
    }
}

fn load_chain(genesis: Option<&Path>) -> Result<MemoryChainState> {
    let Some(path) = genesis else {
        return Ok(MemoryChainState::new());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read genesis file {}", path.display()))?;
    let genesis = Genesis::from_json(&text)?;
    Ok(MemoryChainState::from_genesis(&genesis)?)
}

pub fn run(args: &RunArgs, config: &VmConfig) -> Result<RunReport> {
    let return_type: ReturnKind = args.rtn_type.parse()?;
    let params = parse_params(args.params.as_deref())?;

    let chain = Arc::new(load_chain(args.genesis.as_deref())?);
    let addr = match (&args.code, &args.contract) {
        (Some(code), _) => {
            let pattern = ContractPattern::from_byte(args.pattern)
                .ok_or_else(|| anyhow!("Unknown pattern {}, expected 1 or 2", args.pattern))?;
            let wasm = read_code(code)?;
            chain.deploy_contract(ContractInfo::new(
                SCRATCH_ADDR,
                SCRATCH_ADDR,
                &args.sender,
                pattern,
                &wasm,
            ))?;
            debug!(bytes = wasm.len(), ?pattern, "Scratch contract deployed");
            SCRATCH_ADDR.to_string()
        }
        (None, Some(addr)) => addr.clone(),
        (None, None) => bail!("Either --code or --contract is required"),
    };

    let events = Arc::new(EventBus::new());
    let gas = Arc::new(match args.gas_limit {
        Some(limit) => GasBudget::limited(limit),
        None => GasBudget::unlimited(),
    });
    let invoker = RuntimeInvoker::new(
        config.clone(),
        Arc::new(ModuleEnv::new()),
        chain,
        events.clone(),
        gas.clone(),
    )?;

    info!(contract = %addr, method = %args.method, sender = %args.sender, "Running contract");
    let result = invoker.invoke_contract(&addr, &args.sender, &args.method, params, return_type);

    Ok(RunReport {
        result,
        events: events.events(),
        gas_used: gas.used(),
    })
}

pub fn inspect(args: &InspectArgs, config: &VmConfig) -> Result<InspectReport> {
    let wasm = read_code(&args.code)?;
    let engine = config.engine()?;
    let module = Module::new(&engine, &wasm).context("Failed to compile module")?;
    let resolver = ImportResolver::new(Arc::new(ModuleEnv::new()));

    let imports = module
        .imports()
        .map(|import| {
            let ty = import.ty();
            let kind = match &ty {
                ExternType::Func(func) => Signature::from(func).to_string(),
                ExternType::Memory(_) => "memory".to_string(),
                ExternType::Table(_) => "table".to_string(),
                ExternType::Global(_) => "global".to_string(),
            };
            let bound = resolver.bind(import.module(), import.name(), &ty);
            ImportReport {
                module: import.module().to_string(),
                name: import.name().to_string(),
                kind,
                resolved: bound.is_ok(),
                error: bound.err().map(|e| e.to_string()),
            }
        })
        .collect();

    let exports = module
        .exports()
        .filter_map(|export| match export.ty() {
            ExternType::Func(func) => Some(ExportReport {
                name: export.name().to_string(),
                signature: Signature::from(&func).to_string(),
            }),
            _ => None,
        })
        .collect();

    Ok(InspectReport { imports, exports })
}
