//! Contract composition, events and contract lifecycle.

use std::collections::BTreeMap;

use cvm_types::{ContractState, ContractValue, Param, ReturnKind};
use tracing::{debug, error, info};
use wasmtime::Caller;

use crate::context::{NestedCall, VmState};
use crate::host_abi::{
    charge_host_call, read_arg, return_string, status, GasExhausted, NULL_PTR, STATUS_ERR,
};
use crate::{InvocationError, VmError};

/// Event name under which contract events are published
pub const CONTRACT_EVENT: &str = "contract";

/// Whose identity the callee sees as its sender
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallAuthority {
    /// The calling contract's owner
    Owner,
    /// The sender of the calling frame
    Delegate,
}

fn parse_params(host_fn: &str, json: &str) -> Option<Vec<Param>> {
    if json.trim().is_empty() {
        return Some(Vec::new());
    }
    match serde_json::from_str(json) {
        Ok(params) => Some(params),
        Err(e) => {
            error!(host_fn, json = %json, error = %e, "Invalid params json");
            None
        }
    }
}

fn nested_call(
    mut caller: Caller<'_, VmState>,
    host_fn: &str,
    authority: CallAuthority,
    contract: i32,
    method: i32,
    params: i32,
    return_type: i32,
) -> anyhow::Result<i64> {
    charge_host_call(&mut caller, host_fn)?;
    let failed = i64::from(STATUS_ERR);

    let (Some(contract), Some(method), Some(params), Some(return_type)) = (
        read_arg(&caller, host_fn, "contract", contract),
        read_arg(&caller, host_fn, "method", method),
        read_arg(&caller, host_fn, "params", params),
        read_arg(&caller, host_fn, "rtnType", return_type),
    ) else {
        return Ok(failed);
    };

    let return_type = match return_type.parse::<ReturnKind>() {
        Ok(kind) => kind,
        Err(e) => {
            error!(host_fn, error = %e, "Invalid return type");
            return Ok(failed);
        }
    };
    let Some(params) = parse_params(host_fn, &params) else {
        return Ok(failed);
    };

    let state = caller.data();
    let Some(invoker) = state.invoker.clone() else {
        error!(host_fn, "No contract invoker attached");
        return Ok(failed);
    };
    let caller_addr = match authority {
        CallAuthority::Owner => state.ctx.frame.owner_addr.clone(),
        CallAuthority::Delegate => state.ctx.frame.caller_addr.clone(),
    };

    let call = NestedCall {
        contract_addr: contract,
        caller_addr,
        method,
        params,
        return_type,
        depth: state.ctx.depth + 1,
    };
    debug!(host_fn, contract = %call.contract_addr, method = %call.method, depth = call.depth, "Nested call");

    match invoker.invoke_internal(call) {
        Ok(ContractValue::None) => Ok(0),
        Ok(ContractValue::Bool(b)) => Ok(i64::from(b)),
        Ok(ContractValue::I32(v)) => Ok(i64::from(v)),
        Ok(ContractValue::I64(v)) => Ok(v),
        Ok(ContractValue::String(s)) => match return_string(&mut caller, host_fn, &s) {
            NULL_PTR => Ok(failed),
            ptr => Ok(i64::from(ptr as u32)),
        },
        Err(VmError::Invocation(InvocationError::OutOfGas)) => Err(GasExhausted.into()),
        Err(e) => {
            error!(host_fn, error = %e, "Nested call failed");
            Ok(failed)
        }
    }
}

/// ContractCall: runs another contract with the current owner as sender
pub(crate) fn contract_call(
    caller: Caller<'_, VmState>,
    contract: i32,
    method: i32,
    params: i32,
    return_type: i32,
) -> anyhow::Result<i64> {
    nested_call(caller, "ContractCall", CallAuthority::Owner, contract, method, params, return_type)
}

/// ContractDelegateCall: runs another contract on behalf of the current sender
pub(crate) fn contract_delegate_call(
    caller: Caller<'_, VmState>,
    contract: i32,
    method: i32,
    params: i32,
    return_type: i32,
) -> anyhow::Result<i64> {
    nested_call(
        caller,
        "ContractDelegateCall",
        CallAuthority::Delegate,
        contract,
        method,
        params,
        return_type,
    )
}

/// Builds the tag map of a `method(types)` event with its JSON params
pub(crate) fn event_tags(
    contract_addr: &str,
    source: &str,
    data: &str,
) -> Result<BTreeMap<String, String>, String> {
    let segments: Vec<&str> = source.split('(').collect();
    if segments.len() != 2 {
        return Err(format!("invalid event source '{}'", source));
    }
    let params: Vec<Param> =
        serde_json::from_str(data).map_err(|e| format!("invalid event data: {}", e))?;

    let mut tags = BTreeMap::new();
    tags.insert("contract.addr".to_string(), contract_addr.to_string());
    tags.insert("contract.method".to_string(), segments[0].to_string());
    for param in &params {
        tags.insert(format!("contract.method.{}", param.name), param.value_text());
    }
    Ok(tags)
}

/// TrigEvent: publishes a contract event
pub(crate) fn trig_event(mut caller: Caller<'_, VmState>, source: i32, data: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "TrigEvent")?;
    let (Some(source), Some(data)) = (
        read_arg(&caller, "TrigEvent", "source", source),
        read_arg(&caller, "TrigEvent", "data", data),
    ) else {
        return Ok(STATUS_ERR);
    };

    let ctx = &caller.data().ctx;
    let tags = match event_tags(&ctx.frame.contract_addr, &source, &data) {
        Ok(tags) => tags,
        Err(e) => {
            error!(error = %e, "TrigEvent rejected");
            return Ok(STATUS_ERR);
        }
    };

    info!(event = %source, "TrigEvent");
    Ok(status("TrigEvent", ctx.events.publish_with_tags(CONTRACT_EVENT, &tags)))
}

/// IsContractNormal: 1 for a normal contract, 0 otherwise
pub(crate) fn is_contract_normal(mut caller: Caller<'_, VmState>, contract: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "IsContractNormal")?;
    let Some(contract) = read_arg(&caller, "IsContractNormal", "contract", contract) else {
        return Ok(STATUS_ERR);
    };
    Ok(i32::from(caller.data().ctx.chain.is_contract_normal(&contract)))
}

fn update_state(
    mut caller: Caller<'_, VmState>,
    host_fn: &str,
    contract: i32,
    new_state: ContractState,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, host_fn)?;
    let Some(contract) = read_arg(&caller, host_fn, "contract", contract) else {
        return Ok(STATUS_ERR);
    };
    let result = caller.data().ctx.chain.update_contract_state(&contract, new_state);
    Ok(status(host_fn, result))
}

pub(crate) fn suspend_contract(caller: Caller<'_, VmState>, contract: i32) -> anyhow::Result<i32> {
    update_state(caller, "SuspendContract", contract, ContractState::Suspended)
}

pub(crate) fn unsuspend_contract(caller: Caller<'_, VmState>, contract: i32) -> anyhow::Result<i32> {
    update_state(caller, "UnsuspendContract", contract, ContractState::Normal)
}

pub(crate) fn change_contract_owner(
    mut caller: Caller<'_, VmState>,
    contract: i32,
    owner: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "ChangeContractOwner")?;
    let (Some(contract), Some(owner)) = (
        read_arg(&caller, "ChangeContractOwner", "contract", contract),
        read_arg(&caller, "ChangeContractOwner", "owner", owner),
    ) else {
        return Ok(STATUS_ERR);
    };
    let result = caller.data().ctx.chain.change_contract_owner(&contract, &owner);
    Ok(status("ChangeContractOwner", result))
}
