//! Frame identities and chain position.

use wasmtime::Caller;

use crate::context::VmState;
use crate::host_abi::{charge_host_call, return_string};

pub(crate) fn sender_addr(mut caller: Caller<'_, VmState>) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "SenderAddr")?;
    let addr = caller.data().ctx.frame.caller_addr.clone();
    Ok(return_string(&mut caller, "SenderAddr", &addr))
}

pub(crate) fn owner_addr(mut caller: Caller<'_, VmState>) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "OwnerAddr")?;
    let addr = caller.data().ctx.frame.owner_addr.clone();
    Ok(return_string(&mut caller, "OwnerAddr", &addr))
}

pub(crate) fn contract_addr(mut caller: Caller<'_, VmState>) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "ContractAddr")?;
    let addr = caller.data().ctx.frame.contract_addr.clone();
    Ok(return_string(&mut caller, "ContractAddr", &addr))
}

/// Block height, saturated to the i32 range
pub(crate) fn height(mut caller: Caller<'_, VmState>) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "Height")?;
    let height = caller.data().ctx.chain.height();
    Ok(i32::try_from(height).unwrap_or(i32::MAX))
}
