use tracing::info;
use wasmtime::Caller;

use crate::context::VmState;
use crate::host_abi::{charge_host_call, read_arg};

/// print_s: logs a guest string
pub(crate) fn print_s(mut caller: Caller<'_, VmState>, ptr: i32) -> anyhow::Result<()> {
    charge_host_call(&mut caller, "print_s")?;
    if let Some(message) = read_arg(&caller, "print_s", "str", ptr) {
        info!(target: "contract", contract = %caller.data().ctx.frame.contract_addr, "{}", message);
    }
    Ok(())
}

/// print_i: logs a guest integer
pub(crate) fn print_i(mut caller: Caller<'_, VmState>, value: i32) -> anyhow::Result<()> {
    charge_host_call(&mut caller, "print_i")?;
    info!(target: "contract", contract = %caller.data().ctx.frame.contract_addr, "{}", value);
    Ok(())
}
