/*!
# Host ABI

Conventions shared by every host function:

1. Each call first charges `host_call_gas` to the gas meter. An exhausted
   meter is the one condition that traps the guest. The guest heap is bound
   here too when the call comes from a start function.
2. String arguments are guest pointers to NUL-terminated text.
3. Recoverable failures are logged and reported to the guest as `-1` for
   integer results and `0` (NULL) for pointer results.
*/

use std::fmt::Display;

use thiserror::Error;
use tracing::{error, warn};
use wasmtime::Caller;

use crate::context::VmState;
use crate::mem_helpers;

/// Status returned to the guest on success
pub const STATUS_OK: i32 = 0;
/// Status returned to the guest on failure
pub const STATUS_ERR: i32 = -1;
/// Pointer returned to the guest on failure
pub const NULL_PTR: i32 = 0;

/// Trap raised when the gas meter can no longer cover a host call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("gas exhausted in host function")]
pub struct GasExhausted;

/// Charges the per-call gas, trapping when the budget is spent
pub fn charge_host_call(caller: &mut Caller<'_, VmState>, host_fn: &str) -> anyhow::Result<()> {
    let ctx = &caller.data().ctx;
    if !ctx.gas.spend_gas(ctx.config.host_call_gas) {
        warn!(host_fn, "Gas exhausted");
        return Err(GasExhausted.into());
    }
    mem_helpers::attach_exported_memory(caller);
    Ok(())
}

/// Reads a string argument, logging the failure
pub fn read_arg(caller: &Caller<'_, VmState>, host_fn: &str, arg: &str, ptr: i32) -> Option<String> {
    match mem_helpers::read_string(caller, ptr) {
        Ok(value) => Some(value),
        Err(e) => {
            error!(host_fn, arg, ptr, error = %e, "Can't read argument");
            None
        }
    }
}

/// Writes `value` to the guest heap and returns its pointer, or NULL
pub fn return_string(caller: &mut Caller<'_, VmState>, host_fn: &str, value: &str) -> i32 {
    match mem_helpers::write_bytes(caller, value.as_bytes()) {
        Ok(ptr) => ptr,
        Err(e) => {
            error!(host_fn, error = %e, "Can't write result");
            NULL_PTR
        }
    }
}

/// Maps a collaborator result onto the guest status convention
pub fn status<E: Display>(host_fn: &str, result: Result<(), E>) -> i32 {
    match result {
        Ok(()) => STATUS_OK,
        Err(e) => {
            error!(host_fn, error = %e, "Host call failed");
            STATUS_ERR
        }
    }
}
