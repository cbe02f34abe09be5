//! Contract-scoped JSON object persistence.

use tracing::error;
use wasmtime::Caller;

use crate::context::VmState;
use crate::host_abi::{charge_host_call, read_arg, return_string, status, NULL_PTR, STATUS_ERR};

/// StoreJsonObject: stores a JSON document under `key` in the contract's scope
pub(crate) fn store_json_object(
    mut caller: Caller<'_, VmState>,
    contract: i32,
    key: i32,
    json: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "StoreJsonObject")?;
    let (Some(contract), Some(key), Some(json)) = (
        read_arg(&caller, "StoreJsonObject", "contract", contract),
        read_arg(&caller, "StoreJsonObject", "key", key),
        read_arg(&caller, "StoreJsonObject", "json", json),
    ) else {
        return Ok(STATUS_ERR);
    };

    if let Err(e) = serde_json::from_str::<serde_json::Value>(&json) {
        error!(key = %key, error = %e, "StoreJsonObject rejects invalid json");
        return Ok(STATUS_ERR);
    }

    let result = caller
        .data()
        .ctx
        .chain
        .add_contract_related_object(&contract, &key, &json);
    Ok(status("StoreJsonObject", result))
}

/// LoadJsonObject: returns the JSON document stored under `key`
pub(crate) fn load_json_object(mut caller: Caller<'_, VmState>, contract: i32, key: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "LoadJsonObject")?;
    let (Some(contract), Some(key)) = (
        read_arg(&caller, "LoadJsonObject", "contract", contract),
        read_arg(&caller, "LoadJsonObject", "key", key),
    ) else {
        return Ok(NULL_PTR);
    };

    match caller.data().ctx.chain.load_contract_related_object(&contract, &key) {
        Ok(json) => Ok(return_string(&mut caller, "LoadJsonObject", &json)),
        Err(e) => {
            error!(contract = %contract, key = %key, error = %e, "LoadJsonObject failed");
            Ok(NULL_PTR)
        }
    }
}
