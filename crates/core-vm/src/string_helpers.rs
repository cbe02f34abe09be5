//! String and big-integer utilities exposed to contracts.

use std::cmp::Ordering;

use num_bigint::BigInt;
use tracing::error;
use wasmtime::Caller;

use crate::context::VmState;
use crate::host_abi::{charge_host_call, read_arg, return_string, NULL_PTR, STATUS_ERR};

fn ordering_code(ordering: Ordering) -> i32 {
    match ordering {
        Ordering::Less => -1,
        Ordering::Equal => 0,
        Ordering::Greater => 1,
    }
}

pub(crate) fn strlen(mut caller: Caller<'_, VmState>, ptr: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "strlen")?;
    Ok(match read_arg(&caller, "strlen", "str", ptr) {
        Some(text) => i32::try_from(text.len()).unwrap_or(STATUS_ERR),
        None => STATUS_ERR,
    })
}

/// Byte-wise comparison; unreadable arguments compare equal
pub(crate) fn strcmp(mut caller: Caller<'_, VmState>, left: i32, right: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "strcmp")?;
    let (Some(left), Some(right)) = (
        read_arg(&caller, "strcmp", "str1", left),
        read_arg(&caller, "strcmp", "str2", right),
    ) else {
        return Ok(0);
    };
    Ok(ordering_code(left.as_bytes().cmp(right.as_bytes())))
}

pub(crate) fn strcat(mut caller: Caller<'_, VmState>, left: i32, right: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "strcat")?;
    let Some(mut joined) = read_arg(&caller, "strcat", "str1", left) else {
        return Ok(NULL_PTR);
    };
    let Some(tail) = read_arg(&caller, "strcat", "str2", right) else {
        return Ok(NULL_PTR);
    };
    joined.push_str(&tail);
    Ok(return_string(&mut caller, "strcat", &joined))
}

pub(crate) fn atoi(mut caller: Caller<'_, VmState>, ptr: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "Atoi")?;
    let Some(text) = read_arg(&caller, "Atoi", "str", ptr) else {
        return Ok(STATUS_ERR);
    };
    Ok(match text.parse::<i32>() {
        Ok(value) => value,
        Err(e) => {
            error!(input = %text, error = %e, "Atoi convert error");
            STATUS_ERR
        }
    })
}

pub(crate) fn itoa(mut caller: Caller<'_, VmState>, value: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "Itoa")?;
    Ok(return_string(&mut caller, "Itoa", &value.to_string()))
}

fn read_big_int(caller: &Caller<'_, VmState>, host_fn: &str, arg: &str, ptr: i32) -> Option<BigInt> {
    let text = read_arg(caller, host_fn, arg, ptr)?;
    let parsed = BigInt::parse_bytes(text.as_bytes(), 10);
    if parsed.is_none() {
        error!(host_fn, arg, input = %text, "Invalid decimal integer");
    }
    parsed
}

fn big_int_binary(
    mut caller: Caller<'_, VmState>,
    host_fn: &str,
    left: i32,
    right: i32,
    op: fn(BigInt, BigInt) -> BigInt,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, host_fn)?;
    let Some(left) = read_big_int(&caller, host_fn, "lhs", left) else {
        return Ok(NULL_PTR);
    };
    let Some(right) = read_big_int(&caller, host_fn, "rhs", right) else {
        return Ok(NULL_PTR);
    };
    Ok(return_string(&mut caller, host_fn, &op(left, right).to_string()))
}

pub(crate) fn big_int_add(caller: Caller<'_, VmState>, left: i32, right: i32) -> anyhow::Result<i32> {
    big_int_binary(caller, "BigIntAdd", left, right, |a, b| a + b)
}

pub(crate) fn big_int_sub(caller: Caller<'_, VmState>, left: i32, right: i32) -> anyhow::Result<i32> {
    big_int_binary(caller, "BigIntSub", left, right, |a, b| a - b)
}

/// Unparsable operands compare equal
pub(crate) fn big_int_cmp(mut caller: Caller<'_, VmState>, left: i32, right: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "BigIntCmp")?;
    let (Some(left), Some(right)) = (
        read_big_int(&caller, "BigIntCmp", "lhs", left),
        read_big_int(&caller, "BigIntCmp", "rhs", right),
    ) else {
        return Ok(0);
    };
    Ok(ordering_code(left.cmp(&right)))
}
