//! JSON object handles.
//!
//! Contracts cannot hold structured values, so parsed objects live in a
//! per-VM table on the host side and the guest refers to them by index.

use serde_json::{Map, Value};
use tracing::error;
use wasmtime::Caller;

use crate::context::VmState;
use crate::host_abi::{charge_host_call, read_arg, return_string, NULL_PTR, STATUS_ERR};

type JsonObject = Map<String, Value>;

fn store_object(caller: &mut Caller<'_, VmState>, object: JsonObject) -> i32 {
    let objects = &mut caller.data_mut().json_objects;
    match i32::try_from(objects.len()) {
        Ok(handle) => {
            objects.push(object);
            handle
        }
        Err(_) => STATUS_ERR,
    }
}

fn object<'a>(caller: &'a Caller<'_, VmState>, host_fn: &str, handle: i32) -> Option<&'a JsonObject> {
    let found = usize::try_from(handle)
        .ok()
        .and_then(|index| caller.data().json_objects.get(index));
    if found.is_none() {
        error!(host_fn, handle, "Invalid json object handle");
    }
    found
}

fn object_mut<'a>(
    caller: &'a mut Caller<'_, VmState>,
    host_fn: &str,
    handle: i32,
) -> Option<&'a mut JsonObject> {
    let found = usize::try_from(handle)
        .ok()
        .and_then(|index| caller.data_mut().json_objects.get_mut(index));
    if found.is_none() {
        error!(host_fn, handle, "Invalid json object handle");
    }
    found
}

/// Integer text with optional sign and `0x` prefix
pub(crate) fn parse_int(text: &str) -> Option<i64> {
    let text = text.trim();
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let magnitude = match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}

fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => parse_int(s),
        _ => None,
    }
}

pub(crate) fn json_object_index(mut caller: Caller<'_, VmState>, ptr: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "JsonObjectIndex")?;
    let Some(text) = read_arg(&caller, "JsonObjectIndex", "json", ptr) else {
        return Ok(STATUS_ERR);
    };
    match serde_json::from_str::<JsonObject>(&text) {
        Ok(object) => Ok(store_object(&mut caller, object)),
        Err(e) => {
            error!(json = %text, error = %e, "JsonObjectIndex invalid json object");
            Ok(STATUS_ERR)
        }
    }
}

pub(crate) fn json_create_object(mut caller: Caller<'_, VmState>) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "JsonCreateObject")?;
    Ok(store_object(&mut caller, JsonObject::new()))
}

/// Numeric field; numeric strings are accepted too
pub(crate) fn json_get_int(mut caller: Caller<'_, VmState>, handle: i32, key: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "JsonGetInt")?;
    let Some(key) = read_arg(&caller, "JsonGetInt", "key", key) else {
        return Ok(STATUS_ERR);
    };
    let Some(object) = object(&caller, "JsonGetInt", handle) else {
        return Ok(STATUS_ERR);
    };

    let value = object.get(&key).and_then(int_value).and_then(|v| i32::try_from(v).ok());
    Ok(value.unwrap_or_else(|| {
        error!(key = %key, "JsonGetInt missing or non-integer field");
        STATUS_ERR
    }))
}

pub(crate) fn json_get_string(mut caller: Caller<'_, VmState>, handle: i32, key: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "JsonGetString")?;
    let Some(key) = read_arg(&caller, "JsonGetString", "key", key) else {
        return Ok(NULL_PTR);
    };
    let Some(object) = object(&caller, "JsonGetString", handle) else {
        return Ok(NULL_PTR);
    };

    let text = match object.get(&key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => {
            error!(key = %key, "JsonGetString missing field");
            return Ok(NULL_PTR);
        }
    };
    Ok(return_string(&mut caller, "JsonGetString", &text))
}

pub(crate) fn json_put_int(mut caller: Caller<'_, VmState>, handle: i32, key: i32, value: i32) -> anyhow::Result<()> {
    charge_host_call(&mut caller, "JsonPutInt")?;
    let Some(key) = read_arg(&caller, "JsonPutInt", "key", key) else {
        return Ok(());
    };
    if let Some(object) = object_mut(&mut caller, "JsonPutInt", handle) {
        object.insert(key, Value::from(value));
    }
    Ok(())
}

pub(crate) fn json_put_string(mut caller: Caller<'_, VmState>, handle: i32, key: i32, value: i32) -> anyhow::Result<()> {
    charge_host_call(&mut caller, "JsonPutString")?;
    let (Some(key), Some(value)) = (
        read_arg(&caller, "JsonPutString", "key", key),
        read_arg(&caller, "JsonPutString", "value", value),
    ) else {
        return Ok(());
    };
    if let Some(object) = object_mut(&mut caller, "JsonPutString", handle) {
        object.insert(key, Value::String(value));
    }
    Ok(())
}

pub(crate) fn json_to_string(mut caller: Caller<'_, VmState>, handle: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "JsonToString")?;
    let Some(object) = object(&caller, "JsonToString", handle) else {
        return Ok(NULL_PTR);
    };
    let text = match serde_json::to_string(object) {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "JsonToString serialize failed");
            return Ok(NULL_PTR);
        }
    };
    Ok(return_string(&mut caller, "JsonToString", &text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_forms() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int(" -7 "), Some(-7));
        assert_eq!(parse_int("+3"), Some(3));
        assert_eq!(parse_int("0x1F"), Some(31));
        assert_eq!(parse_int("-0x10"), Some(-16));
        assert_eq!(parse_int("12abc"), None);
        assert_eq!(parse_int(""), None);
    }

    #[test]
    fn test_int_value_accepts_numbers_and_numeric_strings() {
        assert_eq!(int_value(&serde_json::json!(5)), Some(5));
        assert_eq!(int_value(&serde_json::json!("0x20")), Some(32));
        assert_eq!(int_value(&serde_json::json!(1.5)), None);
        assert_eq!(int_value(&serde_json::json!(true)), None);
    }
}
