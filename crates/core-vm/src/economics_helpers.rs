//! Currency, balance and allowance host functions.

use cvm_types::{parse_amount, Amount, CurrencyInfo, StateError, StateResult};
use num_bigint::BigUint;
use tracing::{debug, error};
use wasmtime::Caller;

use crate::context::VmState;
use crate::host_abi::{charge_host_call, read_arg, return_string, status, NULL_PTR, STATUS_ERR};

/// Renders an amount query; absent entries read as zero
fn amount_text(host_fn: &str, result: StateResult<BigUint>) -> Option<String> {
    match result {
        Ok(value) => Some(value.to_string()),
        Err(StateError::NotFound(_)) => Some("0".to_string()),
        Err(e) => {
            error!(host_fn, error = %e, "Amount query failed");
            None
        }
    }
}

/// Parses `amount` and tags it with the registered decimals of `symbol`
fn build_amount(caller: &Caller<'_, VmState>, symbol: &str, amount: &str) -> StateResult<Amount> {
    let info = caller.data().ctx.chain.currency_info(symbol)?;
    let value = parse_amount(amount)?;
    Ok(Amount::new(symbol, info.decimal, value))
}

pub(crate) fn balance(mut caller: Caller<'_, VmState>, addr: i32, symbol: i32) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "Balance")?;
    let (Some(addr), Some(symbol)) = (
        read_arg(&caller, "Balance", "addr", addr),
        read_arg(&caller, "Balance", "symbol", symbol),
    ) else {
        return Ok(NULL_PTR);
    };

    let result = caller.data().ctx.chain.balance(&addr, &symbol);
    match amount_text("Balance", result) {
        Some(text) => Ok(return_string(&mut caller, "Balance", &text)),
        None => Ok(NULL_PTR),
    }
}

pub(crate) fn set_balance(
    mut caller: Caller<'_, VmState>,
    addr: i32,
    symbol: i32,
    amount: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "SetBalance")?;
    let (Some(addr), Some(symbol), Some(amount)) = (
        read_arg(&caller, "SetBalance", "addr", addr),
        read_arg(&caller, "SetBalance", "symbol", symbol),
        read_arg(&caller, "SetBalance", "amount", amount),
    ) else {
        return Ok(STATUS_ERR);
    };

    debug!(addr = %addr, symbol = %symbol, amount = %amount, "SetBalance");
    let result = build_amount(&caller, &symbol, &amount)
        .and_then(|amount| caller.data().ctx.chain.set_balance(&addr, amount));
    Ok(status("SetBalance", result))
}

pub(crate) fn allowance(
    mut caller: Caller<'_, VmState>,
    owner: i32,
    spender: i32,
    symbol: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "Allowance")?;
    let (Some(owner), Some(spender), Some(symbol)) = (
        read_arg(&caller, "Allowance", "owner", owner),
        read_arg(&caller, "Allowance", "spender", spender),
        read_arg(&caller, "Allowance", "symbol", symbol),
    ) else {
        return Ok(NULL_PTR);
    };

    let result = caller.data().ctx.chain.allowance(&owner, &spender, &symbol);
    match amount_text("Allowance", result) {
        Some(text) => Ok(return_string(&mut caller, "Allowance", &text)),
        None => Ok(NULL_PTR),
    }
}

pub(crate) fn set_allowance(
    mut caller: Caller<'_, VmState>,
    owner: i32,
    spender: i32,
    symbol: i32,
    amount: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "SetAllowance")?;
    let (Some(owner), Some(spender), Some(symbol), Some(amount)) = (
        read_arg(&caller, "SetAllowance", "owner", owner),
        read_arg(&caller, "SetAllowance", "spender", spender),
        read_arg(&caller, "SetAllowance", "symbol", symbol),
        read_arg(&caller, "SetAllowance", "amount", amount),
    ) else {
        return Ok(STATUS_ERR);
    };

    let result = build_amount(&caller, &symbol, &amount)
        .and_then(|amount| caller.data().ctx.chain.set_allowance(&owner, &spender, amount));
    Ok(status("SetAllowance", result))
}

pub(crate) fn create_currency(
    mut caller: Caller<'_, VmState>,
    symbol: i32,
    decimal: i32,
    total_supply: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "CreateCurrency")?;
    let (Some(symbol), Some(total_supply)) = (
        read_arg(&caller, "CreateCurrency", "symbol", symbol),
        read_arg(&caller, "CreateCurrency", "totalSupply", total_supply),
    ) else {
        return Ok(STATUS_ERR);
    };

    let result = parse_amount(&total_supply).and_then(|_| {
        let info = CurrencyInfo {
            symbol: symbol.clone(),
            decimal: i64::from(decimal),
            total_supply,
        };
        caller.data().ctx.chain.create_currency(&symbol, info)
    });
    Ok(status("CreateCurrency", result))
}

pub(crate) fn build_currency_contract_map(
    mut caller: Caller<'_, VmState>,
    symbol: i32,
    contract: i32,
) -> anyhow::Result<i32> {
    charge_host_call(&mut caller, "BuildCurrencyCAddrMap")?;
    let (Some(symbol), Some(contract)) = (
        read_arg(&caller, "BuildCurrencyCAddrMap", "symbol", symbol),
        read_arg(&caller, "BuildCurrencyCAddrMap", "contract", contract),
    ) else {
        return Ok(STATUS_ERR);
    };

    let result = caller.data().ctx.chain.build_currency_contract_map(&symbol, &contract);
    Ok(status("BuildCurrencyCAddrMap", result))
}
