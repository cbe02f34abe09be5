use std::sync::Arc;

use cvm_core_vm::{ChainState, GasBudget, ModuleEnv, RuntimeInvoker, VmConfig};
use cvm_storage::{EventBus, Genesis, MemoryChainState};
use cvm_types::{ContractInfo, ContractPattern, ContractState, ContractValue, Param, ReturnKind};
use num_bigint::BigUint;

const TOKEN_WAT: &str = r#"
(module
  (import "env" "CreateCurrency" (func $create (param i32 i32 i32) (result i32)))
  (import "env" "SetBalance" (func $set_balance (param i32 i32 i32) (result i32)))
  (import "env" "Balance" (func $balance (param i32 i32) (result i32)))
  (import "env" "SenderAddr" (func $sender (result i32)))
  (import "env" "ContractAddr" (func $self (result i32)))
  (import "env" "BuildCurrencyCAddrMap" (func $map (param i32 i32) (result i32)))
  (import "env" "TrigEvent" (func $trig (param i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "TOK\00")
  (data (i32.const 8) "init(string)\00")
  (func (export "init") (param $supply i32) (param $event i32) (result i32)
    (if (i32.ne (call $create (i32.const 0) (i32.const 2) (local.get $supply)) (i32.const 0))
      (then (return (i32.const -1))))
    (drop (call $map (i32.const 0) (call $self)))
    (drop (call $set_balance (call $sender) (i32.const 0) (local.get $supply)))
    (call $trig (i32.const 8) (local.get $event)))
  (func (export "balanceOf") (param $addr i32) (result i32)
    (call $balance (local.get $addr) (i32.const 0)))
)
"#;

const COUNTER_WAT: &str = r#"
(module
  (import "env" "JsonObjectIndex" (func $parse (param i32) (result i32)))
  (import "env" "JsonCreateObject" (func $create (result i32)))
  (import "env" "JsonGetInt" (func $get_int (param i32 i32) (result i32)))
  (import "env" "JsonPutInt" (func $put_int (param i32 i32 i32)))
  (import "env" "JsonToString" (func $to_str (param i32) (result i32)))
  (import "env" "StoreJsonObject" (func $store (param i32 i32 i32) (result i32)))
  (import "env" "LoadJsonObject" (func $load (param i32 i32) (result i32)))
  (import "env" "ContractAddr" (func $self (result i32)))
  (import "env" "strcmp" (func $strcmp (param i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "count\00")
  (data (i32.const 8) "set\00")
  (data (i32.const 16) "by\00")
  (func (export "ContractEntry") (param $method i32) (param $args i32) (result i32)
    (local $h i32)
    (if (i32.eqz (call $strcmp (local.get $method) (i32.const 8)))
      (then
        (local.set $h (call $create))
        (call $put_int (local.get $h) (i32.const 0)
          (call $get_int (call $parse (local.get $args)) (i32.const 16)))
        (return (call $store (call $self) (i32.const 0) (call $to_str (local.get $h))))))
    (call $get_int (call $parse (call $load (call $self) (i32.const 0))) (i32.const 0)))
)
"#;

const WALLET_WAT: &str = r#"
(module
  (import "env" "ContractCall" (func $call (param i32 i32 i32 i32) (result i64)))
  (memory (export "memory") 1)
  (data (i32.const 0) "token\00")
  (data (i32.const 8) "balanceOf\00")
  (data (i32.const 24) "string\00")
  (data (i32.const 32) "[{\"index\":0,\"name\":\"addr\",\"paramType\":\"string\",\"value\":\"alice\"}]\00")
  (func (export "aliceBalance") (result i32)
    (i32.wrap_i64 (call $call (i32.const 0) (i32.const 8) (i32.const 32) (i32.const 24))))
)
"#;

struct Chain {
    state: Arc<MemoryChainState>,
    events: Arc<EventBus>,
    invoker: Arc<RuntimeInvoker>,
}

impl Chain {
    fn new(state: MemoryChainState) -> Self {
        let state = Arc::new(state);
        let events = Arc::new(EventBus::new());
        let invoker = RuntimeInvoker::new(
            VmConfig::default(),
            Arc::new(ModuleEnv::new()),
            state.clone(),
            events.clone(),
            Arc::new(GasBudget::unlimited()),
        )
        .unwrap();
        Self {
            state,
            events,
            invoker,
        }
    }

    fn deploy(&self, addr: &str, pattern: ContractPattern, wat: &str) {
        let wasm = wat::parse_str(wat).unwrap();
        self.state
            .deploy_contract(ContractInfo::new(addr, addr, "deployer", pattern, &wasm))
            .unwrap();
    }

    fn call(&self, addr: &str, sender: &str, method: &str, params: Vec<Param>, rtn: ReturnKind) -> ContractValue {
        let result = self.invoker.invoke_contract(addr, sender, method, params, rtn);
        assert!(result.is_success, "{} failed: {:?}", method, result.error);
        result.value
    }
}

fn init_token(chain: &Chain) -> ContractValue {
    let event = r#"[{"index":0,"name":"supply","paramType":"string","value":"1000"}]"#;
    chain.call(
        "token",
        "alice",
        "init",
        vec![Param::string(0, "supply", "1000"), Param::string(1, "event", event)],
        ReturnKind::Int32,
    )
}

#[test]
fn test_token_issuance() {
    let chain = Chain::new(MemoryChainState::new());
    chain.deploy("token", ContractPattern::Pattern1, TOKEN_WAT);

    assert_eq!(init_token(&chain), ContractValue::I32(0));
    assert_eq!(chain.state.currency_info("TOK").unwrap().decimal, 2);
    assert_eq!(chain.state.balance("alice", "TOK").unwrap(), BigUint::from(1000u32));
    assert_eq!(chain.state.currency_contract("TOK").unwrap(), "token");

    let events = chain.events.events_for("token");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].method(), Some("init"));
    assert_eq!(events[0].tags["contract.method.supply"], "1000");

    // currency already exists
    assert_eq!(init_token(&chain), ContractValue::I32(-1));
    assert_eq!(chain.events.events().len(), 1);
}

#[test]
fn test_balance_query() {
    let chain = Chain::new(MemoryChainState::new());
    chain.deploy("token", ContractPattern::Pattern1, TOKEN_WAT);
    init_token(&chain);

    let balance = |addr: &str| {
        chain.call(
            "token",
            "anyone",
            "balanceOf",
            vec![Param::string(0, "addr", addr)],
            ReturnKind::String,
        )
    };
    assert_eq!(balance("alice"), ContractValue::String("1000".to_string()));
    assert_eq!(balance("bob"), ContractValue::String("0".to_string()));
}

#[test]
fn test_nested_call_reads_other_contract() {
    let chain = Chain::new(MemoryChainState::new());
    chain.deploy("token", ContractPattern::Pattern1, TOKEN_WAT);
    chain.deploy("wallet", ContractPattern::Pattern1, WALLET_WAT);
    init_token(&chain);

    assert_eq!(
        chain.call("wallet", "bob", "aliceBalance", vec![], ReturnKind::String),
        ContractValue::String("1000".to_string())
    );

    chain
        .state
        .update_contract_state("token", ContractState::Suspended)
        .unwrap();
    assert_eq!(
        chain.call("wallet", "bob", "aliceBalance", vec![], ReturnKind::Int32),
        ContractValue::I32(-1)
    );
}

#[test]
fn test_counter_persists_between_invocations() {
    let chain = Chain::new(MemoryChainState::new());
    chain.deploy("counter", ContractPattern::Pattern2, COUNTER_WAT);

    let set = chain.call(
        "counter",
        "alice",
        "set",
        vec![Param::string(0, "args", r#"{"by":5}"#)],
        ReturnKind::Int32,
    );
    assert_eq!(set, ContractValue::I32(0));
    assert_eq!(
        chain.state.load_contract_related_object("counter", "count").unwrap(),
        r#"{"count":5}"#
    );

    let get = chain.call("counter", "alice", "get", vec![], ReturnKind::Int32);
    assert_eq!(get, ContractValue::I32(5));
}

#[test]
fn test_contracts_from_genesis() {
    let counter = ContractInfo::new(
        "counter",
        "Counter",
        "genesis-owner",
        ContractPattern::Pattern2,
        &wat::parse_str(COUNTER_WAT).unwrap(),
    );
    let text = Genesis {
        height: 3,
        contracts: vec![counter],
        ..Default::default()
    }
    .to_json()
    .unwrap();

    let genesis = Genesis::from_json(&text).unwrap();
    let chain = Chain::new(MemoryChainState::from_genesis(&genesis).unwrap());
    assert_eq!(chain.state.height(), 3);

    chain.call(
        "counter",
        "alice",
        "set",
        vec![Param::string(0, "args", r#"{"by":"0x20"}"#)],
        ReturnKind::Int32,
    );
    assert_eq!(
        chain.call("counter", "alice", "get", vec![], ReturnKind::Int32),
        ContractValue::I32(32)
    );
}
