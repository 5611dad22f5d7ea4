//! Tests for call chains: ledger replay, retained ledgers, reentrancy and
//! aliases.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use serde_json::Value;
use serde_json::json;

use plugrpc::CallArgs;
use plugrpc::CallId;
use plugrpc::CallResult;
use plugrpc::PluginError;
use plugrun::CallHost;
use plugrun::Config;
use plugrun::MemorySource;
use plugrun::NativePlugin;
use plugrun::Supervisor;

const BANK: &str = include_str!("fixtures/bank.wat");
const SHOP: &str = include_str!("fixtures/shop.wat");

fn supervisor(config: Config) -> Supervisor {
    let source = MemorySource::new().with("bank", BANK).with("shop", SHOP);
    Supervisor::new(config, source).expect("Failed to create supervisor")
}

fn debit(amount: u32) -> CallArgs {
    CallArgs::new("bank", "api", "debit", vec![json!(amount)])
}

fn balance() -> CallArgs {
    CallArgs::new("bank", "api", "balance", vec![])
}

fn pay(amount: u32) -> CallArgs {
    CallArgs::new("shop", "checkout", "pay", vec![json!(amount)])
}

/// Counts how often it actually runs.
#[derive(Clone, Default)]
struct Counter {
    runs: Arc<AtomicUsize>,
}

#[async_trait::async_trait]
impl NativePlugin for Counter {
    async fn call(&self, _host: &CallHost, _intf: &str, _method: &str, _params: Vec<Value>) -> Result<Value, PluginError> {
        Ok(json!(self.runs.fetch_add(1, Ordering::SeqCst) + 1))
    }
}

/// Fails on its first call only.
#[derive(Clone, Default)]
struct Flaky {
    failed_once: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl NativePlugin for Flaky {
    async fn call(&self, host: &CallHost, _intf: &str, _method: &str, _params: Vec<Value>) -> Result<Value, PluginError> {
        if self.failed_once.swap(true, Ordering::SeqCst) {
            Ok(json!("sent"))
        } else {
            Err(PluginError::new(host.service(), "mail server unavailable"))
        }
    }
}

/// Fails until switched up.
#[derive(Clone, Default)]
struct Mail {
    up: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl NativePlugin for Mail {
    async fn call(&self, host: &CallHost, _intf: &str, _method: &str, _params: Vec<Value>) -> Result<Value, PluginError> {
        if self.up.load(Ordering::SeqCst) {
            Ok(json!("sent"))
        } else {
            Err(PluginError::new(host.service(), "mail server unavailable"))
        }
    }
}

/// Charges the counter twice with the same arguments, then sends mail.
struct Orders;

#[async_trait::async_trait]
impl NativePlugin for Orders {
    async fn call(&self, host: &CallHost, _intf: &str, _method: &str, _params: Vec<Value>) -> Result<Value, PluginError> {
        let charge = CallArgs::new("counter", "api", "charge", vec![json!(5)]);
        let first = host.call(charge.clone()).await?;
        let second = host.call(charge).await?;
        let mail = host.call(CallArgs::new("mail", "api", "send", vec![])).await?;
        Ok(json!({ "first": first, "second": second, "mail": mail }))
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["counter".into(), "mail".into()]
    }
}

/// Forwards every call to the service named in its first parameter.
struct Relay;

#[async_trait::async_trait]
impl NativePlugin for Relay {
    async fn call(&self, host: &CallHost, intf: &str, method: &str, params: Vec<Value>) -> Result<Value, PluginError> {
        let target = params.first().and_then(Value::as_str).unwrap_or("whoami").to_string();
        host.call(CallArgs::new(target, intf, method, params[1..].to_vec())).await
    }
}

/// Reports where it sits in the chain.
struct WhoAmI;

#[async_trait::async_trait]
impl NativePlugin for WhoAmI {
    async fn call(&self, host: &CallHost, _intf: &str, _method: &str, _params: Vec<Value>) -> Result<Value, PluginError> {
        Ok(json!({ "service": host.service(), "caller": host.caller(), "depth": host.stack().len() }))
    }
}

// --- Wasm chains ---

#[tokio::test]
async fn test_sub_call_runs_without_ledger() {
    let sup = supervisor(Config::default());

    let (outcome, ledger) = sup.execute(pay(10), Vec::new()).await;
    assert_eq!(outcome.unwrap(), json!(90));
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.results()[0].args, debit(10));
    assert_eq!(ledger.results()[0].result, json!(90));

    assert_eq!(sup.call(balance()).await.unwrap(), json!(90));
}

#[tokio::test]
async fn test_precomputed_sub_call_is_not_executed() {
    let sup = supervisor(Config::default());
    let precomputed = vec![CallResult { id: CallId::generate(), args: debit(10), result: json!(55) }];

    let (outcome, ledger) = sup.execute(pay(10), precomputed).await;
    assert_eq!(outcome.unwrap(), json!(55));
    assert_eq!(ledger.len(), 1);

    // the bank never saw the debit
    assert_eq!(sup.call(balance()).await.unwrap(), json!(100));
}

#[tokio::test]
async fn test_precomputed_with_other_args_is_ignored() {
    let sup = supervisor(Config::default());
    let precomputed = vec![CallResult { id: CallId::generate(), args: debit(99), result: json!(1) }];

    let (outcome, ledger) = sup.execute(pay(10), precomputed).await;
    assert_eq!(outcome.unwrap(), json!(90));
    assert_eq!(ledger.len(), 2);
}

#[tokio::test]
async fn test_sub_call_failure_keeps_its_producer() {
    let sup = supervisor(Config::default());

    let refund = CallArgs::new("shop", "checkout", "refund", vec![json!(10)]);
    let err = sup.call(refund).await.unwrap_err();
    assert_eq!(err.producer, "bank");
}

#[tokio::test]
async fn test_trap_evicts_instance() {
    let sup = supervisor(Config::default());

    assert_eq!(sup.call(debit(10)).await.unwrap(), json!(90));

    let err = sup.call(CallArgs::new("bank", "api", "fail", vec![])).await.unwrap_err();
    assert_eq!(err.producer, "bank");
    assert!(!sup.is_resident("bank"));

    // reloaded from scratch
    assert_eq!(sup.call(balance()).await.unwrap(), json!(100));
}

// --- Native chains ---

#[tokio::test]
async fn test_repeated_sub_call_replayed_within_chain() {
    let sup = supervisor(Config::default());
    let counter = Counter::default();
    sup.register_native("counter", counter.clone());
    sup.register_native("mail", Flaky { failed_once: Arc::new(AtomicBool::new(true)) });
    sup.register_native("orders", Orders);

    let result = sup.call(CallArgs::new("orders", "api", "place", vec![])).await.unwrap();
    assert_eq!(result, json!({ "first": 1, "second": 1, "mail": "sent" }));
    assert_eq!(counter.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_request_retains_ledger_for_retry() {
    let sup = supervisor(Config::default());
    let counter = Counter::default();
    sup.register_native("counter", counter.clone());
    sup.register_native("mail", Flaky::default());
    sup.register_native("orders", Orders);

    let id = CallId::generate();
    let place = CallArgs::new("orders", "api", "place", vec![]);

    let request = plugrpc::build_plugin_call_request(id.clone(), place.clone(), Vec::new());
    let response = sup.handle_request(request).await;
    assert_eq!(response.id, id);
    let err = response.outcome().unwrap_err();
    assert_eq!(err.producer, "mail");
    assert_eq!(sup.retained_count(), 1);

    // the retry resumes from what already succeeded
    let retry = plugrpc::build_plugin_call_request(id.clone(), place, Vec::new());
    let response = sup.handle_request(retry).await;
    assert_eq!(response.outcome().unwrap(), json!({ "first": 1, "second": 1, "mail": "sent" }));
    assert_eq!(counter.runs.load(Ordering::SeqCst), 1);
    assert_eq!(sup.retained_count(), 0);
}

#[tokio::test]
async fn test_failure_before_any_sub_call_retains_nothing() {
    let sup = supervisor(Config::default());
    sup.register_native("mail", Mail::default());

    for _ in 0..16 {
        let send = CallArgs::new("mail", "api", "send", vec![]);
        let request = plugrpc::build_plugin_call_request(CallId::generate(), send, Vec::new());
        assert!(sup.handle_request(request).await.outcome().is_err());

        let nowhere = CallArgs::new("nowhere", "api", "go", vec![]);
        let request = plugrpc::build_plugin_call_request(CallId::generate(), nowhere, Vec::new());
        assert!(sup.handle_request(request).await.outcome().is_err());
    }
    assert_eq!(sup.retained_count(), 0);
}

#[tokio::test]
async fn test_retained_ledgers_are_capped_oldest_first() {
    let sup = supervisor(Config::default().with_max_retained(2));
    let counter = Counter::default();
    let mail = Mail::default();
    sup.register_native("counter", counter.clone());
    sup.register_native("mail", mail.clone());
    sup.register_native("orders", Orders);

    let place = CallArgs::new("orders", "api", "place", vec![]);
    let ids: Vec<CallId> = (0..3).map(|_| CallId::generate()).collect();
    for id in &ids {
        let request = plugrpc::build_plugin_call_request(id.clone(), place.clone(), Vec::new());
        assert!(sup.handle_request(request).await.outcome().is_err());
    }
    assert_eq!(counter.runs.load(Ordering::SeqCst), 3);
    assert_eq!(sup.retained_count(), 2);

    mail.up.store(true, Ordering::SeqCst);

    // the newest ledger survived: nothing is charged again
    let retry = plugrpc::build_plugin_call_request(ids[2].clone(), place.clone(), Vec::new());
    assert_eq!(sup.handle_request(retry).await.outcome().unwrap()["first"], json!(3));
    assert_eq!(counter.runs.load(Ordering::SeqCst), 3);

    // the oldest was dropped: the retry starts over
    let retry = plugrpc::build_plugin_call_request(ids[0].clone(), place, Vec::new());
    assert_eq!(sup.handle_request(retry).await.outcome().unwrap()["first"], json!(4));
    assert_eq!(counter.runs.load(Ordering::SeqCst), 4);
    assert_eq!(sup.retained_count(), 1);
}

#[tokio::test]
async fn test_zero_cap_retains_nothing() {
    let sup = supervisor(Config::default().with_max_retained(0));
    sup.register_native("counter", Counter::default());
    sup.register_native("mail", Mail::default());
    sup.register_native("orders", Orders);

    let place = CallArgs::new("orders", "api", "place", vec![]);
    let request = plugrpc::build_plugin_call_request(CallId::generate(), place, Vec::new());
    assert!(sup.handle_request(request).await.outcome().is_err());
    assert_eq!(sup.retained_count(), 0);
}

#[tokio::test]
async fn test_top_level_call_always_executes() {
    let sup = supervisor(Config::default());
    let counter = Counter::default();
    sup.register_native("counter", counter.clone());

    let charge = CallArgs::new("counter", "api", "charge", vec![]);
    let precomputed = vec![CallResult { id: CallId::generate(), args: charge.clone(), result: json!(999) }];

    let (outcome, _) = sup.execute(charge, precomputed).await;
    assert_eq!(outcome.unwrap(), json!(1));
    assert_eq!(counter.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_reentrant_call_rejected() {
    let sup = supervisor(Config::default());
    sup.register_native("relay", Relay);

    // relay -> relay
    let args = CallArgs::new("relay", "api", "go", vec![json!("relay"), json!("whoami")]);
    let err = sup.call(args).await.unwrap_err();
    assert_eq!(err.producer, "supervisor");
    assert!(err.message.contains("re-enter"), "unexpected message: {}", err.message);
}

#[tokio::test]
async fn test_caller_is_visible_to_callee() {
    let sup = supervisor(Config::default());
    sup.register_native("relay", Relay);
    sup.register_native("whoami", WhoAmI);

    let direct = sup.call(CallArgs::new("whoami", "api", "ask", vec![])).await.unwrap();
    assert_eq!(direct, json!({ "service": "whoami", "caller": null, "depth": 1 }));

    let relayed = sup.call(CallArgs::new("relay", "api", "ask", vec![json!("whoami")])).await.unwrap();
    assert_eq!(relayed, json!({ "service": "whoami", "caller": "relay", "depth": 2 }));
}

#[tokio::test]
async fn test_alias_redirects_calls() {
    let sup = supervisor(Config::default().with_alias("payments", "bank"));

    let args = CallArgs::new("payments", "api", "debit", vec![json!(30)]);
    assert_eq!(sup.call(args).await.unwrap(), json!(70));
    assert!(sup.is_resident("bank"));
    assert!(!sup.is_resident("payments"));
}

#[tokio::test]
async fn test_native_dependencies_are_preloaded() {
    let sup = supervisor(Config::default());
    sup.register_native("orders", Orders);

    let report = sup.preload(vec!["orders".into()]).await.unwrap();
    assert_eq!(report.loaded, vec!["orders".to_string()]);
    let mut failed: Vec<&str> = report.failed.iter().map(|(s, _)| s.as_str()).collect();
    failed.sort();
    assert_eq!(failed, vec!["counter", "mail"]);
}
