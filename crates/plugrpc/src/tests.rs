use std::collections::HashSet;

use serde_json::Value;
use serde_json::json;

use crate::*;

fn request_json() -> Value {
    json!({
        "type": "PLUGIN_CALL_REQUEST",
        "id": "0123456789abcdef0123456789abcdef",
        "args": {
            "service": "accounts",
            "intf": "api",
            "method": "get-balance",
            "params": ["alice", 3]
        },
        "precomputedResults": []
    })
}

fn response_json() -> Value {
    json!({
        "type": "PLUGIN_CALL_RESPONSE",
        "id": "0123456789abcdef0123456789abcdef",
        "result": { "balance": 10 }
    })
}

// ============================================================================
//  RECOGNIZERS
// ============================================================================

#[test]
fn test_recognizers_accept_their_own_variant() {
    assert!(is_plugin_call_request(&request_json()));
    assert!(is_plugin_call_response(&response_json()));
    assert!(is_pre_load_services_request(&json!({
        "type": "PRE_LOAD_SERVICES_REQUEST",
        "services": ["accounts", "tokens"]
    })));
    assert!(is_frame_initialized(&json!({ "type": "I_FRAME_INITIALIZED" })));
}

#[test]
fn test_recognizers_reject_other_variants() {
    let request = request_json();
    let response = response_json();

    assert!(!is_plugin_call_response(&request));
    assert!(!is_pre_load_services_request(&request));
    assert!(!is_frame_initialized(&request));

    assert!(!is_plugin_call_request(&response));
    assert!(!is_pre_load_services_request(&response));
    assert!(!is_frame_initialized(&response));
}

#[test]
fn test_recognizers_reject_missing_type() {
    let mut value = request_json();
    value.as_object_mut().unwrap().remove("type");
    assert!(!is_plugin_call_request(&value));
    assert_eq!(Message::recognize(&value), Message::Unknown);
}

#[test]
fn test_recognizers_reject_unknown_type() {
    let mut value = response_json();
    value["type"] = json!("PLUGIN_CALL_RESPONSE_V2");
    assert!(!is_plugin_call_response(&value));
    assert_eq!(Message::recognize(&value), Message::Unknown);
}

#[test]
fn test_recognizers_reject_wrong_id_type() {
    let mut value = response_json();
    value["id"] = json!(42);
    assert!(!is_plugin_call_response(&value));

    let mut value = request_json();
    value["id"] = Value::Null;
    assert!(!is_plugin_call_request(&value));
}

#[test]
fn test_recognizers_reject_extra_fields() {
    let mut value = response_json();
    value["extra"] = json!(true);
    assert!(!is_plugin_call_response(&value));

    let mut value = request_json();
    value["args"]["timeout"] = json!(5);
    assert!(!is_plugin_call_request(&value));

    assert!(!is_frame_initialized(&json!({ "type": "I_FRAME_INITIALIZED", "ready": true })));
}

#[test]
fn test_recognizers_reject_missing_fields() {
    let mut value = response_json();
    value.as_object_mut().unwrap().remove("result");
    assert!(!is_plugin_call_response(&value));

    let mut value = request_json();
    value["args"].as_object_mut().unwrap().remove("method");
    assert!(!is_plugin_call_request(&value));

    assert!(!is_pre_load_services_request(&json!({ "type": "PRE_LOAD_SERVICES_REQUEST" })));
}

#[test]
fn test_recognizers_reject_non_objects() {
    for value in [Value::Null, json!(1), json!("PLUGIN_CALL_REQUEST"), json!([request_json()])] {
        assert!(!is_plugin_call_request(&value));
        assert!(!is_plugin_call_response(&value));
        assert!(!is_pre_load_services_request(&value));
        assert!(!is_frame_initialized(&value));
    }
}

#[test]
fn test_from_slice_never_fails() {
    assert_eq!(Message::from_slice(b""), Message::Unknown);
    assert_eq!(Message::from_slice(b"{not json"), Message::Unknown);
    assert_eq!(Message::from_slice(&[0xff, 0x00, 0x12]), Message::Unknown);

    let bytes = serde_json::to_vec(&response_json()).unwrap();
    assert!(matches!(Message::from_slice(&bytes), Message::PluginCallResponse(_)));
}

// ============================================================================
//  PRECOMPUTED RESULTS
// ============================================================================

#[test]
fn test_missing_ledger_defaults_to_empty() {
    let mut value = request_json();
    value.as_object_mut().unwrap().remove("precomputedResults");

    let Message::PluginCallRequest(req) = Message::recognize(&value) else {
        panic!("expected a call request");
    };
    assert!(req.precomputed_results.is_empty());
}

#[test]
fn test_malformed_ledger_is_treated_as_fresh() {
    for bad in [json!("oops"), json!(7), json!([{ "id": "x" }]), json!([{ "args": 1, "id": "x", "result": 0 }])] {
        let mut value = request_json();
        value["precomputedResults"] = bad;

        let Message::PluginCallRequest(req) = Message::recognize(&value) else {
            panic!("a bad ledger must not reject the request");
        };
        assert!(req.precomputed_results.is_empty());
    }
}

#[test]
fn test_well_formed_ledger_is_kept_in_order() {
    let mut value = request_json();
    value["precomputedResults"] = json!([
        { "id": "a", "args": { "service": "bank", "intf": "api", "method": "debit", "params": [5] }, "result": true },
        { "id": "b", "args": { "service": "mail", "intf": "api", "method": "send", "params": [] }, "result": null }
    ]);

    let Message::PluginCallRequest(req) = Message::recognize(&value) else {
        panic!("expected a call request");
    };
    assert_eq!(req.precomputed_results.len(), 2);
    assert_eq!(req.precomputed_results[0].args.method, "debit");
    assert_eq!(req.precomputed_results[1].id.as_str(), "b");
}

// ============================================================================
//  BUILDERS
// ============================================================================

#[test]
fn test_built_request_shape() {
    let id = CallId::from("00000000000000000000000000000001");
    let args = CallArgs::new("accounts", "api", "get-balance", vec![json!("alice")]);
    let msg: Message = build_plugin_call_request(id, args, Vec::new()).into();

    assert_eq!(msg.to_value().unwrap(), json!({
        "type": "PLUGIN_CALL_REQUEST",
        "id": "00000000000000000000000000000001",
        "args": { "service": "accounts", "intf": "api", "method": "get-balance", "params": ["alice"] },
        "precomputedResults": []
    }));
    assert_eq!(msg.kind(), Some(PLUGIN_CALL_REQUEST));
}

#[test]
fn test_built_messages_are_recognized() {
    let id = CallId::generate();
    let args = CallArgs::new("tokens", "queries", "supply", vec![]);

    let req: Message = build_plugin_call_request(id.clone(), args, Vec::new()).into();
    assert!(is_plugin_call_request(&req.to_value().unwrap()));

    let res: Message = build_plugin_call_response(id, Ok(json!(21))).into();
    assert!(is_plugin_call_response(&res.to_value().unwrap()));

    let pre: Message = build_pre_load_services_request(vec!["tokens".into()]).into();
    assert!(is_pre_load_services_request(&pre.to_value().unwrap()));

    let ready: Message = build_frame_initialized().into();
    assert_eq!(ready.to_value().unwrap(), json!({ "type": "I_FRAME_INITIALIZED" }));
}

// ============================================================================
//  ERROR PAYLOAD
// ============================================================================

#[test]
fn test_error_payload_shape() {
    let err = PluginError::new("bank", "insufficient funds");
    assert_eq!(err.to_result(), json!({
        "pluginError": { "producer": "bank", "message": "insufficient funds" }
    }));
    assert_eq!(err.to_string(), "bank: insufficient funds");
}

#[test]
fn test_error_response_outcome() {
    let id = CallId::generate();
    let err = PluginError::new("bank", "trapped");
    let response = build_plugin_call_response(id, Err(err.clone()));
    assert_eq!(response.outcome(), Err(err));
}

#[test]
fn test_lookalike_results_are_ordinary() {
    let extra_key = json!({
        "pluginError": { "producer": "bank", "message": "x" },
        "balance": 3
    });
    assert!(PluginError::from_result(&extra_key).is_none());

    let wrong_inner = json!({ "pluginError": "bank exploded" });
    assert!(PluginError::from_result(&wrong_inner).is_none());

    let id = CallId::generate();
    let response = build_plugin_call_response(id, Ok(extra_key.clone()));
    assert_eq!(response.outcome(), Ok(extra_key));
}

// ============================================================================
//  CORRELATION IDS
// ============================================================================

#[test]
fn test_generated_ids_are_well_formed() {
    for _ in 0..100 {
        let id = CallId::generate();
        assert_eq!(id.as_str().len(), CallId::LEN);
        assert!(id.is_well_formed(), "bad id: {}", id);
    }
    assert!(!CallId::from("ABCDEF").is_well_formed());
}

#[test]
fn test_generated_ids_do_not_collide() {
    let ids: HashSet<CallId> = (0..10_000).map(|_| CallId::generate()).collect();
    assert_eq!(ids.len(), 10_000);
}
