//! # Protocol Messages
//!
//! The closed set of messages exchanged between frames, and the rules for
//! recognizing them from untrusted JSON.
//!
//! ## Invariants
//! - **Closed Set**: The `type` field selects exactly one variant. Any other
//!   discriminant, a missing one, or a payload that does not fit its variant
//!   recognizes as [`Message::Unknown`].
//! - **Strict Shape**: Payloads reject unknown fields and wrongly typed fields.
//!   The one exception is `precomputedResults`, which degrades to an empty ledger.
//! - **Panic Safety**: Recognition never fails; it only returns `Unknown`.

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;

use crate::error::PluginError;
use crate::error::Result;
use crate::id::CallId;

pub const PLUGIN_CALL_REQUEST: &str = "PLUGIN_CALL_REQUEST";
pub const PLUGIN_CALL_RESPONSE: &str = "PLUGIN_CALL_RESPONSE";
pub const PRE_LOAD_SERVICES_REQUEST: &str = "PRE_LOAD_SERVICES_REQUEST";
pub const I_FRAME_INITIALIZED: &str = "I_FRAME_INITIALIZED";

/// Identifies a target capability and its arguments.
///
/// Equality is structural over all four fields, which is what the ledger
/// relies on to recognize a repeated sub-call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallArgs {
    pub service: String,
    pub intf: String,
    pub method: String,
    pub params: Vec<Value>,
}

impl CallArgs {
    pub fn new(
        service: impl Into<String>,
        intf: impl Into<String>,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Self {
        Self {
            service: service.into(),
            intf: intf.into(),
            method: method.into(),
            params,
        }
    }
}

impl std::fmt::Display for CallArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}.{}", self.service, self.intf, self.method)
    }
}

/// The record of a completed sub-call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallResult {
    pub id: CallId,
    pub args: CallArgs,
    pub result: Value,
}

/// Asks a frame to execute a call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct CallRequest {
    pub id: CallId,
    pub args: CallArgs,
    #[serde(default, deserialize_with = "lenient_ledger")]
    pub precomputed_results: Vec<CallResult>,
}

/// Answers exactly one `CallRequest`, matched by `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CallResponse {
    pub id: CallId,
    pub result: Value,
}

impl CallResponse {
    /// Splits the result into success or the failure it carries.
    pub fn outcome(self) -> std::result::Result<Value, PluginError> {
        match PluginError::from_result(&self.result) {
            Some(err) => Err(err),
            None => Ok(self.result),
        }
    }
}

/// Hint to warm the named services. No response is sent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreloadRequest {
    pub services: Vec<String>,
}

/// A frame finished bootstrapping and accepts requests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameReady {}

/// Every message that may cross a frame boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "PLUGIN_CALL_REQUEST")]
    PluginCallRequest(CallRequest),
    #[serde(rename = "PLUGIN_CALL_RESPONSE")]
    PluginCallResponse(CallResponse),
    #[serde(rename = "PRE_LOAD_SERVICES_REQUEST")]
    PreLoadServicesRequest(PreloadRequest),
    #[serde(rename = "I_FRAME_INITIALIZED")]
    FrameInitialized(FrameReady),
    /// Anything else. Handlers ignore it.
    #[serde(other)]
    Unknown,
}

impl Message {
    /// Recognizes a message from an arbitrary JSON value.
    pub fn recognize(value: &Value) -> Self {
        Message::deserialize(value).unwrap_or(Message::Unknown)
    }

    /// Recognizes a message from raw transport bytes.
    pub fn from_slice(bytes: &[u8]) -> Self {
        serde_json::from_slice(bytes).unwrap_or(Message::Unknown)
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// The `type` literal of this message, if it has one.
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            Self::PluginCallRequest(_) => Some(PLUGIN_CALL_REQUEST),
            Self::PluginCallResponse(_) => Some(PLUGIN_CALL_RESPONSE),
            Self::PreLoadServicesRequest(_) => Some(PRE_LOAD_SERVICES_REQUEST),
            Self::FrameInitialized(_) => Some(I_FRAME_INITIALIZED),
            Self::Unknown => None,
        }
    }
}

impl From<CallRequest> for Message {
    fn from(m: CallRequest) -> Self {
        Self::PluginCallRequest(m)
    }
}

impl From<CallResponse> for Message {
    fn from(m: CallResponse) -> Self {
        Self::PluginCallResponse(m)
    }
}

impl From<PreloadRequest> for Message {
    fn from(m: PreloadRequest) -> Self {
        Self::PreLoadServicesRequest(m)
    }
}

impl From<FrameReady> for Message {
    fn from(m: FrameReady) -> Self {
        Self::FrameInitialized(m)
    }
}

/// A ledger that fails to parse is replaced by an empty one: the request is
/// then executed fresh instead of being rejected.
fn lenient_ledger<'de, D>(deserializer: D) -> std::result::Result<Vec<CallResult>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(Vec::<CallResult>::deserialize(&raw).unwrap_or_default())
}

// ============================================================================
//  RECOGNIZERS
// ============================================================================

pub fn is_plugin_call_request(value: &Value) -> bool {
    matches!(Message::recognize(value), Message::PluginCallRequest(_))
}

pub fn is_plugin_call_response(value: &Value) -> bool {
    matches!(Message::recognize(value), Message::PluginCallResponse(_))
}

pub fn is_pre_load_services_request(value: &Value) -> bool {
    matches!(Message::recognize(value), Message::PreLoadServicesRequest(_))
}

pub fn is_frame_initialized(value: &Value) -> bool {
    matches!(Message::recognize(value), Message::FrameInitialized(_))
}

// ============================================================================
//  BUILDERS
// ============================================================================

pub fn build_plugin_call_request(
    id: CallId,
    args: CallArgs,
    precomputed_results: Vec<CallResult>,
) -> CallRequest {
    CallRequest { id, args, precomputed_results }
}

pub fn build_plugin_call_response(
    id: CallId,
    outcome: std::result::Result<Value, PluginError>,
) -> CallResponse {
    let result = match outcome {
        Ok(value) => value,
        Err(err) => err.to_result(),
    };
    CallResponse { id, result }
}

pub fn build_pre_load_services_request(services: Vec<String>) -> PreloadRequest {
    PreloadRequest { services }
}

pub fn build_frame_initialized() -> FrameReady {
    FrameReady {}
}
