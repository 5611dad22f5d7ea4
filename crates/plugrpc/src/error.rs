//! # Error Definitions
//!
//! Two kinds of failure live here. `Error` is the wire layer failing to encode a
//! message. `PluginError` is a *remote* failure: a plugin (or the supervisor on
//! its behalf) could not produce a result, and says so inside a normal response.

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

/// Operational failures within the wire layer itself.
#[derive(Debug, Clone)]
pub enum Error {
    /// The message could not be turned into JSON.
    Serialization(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Serialization(msg) => write!(f, "serialization failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// The key under which a failure is carried in a response's `result`.
const PLUGIN_ERROR_KEY: &str = "pluginError";

/// A failed call, as seen by the caller.
///
/// `producer` names the service that failed. When the supervisor itself gives
/// up (unknown service, bad arguments) the producer is `"supervisor"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginError {
    pub producer: String,
    pub message: String,
}

impl PluginError {
    pub fn new(producer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            producer: producer.into(),
            message: message.into(),
        }
    }

    /// Wraps this error as the `result` of a response.
    pub fn to_result(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(PLUGIN_ERROR_KEY.to_string(), serde_json::json!({
            "producer": self.producer,
            "message": self.message,
        }));
        Value::Object(map)
    }

    /// Recognizes a `result` produced by [`PluginError::to_result`].
    ///
    /// Only an object with exactly one `pluginError` key holding a well-formed
    /// error matches; every other value is an ordinary result.
    pub fn from_result(value: &Value) -> Option<Self> {
        let Value::Object(map) = value else { return None };
        if map.len() != 1 {
            return None;
        }
        let inner = map.get(PLUGIN_ERROR_KEY)?;
        PluginError::deserialize(inner).ok()
    }
}

impl std::fmt::Display for PluginError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.producer, self.message)
    }
}

impl std::error::Error for PluginError {}
