//! # Key-Value plugin
//!
//! A built-in native plugin holding an in-memory map from string keys to JSON
//! values. Register it like any other plugin:
//! `supervisor.register_native("kv", KvPlugin::new())`.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use plugrpc::PluginError;

use crate::plugin::CallHost;
use crate::plugin::NativePlugin;

#[derive(Clone, Debug, Default)]
pub struct KvPlugin {
    store: Arc<DashMap<String, Value>>,
}

impl KvPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one entry, for inspection.
    pub fn peek(&self, key: &str) -> Option<Value> {
        self.store.get(key).map(|entry| entry.value().clone())
    }
}

fn key_param(host: &CallHost, params: &[Value], index: usize) -> Result<String, PluginError> {
    params
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| PluginError::new(host.service(), format!("parameter {} must be a string key", index)))
}

#[async_trait::async_trait]
impl NativePlugin for KvPlugin {
    async fn call(
        &self,
        host: &CallHost,
        _intf: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, PluginError> {
        match method {
            "get" => {
                let key = key_param(host, &params, 0)?;
                Ok(self.peek(&key).unwrap_or(Value::Null))
            }
            "set" => {
                let key = key_param(host, &params, 0)?;
                let value = params.get(1).cloned().unwrap_or(Value::Null);
                self.store.insert(key, value);
                Ok(Value::Null)
            }
            "delete" => {
                let key = key_param(host, &params, 0)?;
                Ok(Value::Bool(self.store.remove(&key).is_some()))
            }
            "keys" => {
                let mut keys: Vec<String> = self.store.iter().map(|entry| entry.key().clone()).collect();
                keys.sort();
                Ok(Value::from(keys))
            }
            other => Err(PluginError::new(host.service(), format!("unknown method '{}'", other))),
        }
    }
}
