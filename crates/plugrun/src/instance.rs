//! # Wasm Plugin Instances
//!
//! A thread-safe handle to one instantiated plugin component. The store and
//! instance sit behind an async mutex, so calls into one plugin run one at a
//! time while calls into different plugins proceed concurrently.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;
use wasmtime::Store;
use wasmtime::component::Instance;
use wasmtime::component::Val;

use plugrpc::PluginError;

use crate::codec;
use crate::context::PluginCtx;
use crate::loader;
use crate::plugin::CallHost;
use crate::schema::Surface;

#[derive(Debug)]
pub enum Error {
    InterfaceNotFound { service: String, intf: String },
    MethodNotFound { service: String, intf: String, method: String },
    /// The instance stayed busy in another call chain.
    Busy { service: String },
    /// Params or results did not fit the function's signature.
    Codec(codec::Error),
    /// The guest trapped, or a host function it called failed.
    Trap(wasmtime::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InterfaceNotFound { service, intf } => {
                write!(f, "{} does not export interface '{}'", service, intf)
            }
            Self::MethodNotFound { service, intf, method } => {
                write!(f, "{} has no method '{}' in interface '{}'", service, method, intf)
            }
            Self::Busy { service } => write!(f, "{} is busy in another call chain", service),
            Self::Codec(e) => write!(f, "invalid value: {}", e),
            Self::Trap(e) => write!(f, "plugin trapped: {:#}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<codec::Error> for Error {
    fn from(e: codec::Error) -> Self {
        Self::Codec(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True if the instance can no longer be trusted.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap(_))
    }

    /// The failure as the caller should see it.
    ///
    /// A trap caused by a failed sub-call reports the sub-call's failure, so
    /// the producer names the plugin that actually failed.
    pub fn into_plugin_error(self, service: &str) -> PluginError {
        match self {
            Self::Trap(e) => match e.downcast_ref::<PluginError>() {
                Some(cause) => cause.clone(),
                None => PluginError::new(service, format!("plugin trapped: {:#}", e)),
            },
            other => PluginError::new(service, other.to_string()),
        }
    }
}

#[derive(Clone)]
pub struct WasmPlugin {
    service: String,
    description: Arc<loader::Component>,
    surface: Arc<Surface>,
    component: wasmtime::component::Component,
    inner: Arc<Mutex<State>>,
}

pub(crate) struct State {
    pub store: Store<PluginCtx>,
    pub instance: Instance,
}

impl WasmPlugin {
    pub(crate) fn new(
        description: loader::Component,
        surface: Surface,
        component: wasmtime::component::Component,
        store: Store<PluginCtx>,
        instance: Instance,
    ) -> Self {
        Self {
            service: description.name.clone(),
            description: Arc::new(description),
            surface: Arc::new(surface),
            component,
            inner: Arc::new(Mutex::new(State { store, instance })),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn description(&self) -> &loader::Component {
        &self.description
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub(crate) fn same_instance(&self, other: &WasmPlugin) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Calls `method` of the exported interface `intf` with JSON params.
    ///
    /// `host` is installed in the store for the duration of the call so the
    /// plugin's own imports can issue sub-calls within the same chain.
    pub async fn call(&self, intf: &str, method: &str, params: Vec<Value>, host: CallHost) -> Result<Value> {
        let not_found = || Error::MethodNotFound {
            service: self.service.clone(),
            intf: intf.to_string(),
            method: method.to_string(),
        };

        let (export_name, schema) = self.surface.find_export(intf).ok_or_else(|| Error::InterfaceNotFound {
            service: self.service.clone(),
            intf: intf.to_string(),
        })?;
        let sig = schema.funcs.get(method).ok_or_else(not_found)?;
        let args = codec::params_to_vals(&params, &sig.params)?;

        let inst_idx = self
            .component
            .get_export_index(None, export_name)
            .ok_or_else(not_found)?;
        let func_idx = self
            .component
            .get_export_index(Some(&inst_idx), method)
            .ok_or_else(not_found)?;

        let mut guard = match host.busy_timeout() {
            None => self.inner.lock().await,
            Some(limit) => tokio::time::timeout(limit, self.inner.lock())
                .await
                .map_err(|_| {
                    tracing::warn!(service = %self.service, caller = ?host.caller(), "instance busy in another call chain");
                    Error::Busy { service: self.service.clone() }
                })?,
        };
        let State { store, instance } = &mut *guard;

        let func = instance.get_func(&mut *store, &func_idx).ok_or_else(not_found)?;
        let mut results = vec![Val::Bool(false); sig.results.len()];

        store.data_mut().host = Some(host);
        let outcome = async {
            func.call_async(&mut *store, &args, &mut results).await?;
            func.post_return_async(&mut *store).await
        }
        .await;
        store.data_mut().host = None;

        outcome.map_err(Error::Trap)?;
        Ok(codec::vals_to_result(&results)?)
    }
}
