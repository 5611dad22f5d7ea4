//! # Plugins and the Call Host
//!
//! A plugin is either a wasm component instance or a native Rust
//! implementation. Both receive a [`CallHost`] for the duration of a call: the
//! only way a plugin can reach another plugin.
//!
//! ## Call chain rules
//! - **Ledger First**: A sub-call whose arguments already appear in the chain's
//!   ledger is answered from it without executing.
//! - **No Reentrancy**: A service already on the chain's stack cannot be called
//!   again within that chain. Each instance runs one call at a time.
//! - **Bounded Waits**: A sub-call gives up on an instance that stays busy in
//!   another chain, so two chains calling into each other fail instead of
//!   holding both instances forever.
//! - **Aliases**: Service names are redirected through the configured alias
//!   table before anything else happens.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;

use plugrpc::CallArgs;
use plugrpc::CallId;
use plugrpc::PluginError;

use crate::instance::WasmPlugin;
use crate::ledger::Ledger;
use crate::supervisor::SUPERVISOR;
use crate::supervisor::Supervisor;

/// A plugin implemented in Rust and registered under a service name.
#[async_trait::async_trait]
pub trait NativePlugin: Send + Sync + 'static {
    async fn call(
        &self,
        host: &CallHost,
        intf: &str,
        method: &str,
        params: Vec<Value>,
    ) -> Result<Value, PluginError>;

    /// Services this plugin calls into, warmed with it during a preload.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }
}

/// A resident plugin.
#[derive(Clone)]
pub enum Plugin {
    Wasm(WasmPlugin),
    Native(Arc<dyn NativePlugin>),
}

impl Plugin {
    pub(crate) fn dependencies(&self, host_namespaces: &[String]) -> Vec<String> {
        match self {
            Self::Wasm(plugin) => plugin.description().dependencies(host_namespaces),
            Self::Native(plugin) => plugin.dependencies(),
        }
    }

    pub fn is_wasm(&self) -> bool {
        matches!(self, Self::Wasm(_))
    }
}

/// A plugin's handle on the call chain it is executing in.
#[derive(Clone)]
pub struct CallHost {
    supervisor: Supervisor,
    ledger: Arc<Mutex<Ledger>>,
    stack: Vec<String>,
}

impl CallHost {
    pub(crate) fn root(supervisor: Supervisor, ledger: Arc<Mutex<Ledger>>, service: &str) -> Self {
        Self {
            supervisor,
            ledger,
            stack: vec![service.to_string()],
        }
    }

    /// The service currently executing.
    pub fn service(&self) -> &str {
        self.stack.last().map(String::as_str).unwrap_or(SUPERVISOR)
    }

    /// The service that called the current one. `None` for a call that came
    /// straight from an application frame.
    pub fn caller(&self) -> Option<&str> {
        let len = self.stack.len();
        if len < 2 {
            return None;
        }
        Some(self.stack[len - 2].as_str())
    }

    /// Services on the chain, outermost first.
    pub fn stack(&self) -> &[String] {
        &self.stack
    }

    /// How long this call may wait for a plugin instance that another chain
    /// is using. `None` for a call straight from a frame: it holds no
    /// instance, so waiting cannot close a cycle.
    pub(crate) fn busy_timeout(&self) -> Option<Duration> {
        if self.stack.len() < 2 {
            return None;
        }
        Some(self.supervisor.config().busy_timeout)
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        // the ledger is never left half-written, so a poisoned lock is still usable
        self.ledger.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issues a sub-call on behalf of the current service.
    pub fn call(&self, mut args: CallArgs) -> BoxFuture<'static, Result<Value, PluginError>> {
        let this = self.clone();
        async move {
            args.service = this.supervisor.config().resolve_alias(&args.service).to_string();

            let replayed = this.ledger().lookup(&args).map(|entry| entry.result.clone());
            if let Some(hit) = replayed {
                tracing::debug!(
                    caller = %this.service(), service = %args.service, intf = %args.intf, method = %args.method,
                    "sub-call replayed from ledger"
                );
                return Ok(hit);
            }

            if this.stack.iter().any(|s| *s == args.service) {
                return Err(PluginError::new(
                    SUPERVISOR,
                    format!("{} may not re-enter {} within one call chain", this.service(), args.service),
                ));
            }

            let mut nested = this.clone();
            nested.stack.push(args.service.clone());

            let result = this.supervisor.dispatch(args.clone(), nested).await?;
            this.ledger().record(CallId::generate(), args, result.clone());
            Ok(result)
        }
        .boxed()
    }
}
