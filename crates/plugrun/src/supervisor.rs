//! # Supervisor
//!
//! The mediating context that owns every resident plugin. It answers call
//! requests arriving over transports, loads plugins on demand, executes call
//! chains against the precomputed-result ledger, and warms services on
//! request.
//!
//! ## Lifecycle
//!
//! `Supervisor::new` creates an empty supervisor, `serve` attaches it to a
//! transport (announcing readiness first), and `shutdown` detaches it from all
//! transports and drops its plugins and cache.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::task::JoinHandle;

use plugrpc::CallArgs;
use plugrpc::CallId;
use plugrpc::CallRequest;
use plugrpc::CallResponse;
use plugrpc::CallResult;
use plugrpc::Message;
use plugrpc::PluginError;

use crate::builder::PluginBuilder;
use crate::cache::CallCache;
use crate::config::Config;
use crate::ledger::Ledger;
use crate::loader;
use crate::loader::ComponentLoader;
use crate::plugin::CallHost;
use crate::plugin::NativePlugin;
use crate::plugin::Plugin;
use crate::preload;
use crate::preload::PreloadReport;
use crate::source;
use crate::source::PluginSource;
use crate::transport;
use crate::transport::Transport;

/// Producer named in failures the supervisor reports on a plugin's behalf.
pub const SUPERVISOR: &str = "supervisor";

#[derive(Debug)]
pub enum Error {
    Engine(wasmtime::Error),
    /// The name belongs to a host namespace, not to a plugin.
    HostService(String),
    Source(source::Error),
    Load(loader::Error),
    Build(crate::builder::Error),
    Transport(transport::Error),
    Wire(plugrpc::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "Engine error: {}", e),
            Self::HostService(name) => write!(f, "'{}' is served by the host and is not a plugin", name),
            Self::Source(e) => write!(f, "{}", e),
            Self::Load(e) => write!(f, "{}", e),
            Self::Build(e) => write!(f, "{}", e),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<source::Error> for Error {
    fn from(e: source::Error) -> Self {
        Self::Source(e)
    }
}

impl From<loader::Error> for Error {
    fn from(e: loader::Error) -> Self {
        Self::Load(e)
    }
}

impl From<crate::builder::Error> for Error {
    fn from(e: crate::builder::Error) -> Self {
        Self::Build(e)
    }
}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<plugrpc::Error> for Error {
    fn from(e: plugrpc::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shared handle to one supervisor. Clones refer to the same state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    loader: ComponentLoader,
    source: Arc<dyn PluginSource>,
    cache: CallCache,
    /// Compiled components by content identity, so a reload skips compilation.
    compiled: DashMap<String, wasmtime::component::Component>,
    plugins: DashMap<String, Plugin>,
    loading: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Ledgers of failed top-level calls, by request id, with the order they
    /// were retained in.
    retained: DashMap<CallId, (Ledger, u64)>,
    retained_seq: AtomicU64,
    serving: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    pub fn new(config: Config, source: impl PluginSource) -> Result<Self> {
        let mut engine_config = wasmtime::Config::new();
        engine_config.async_support(true);
        engine_config.wasm_component_model(true);
        let engine = wasmtime::Engine::new(&engine_config).map_err(Error::Engine)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                loader: ComponentLoader::with_engine(engine),
                source: Arc::new(source),
                cache: CallCache::new(),
                compiled: DashMap::new(),
                plugins: DashMap::new(),
                loading: DashMap::new(),
                retained: DashMap::new(),
                retained_seq: AtomicU64::new(0),
                serving: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn cache(&self) -> &CallCache {
        &self.inner.cache
    }

    pub fn loader(&self) -> &ComponentLoader {
        &self.inner.loader
    }

    /// Makes `plugin` resident under `service`, replacing any previous one.
    pub fn register_native(&self, service: impl Into<String>, plugin: impl NativePlugin) {
        let service = service.into();
        tracing::info!(service = %service, "native plugin registered");
        self.inner.plugins.insert(service, Plugin::Native(Arc::new(plugin)));
    }

    pub fn is_resident(&self, service: &str) -> bool {
        self.inner.plugins.contains_key(service)
    }

    /// Number of failed calls whose ledgers are kept for a retry.
    pub fn retained_count(&self) -> usize {
        self.inner.retained.len()
    }

    /// Describes the wasm plugin behind `service`, loading it if needed.
    /// Native plugins have no description.
    pub async fn describe(&self, service: &str) -> Result<Option<loader::Component>> {
        match self.resolve(service).await? {
            Plugin::Wasm(plugin) => Ok(Some(plugin.description().clone())),
            Plugin::Native(_) => Ok(None),
        }
    }

    /// Returns the resident plugin for `service`, loading it on first use.
    ///
    /// Concurrent first uses of one service share a single load. A failed load
    /// is not remembered: the next use tries again.
    pub async fn resolve(&self, service: &str) -> Result<Plugin> {
        if self.inner.config.is_host_namespace(service) {
            return Err(Error::HostService(service.to_string()));
        }
        if let Some(plugin) = self.resident(service) {
            return Ok(plugin);
        }

        let lock = self
            .inner
            .loading
            .entry(service.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        if let Some(plugin) = self.resident(service) {
            return Ok(plugin);
        }

        let plugin = match self.load(service).await {
            Ok(plugin) => plugin,
            Err(e) => {
                self.inner.loading.remove(service);
                return Err(e);
            }
        };
        // resident before the lock goes, so a late arrival cannot load twice
        self.inner.plugins.insert(service.to_string(), plugin.clone());
        self.inner.loading.remove(service);
        Ok(plugin)
    }

    fn resident(&self, service: &str) -> Option<Plugin> {
        self.inner.plugins.get(service).map(|entry| entry.value().clone())
    }

    async fn load(&self, service: &str) -> Result<Plugin> {
        let bytes = self.inner.source.fetch(service).await?;
        let key = loader::Component::cache_key(service, &bytes);

        let cached = self.inner.cache.fetch::<loader::Component>(&key).ok().flatten();
        let compiled = self.inner.compiled.get(&key).map(|entry| entry.value().clone());
        let (description, component) = match (cached, compiled) {
            (Some(description), Some(component)) => (description, component),
            _ => {
                let (description, component) = self.inner.loader.compile(service, &bytes)?;
                if let Err(e) = self.inner.cache.put(key.clone(), &description) {
                    tracing::warn!(service, error = %e, "component description not cached");
                }
                self.inner.compiled.insert(key, component.clone());
                (description, component)
            }
        };

        let plugin = PluginBuilder::new(&self.inner.config, description, component)
            .instantiate()
            .await?;
        tracing::info!(
            service,
            imports = plugin.description().imports.len(),
            exports = plugin.description().exports.len(),
            "plugin loaded"
        );
        Ok(Plugin::Wasm(plugin))
    }

    /// Runs one call against its resident plugin.
    pub(crate) fn dispatch(&self, args: CallArgs, host: CallHost) -> BoxFuture<'static, std::result::Result<Value, PluginError>> {
        let this = self.clone();
        async move {
            let plugin = this
                .resolve(&args.service)
                .await
                .map_err(|e| PluginError::new(SUPERVISOR, e.to_string()))?;

            match plugin {
                Plugin::Native(native) => native.call(&host, &args.intf, &args.method, args.params).await,
                Plugin::Wasm(wasm) => {
                    match wasm.call(&args.intf, &args.method, args.params, host).await {
                        Ok(value) => Ok(value),
                        Err(e) => {
                            if e.is_trap() {
                                tracing::warn!(service = %args.service, error = %e, "plugin trapped, evicting");
                                this.inner
                                    .plugins
                                    .remove_if(&args.service, |_, resident| match resident {
                                        Plugin::Wasm(current) => current.same_instance(&wasm),
                                        Plugin::Native(_) => false,
                                    });
                            }
                            Err(e.into_plugin_error(&args.service))
                        }
                    }
                }
            }
        }
        .boxed()
    }

    /// Executes a top-level call seeded with `precomputed` results.
    ///
    /// The top-level call itself always runs; only its sub-calls are replayed
    /// from the ledger. Returns the outcome together with the ledger as it
    /// stood when the chain finished.
    pub async fn execute(&self, mut args: CallArgs, precomputed: Vec<CallResult>) -> (std::result::Result<Value, PluginError>, Ledger) {
        args.service = self.inner.config.resolve_alias(&args.service).to_string();

        let ledger = Arc::new(Mutex::new(Ledger::new(precomputed)));
        let host = CallHost::root(self.clone(), ledger.clone(), &args.service);
        let outcome = self.dispatch(args, host).await;

        let ledger = ledger
            .lock()
            .map(|ledger| ledger.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone());
        (outcome, ledger)
    }

    /// Executes a call from inside the supervisor's own process.
    pub async fn call(&self, args: CallArgs) -> std::result::Result<Value, PluginError> {
        self.execute(args, Vec::new()).await.0
    }

    /// Answers one call request.
    ///
    /// A request that arrives with no precomputed results resumes from the
    /// ledger retained for its id, if an earlier attempt failed. Only failures
    /// that completed at least one sub-call leave a ledger behind.
    pub async fn handle_request(&self, request: CallRequest) -> CallResponse {
        let CallRequest { id, args, precomputed_results } = request;
        tracing::debug!(id = %id, service = %args.service, intf = %args.intf, method = %args.method, "request received");

        let precomputed = if precomputed_results.is_empty() {
            self.inner
                .retained
                .remove(&id)
                .map(|(_, (ledger, _))| ledger.into_results())
                .unwrap_or_default()
        } else {
            precomputed_results
        };

        let (outcome, ledger) = self.execute(args, precomputed).await;
        match &outcome {
            Ok(_) => {
                self.inner.retained.remove(&id);
            }
            Err(e) => {
                tracing::debug!(id = %id, error = %e, replayable = ledger.len(), "call failed");
                if !ledger.is_empty() {
                    self.retain(id.clone(), ledger);
                }
            }
        }

        tracing::debug!(id = %id, "response sent");
        plugrpc::build_plugin_call_response(id, outcome)
    }

    /// Keeps `ledger` for a retry of `id`, dropping the oldest retained
    /// ledgers beyond the configured cap.
    fn retain(&self, id: CallId, ledger: Ledger) {
        let max = self.inner.config.max_retained;
        if max == 0 {
            return;
        }
        let seq = self.inner.retained_seq.fetch_add(1, Ordering::Relaxed);
        self.inner.retained.insert(id, (ledger, seq));

        while self.inner.retained.len() > max {
            let oldest = self
                .inner
                .retained
                .iter()
                .min_by_key(|entry| entry.value().1)
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else { break };
            self.inner.retained.remove(&oldest);
            tracing::debug!(id = %oldest, "retained ledger dropped");
        }
    }

    /// Warms `services`, the configured system plugins, and their
    /// dependencies. Runs in the background; failures are only reported.
    pub fn preload(&self, services: Vec<String>) -> JoinHandle<PreloadReport> {
        let this = self.clone();
        tokio::spawn(async move { preload::run(&this, services).await })
    }

    /// Attaches the supervisor to a transport.
    ///
    /// `I_FRAME_INITIALIZED` is sent before any request is read. Requests are
    /// answered concurrently; the loop ends when the transport closes or the
    /// supervisor shuts down.
    pub async fn serve(&self, transport: impl Transport) -> Result<()> {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let ready = Message::from(plugrpc::build_frame_initialized()).to_bytes()?;
        transport.send(&ready).await?;

        let this = self.clone();
        let handle = tokio::spawn(async move { this.serve_loop(transport).await });
        self.serving().push(handle);
        Ok(())
    }

    fn serving(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.inner.serving.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn serve_loop(&self, transport: Arc<dyn Transport>) {
        loop {
            let msg = match transport.recv().await {
                Ok(Some(msg)) => msg,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "transport failed, detaching");
                    break;
                }
            };

            match Message::from_slice(&msg) {
                Message::PluginCallRequest(request) => {
                    let this = self.clone();
                    let transport = transport.clone();
                    tokio::spawn(async move {
                        let response = this.handle_request(request).await;
                        let sent = match Message::from(response).to_bytes() {
                            Ok(bytes) => transport.send(&bytes).await.map_err(|e| e.to_string()),
                            Err(e) => Err(e.to_string()),
                        };
                        if let Err(e) = sent {
                            tracing::warn!(error = %e, "response not delivered");
                        }
                    });
                }
                Message::PreLoadServicesRequest(request) => {
                    drop(self.preload(request.services));
                }
                Message::Unknown => tracing::trace!("dropping unrecognized message"),
                other => tracing::trace!(kind = ?other.kind(), "dropping message not meant for the supervisor"),
            }
        }
    }

    /// Stops every serve loop and drops resident plugins, retained ledgers
    /// and the cache.
    pub fn shutdown(&self) {
        for handle in self.serving().drain(..) {
            handle.abort();
        }
        self.inner.plugins.clear();
        self.inner.compiled.clear();
        self.inner.retained.clear();
        self.inner.cache.clear();
        tracing::info!("supervisor shut down");
    }
}
