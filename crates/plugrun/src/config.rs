//! # Supervisor Configuration
//!
//! Every knob the runtime reads, with the defaults used when a frame does not
//! say otherwise.

use std::collections::HashMap;
use std::time::Duration;

/// Bounded wait applied to a pending call unless configured otherwise.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a sub-call waits for a plugin instance that is busy in another
/// call chain before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Failed calls whose ledgers are kept for a retry, at most.
pub const DEFAULT_MAX_RETAINED: usize = 1024;

/// Import namespaces served by the supervisor itself.
pub const DEFAULT_HOST_NAMESPACES: [&str; 2] = ["wasi", "host"];

#[derive(Clone, Debug)]
pub struct Config {
    /// How long a caller waits for a response. `None` waits forever.
    pub call_timeout: Option<Duration>,
    /// How long a sub-call waits for an instance busy in another chain.
    /// Calls straight from a frame hold no instance and wait without bound.
    pub busy_timeout: Duration,
    /// Cap on ledgers retained from failed calls. The oldest goes first.
    pub max_retained: usize,
    /// Services warmed along with every preload hint.
    pub system_plugins: Vec<String>,
    /// Namespaces that never name a plugin service.
    pub host_namespaces: Vec<String>,
    /// Service redirections, applied before dispatch.
    pub aliases: HashMap<String, String>,
    /// Whether wasm plugins write to the supervisor's stdio.
    pub inherit_stdio: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            call_timeout: Some(DEFAULT_CALL_TIMEOUT),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            max_retained: DEFAULT_MAX_RETAINED,
            system_plugins: Vec::new(),
            host_namespaces: DEFAULT_HOST_NAMESPACES.iter().map(|s| s.to_string()).collect(),
            aliases: HashMap::new(),
            inherit_stdio: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_max_retained(mut self, max: usize) -> Self {
        self.max_retained = max;
        self
    }

    pub fn with_system_plugin(mut self, service: impl Into<String>) -> Self {
        self.system_plugins.push(service.into());
        self
    }

    pub fn with_host_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.host_namespaces.push(namespace.into());
        self
    }

    pub fn with_alias(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.aliases.insert(from.into(), to.into());
        self
    }

    pub fn with_inherit_stdio(mut self, inherit: bool) -> Self {
        self.inherit_stdio = inherit;
        self
    }

    /// True if imports from `namespace` are satisfied by the host.
    pub fn is_host_namespace(&self, namespace: &str) -> bool {
        self.host_namespaces.iter().any(|ns| ns == namespace)
    }

    /// Follows the alias table. A single hop: aliases never chain.
    pub fn resolve_alias<'a>(&'a self, service: &'a str) -> &'a str {
        self.aliases.get(service).map(String::as_str).unwrap_or(service)
    }
}
