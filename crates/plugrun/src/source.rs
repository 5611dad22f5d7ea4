//! # Plugin Sources
//!
//! Where the bytes of a plugin come from when the supervisor loads it on
//! demand.

use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

#[derive(Debug, Clone)]
pub enum Error {
    NotFound(String),
    /// The service name cannot be mapped to a location.
    InvalidName(String),
    Io { service: String, message: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(service) => write!(f, "no plugin published for service '{}'", service),
            Self::InvalidName(service) => write!(f, "'{}' is not a valid service name", service),
            Self::Io { service, message } => write!(f, "could not read plugin '{}': {}", service, message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[async_trait::async_trait]
pub trait PluginSource: Send + Sync + 'static {
    /// Fetches the component bytes (binary or text format) for `service`.
    async fn fetch(&self, service: &str) -> Result<Vec<u8>>;
}

/// Plugins held in memory, keyed by service.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    plugins: Arc<DashMap<String, Vec<u8>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, service: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(service, bytes);
        self
    }

    /// Publishes (or replaces) a plugin.
    pub fn insert(&self, service: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        self.plugins.insert(service.into(), bytes.into());
    }

    pub fn remove(&self, service: &str) {
        self.plugins.remove(service);
    }
}

#[async_trait::async_trait]
impl PluginSource for MemorySource {
    async fn fetch(&self, service: &str) -> Result<Vec<u8>> {
        self.plugins
            .get(service)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::NotFound(service.to_string()))
    }
}

/// Plugins stored as `<root>/<service>.wasm`.
#[derive(Clone, Debug)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_of(&self, service: &str) -> Result<PathBuf> {
        let valid = !service.is_empty()
            && service
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !valid {
            return Err(Error::InvalidName(service.to_string()));
        }
        Ok(self.root.join(format!("{}.wasm", service)))
    }
}

#[async_trait::async_trait]
impl PluginSource for DirSource {
    async fn fetch(&self, service: &str) -> Result<Vec<u8>> {
        let path = self.path_of(service)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(service.to_string())),
            Err(e) => Err(Error::Io {
                service: service.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
