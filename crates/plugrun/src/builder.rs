//! # Plugin Builder
//!
//! Satisfies every import of a compiled plugin and instantiates it.
//!
//! | import | satisfied by |
//! |--------|--------------|
//! | `wasi:*` | wasmtime-wasi, preview 2 |
//! | `host:common/logging` | [`Logger`], forwarding to `tracing` |
//! | `<service>:<package>/<intf>` | sub-calls to `<service>` through the [`Binder`] |
//!
//! Anything else fails the build, naming the import.

use wasmtime::Store;
use wasmtime::component::Linker;
use wasmtime::component::types::ComponentItem;

use crate::bind::Binder;
use crate::config::Config;
use crate::context::PluginCtx;
use crate::host::Logger;
use crate::host::Wasi;
use crate::instance::WasmPlugin;
use crate::loader;
use crate::schema::InterfaceName;
use crate::schema::Surface;

#[derive(Debug)]
pub enum Error {
    /// An import nothing can satisfy.
    UnsupportedImport { service: String, import: String, reason: String },
    Host(crate::host::Error),
    Bind(crate::bind::Error),
    Instantiate(wasmtime::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedImport { service, import, reason } => {
                write!(f, "{} imports '{}', which cannot be satisfied: {}", service, import, reason)
            }
            Self::Host(e) => write!(f, "Host error: {}", e),
            Self::Bind(e) => write!(f, "Bind error: {}", e),
            Self::Instantiate(e) => write!(f, "Instantiate error: {:#}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<crate::host::Error> for Error {
    fn from(e: crate::host::Error) -> Self {
        Self::Host(e)
    }
}

impl From<crate::bind::Error> for Error {
    fn from(e: crate::bind::Error) -> Self {
        Self::Bind(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

pub struct PluginBuilder<'a> {
    config: &'a Config,
    description: loader::Component,
    component: wasmtime::component::Component,
}

impl<'a> PluginBuilder<'a> {
    pub fn new(
        config: &'a Config,
        description: loader::Component,
        component: wasmtime::component::Component,
    ) -> Self {
        Self { config, description, component }
    }

    fn unsupported(&self, import: &str, reason: impl Into<String>) -> Error {
        Error::UnsupportedImport {
            service: self.description.name.clone(),
            import: import.to_string(),
            reason: reason.into(),
        }
    }

    fn link(&self, linker: &mut Linker<PluginCtx>, surface: &Surface) -> Result<()> {
        let engine = self.component.engine();
        let mut wasi_linked = false;

        for (import, item) in self.component.component_type().imports(engine) {
            let ComponentItem::ComponentInstance(_) = item else {
                return Err(self.unsupported(import, "only interface imports can be satisfied"));
            };
            let Some(name) = InterfaceName::parse(import) else {
                return Err(self.unsupported(import, "not a namespace:package/interface name"));
            };

            if name.namespace == "wasi" {
                if !wasi_linked {
                    Wasi::link(linker)?;
                    wasi_linked = true;
                }
                continue;
            }

            if self.config.is_host_namespace(&name.namespace) {
                if Logger::provides(import) {
                    Logger::link(linker, import)?;
                    continue;
                }
                return Err(self.unsupported(import, "no host implementation"));
            }

            if let Some(rejected) = surface.rejected.get(import) {
                return Err(self.unsupported(import, rejected.to_string()));
            }
            let schema = surface
                .imports
                .get(import)
                .ok_or_else(|| self.unsupported(import, "interface has no schema"))?;
            Binder::link_plugin_interface(linker, import, &name, schema)?;
        }

        Ok(())
    }

    pub async fn instantiate(self) -> Result<WasmPlugin> {
        let engine = self.component.engine().clone();
        let surface = Surface::of(&self.component);

        let mut linker = Linker::new(&engine);
        self.link(&mut linker, &surface)?;

        let ctx = PluginCtx::new(self.description.name.as_str(), self.config);
        let mut store = Store::new(&engine, ctx);

        let instance = linker
            .instantiate_async(&mut store, &self.component)
            .await
            .map_err(Error::Instantiate)?;

        Ok(WasmPlugin::new(self.description, surface, self.component, store, instance))
    }
}
