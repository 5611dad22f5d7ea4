//! # Component Loader
//!
//! Turns the bytes of a compiled plugin into a structured description of its
//! surface: what it imports, what it exports, and the interface text embedded
//! in it. Nothing is instantiated and no state is kept between calls; callers
//! cache the output.
//!
//! Both binary components and their text format are accepted.

use std::borrow::Cow;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use wasmtime::Engine;
use wasmtime::component::types::ComponentItem;
use wit_component::WitPrinter;

use crate::schema::InterfaceName;

#[derive(Debug, Clone)]
pub enum Error {
    /// The bytes are not a component in binary or text form.
    Parse { module: String, message: String },
    /// The component is well formed but does not validate.
    Compile { module: String, message: String },
}

impl Error {
    /// Name of the module that failed.
    pub fn module(&self) -> &str {
        match self {
            Self::Parse { module, .. } | Self::Compile { module, .. } => module,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { module, message } => write!(f, "failed to parse module '{}': {}", module, message),
            Self::Compile { module, message } => write!(f, "failed to compile module '{}': {}", module, message),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Module,
    Function,
    Value,
    Type,
    Instance,
    Component,
}

impl ItemKind {
    fn of(item: &ComponentItem) -> Self {
        match item {
            ComponentItem::ComponentFunc(_) | ComponentItem::CoreFunc(_) => Self::Function,
            ComponentItem::Module(_) => Self::Module,
            ComponentItem::Component(_) => Self::Component,
            ComponentItem::ComponentInstance(_) => Self::Instance,
            ComponentItem::Type(_) | ComponentItem::Resource(_) => Self::Type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
}

/// The surface of one plugin, in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub imports: Vec<Item>,
    pub exports: Vec<Item>,
    /// Interface text recovered from the binary. Empty when the component
    /// carries no decodable interface description.
    pub wit: String,
}

impl Component {
    /// Plugin services this component imports from, in first-seen order.
    ///
    /// Only `namespace:package/interface` instance imports name a service;
    /// namespaces the host serves itself are skipped.
    pub fn dependencies(&self, host_namespaces: &[String]) -> Vec<String> {
        let mut deps: Vec<String> = Vec::new();
        for item in &self.imports {
            if item.kind != ItemKind::Instance {
                continue;
            }
            let Some(name) = InterfaceName::parse(&item.name) else { continue };
            if host_namespaces.iter().any(|ns| *ns == name.namespace) || deps.contains(&name.namespace) {
                continue;
            }
            deps.push(name.namespace);
        }
        deps
    }

    /// Cache key derived from the module name and the SHA-256 of its bytes.
    pub fn cache_key(name: &str, bytes: &[u8]) -> String {
        format!("component:{}:{:x}", name, Sha256::digest(bytes))
    }
}

pub struct ComponentLoader {
    engine: Engine,
}

impl Default for ComponentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentLoader {
    pub fn new() -> Self {
        Self::with_engine(Engine::default())
    }

    /// Uses `engine` to compile. Compiled output is only usable with that engine.
    pub fn with_engine(engine: Engine) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Describes the component in `bytes`.
    pub fn parse(&self, name: &str, bytes: &[u8]) -> Result<Component> {
        self.compile(name, bytes).map(|(description, _)| description)
    }

    /// Describes the component and also hands back the compiled artifact.
    pub(crate) fn compile(&self, name: &str, bytes: &[u8]) -> Result<(Component, wasmtime::component::Component)> {
        let binary: Cow<'_, [u8]> = wat::parse_bytes(bytes).map_err(|e| Error::Parse {
            module: name.to_string(),
            message: e.to_string(),
        })?;

        let compiled = wasmtime::component::Component::new(&self.engine, &binary).map_err(|e| {
            Error::Compile {
                module: name.to_string(),
                message: format!("{e:#}"),
            }
        })?;

        let comp_ty = compiled.component_type();
        let imports = comp_ty
            .imports(&self.engine)
            .map(|(name, item)| Item { name: name.to_string(), kind: ItemKind::of(&item) })
            .collect();
        let exports = comp_ty
            .exports(&self.engine)
            .map(|(name, item)| Item { name: name.to_string(), kind: ItemKind::of(&item) })
            .collect();

        let description = Component {
            name: name.to_string(),
            imports,
            exports,
            wit: interface_text(name, &binary),
        };
        Ok((description, compiled))
    }
}

fn interface_text(name: &str, binary: &[u8]) -> String {
    let printed = wit_component::decode(binary).and_then(|decoded| {
        let resolve = decoded.resolve();
        let root = decoded.package();
        // the root world only names its interfaces; their functions live in
        // the packages it imports from and exports to
        let nested: Vec<_> = resolve
            .packages
            .iter()
            .map(|(id, _)| id)
            .filter(|id| *id != root)
            .collect();
        let mut printer = WitPrinter::default();
        printer.print(resolve, root, &nested)?;
        Ok(printer.output.to_string())
    });
    match printed {
        Ok(text) => text,
        Err(e) => {
            tracing::trace!(module = name, error = %e, "no interface text recovered");
            String::new()
        }
    }
}
