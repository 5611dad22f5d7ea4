//! # Interface Schemas
//!
//! Maps the interfaces a component imports and exports to the concrete types
//! needed to move values across a call boundary.
//!
//! ## Philosophy
//!
//! - **Link-Time Safety**: Interfaces are checked for wire safety (no resources,
//!   futures, streams or error contexts) when a plugin is loaded, not when a
//!   call arrives.
//! - **Nothing Dropped Silently**: An interface that fails the check is kept in
//!   `rejected` with its reason so the loader can refuse it by name.

use std::collections::HashMap;

use wasmtime::Engine;
use wasmtime::component::Component;
use wasmtime::component::Type;
use wasmtime::component::types::ComponentFunc;
use wasmtime::component::types::ComponentInstance;
use wasmtime::component::types::ComponentItem;

#[derive(Debug, Clone)]
pub enum Error {
    ResourceNotWireSafe,
    FutureNotWireSafe,
    StreamNotWireSafe,
    ErrorContextNotWireSafe,
    InvalidParameter { func: String, details: String },
    InvalidResult { func: String, details: String },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ResourceNotWireSafe => write!(f, "resources cannot cross a call boundary"),
            Self::FutureNotWireSafe => write!(f, "futures cannot cross a call boundary"),
            Self::StreamNotWireSafe => write!(f, "streams cannot cross a call boundary"),
            Self::ErrorContextNotWireSafe => write!(f, "error contexts cannot cross a call boundary"),
            Self::InvalidParameter { func, details } => {
                write!(f, "'{}' is not wire-safe: parameter contains forbidden type: {}", func, details)
            }
            Self::InvalidResult { func, details } => {
                write!(f, "'{}' is not wire-safe: result contains forbidden type: {}", func, details)
            }
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A parsed `namespace:package/interface@version` name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceName {
    pub namespace: String,
    pub package: String,
    pub interface: String,
    pub version: Option<String>,
}

impl InterfaceName {
    /// Parses a fully-qualified interface name. Bare names return `None`.
    pub fn parse(name: &str) -> Option<Self> {
        let (path, version) = match name.split_once('@') {
            Some((path, version)) => (path, Some(version.to_string())),
            None => (name, None),
        };
        let (namespace, rest) = path.split_once(':')?;
        let (package, interface) = rest.split_once('/')?;
        if [namespace, package, interface].iter().any(|part| part.is_empty()) || interface.contains('/') {
            return None;
        }
        Some(Self {
            namespace: namespace.to_string(),
            package: package.to_string(),
            interface: interface.to_string(),
            version,
        })
    }
}

impl std::fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}/{}", self.namespace, self.package, self.interface)?;
        if let Some(version) = &self.version {
            write!(f, "@{}", version)?;
        }
        Ok(())
    }
}

/// Instance-shaped imports and exports of one component.
#[derive(Clone, Debug, Default)]
pub struct Surface {
    pub imports: HashMap<String, InterfaceSchema>,
    pub exports: HashMap<String, InterfaceSchema>,
    /// Interfaces that exist but cannot be called through JSON values.
    pub rejected: HashMap<String, Error>,
}

impl Surface {
    pub fn of(component: &Component) -> Self {
        let engine = component.engine();
        let comp_ty = component.component_type();
        let mut surface = Self::default();

        for (name, item) in comp_ty.imports(engine) {
            let ComponentItem::ComponentInstance(inst_ty) = item else { continue };
            match InterfaceSchema::from_inst_ty(engine, name, inst_ty) {
                Ok(schema) => { surface.imports.insert(name.to_string(), schema); }
                Err(e) => { surface.rejected.insert(name.to_string(), e); }
            }
        }

        for (name, item) in comp_ty.exports(engine) {
            let ComponentItem::ComponentInstance(inst_ty) = item else { continue };
            match InterfaceSchema::from_inst_ty(engine, name, inst_ty) {
                Ok(schema) => { surface.exports.insert(name.to_string(), schema); }
                Err(e) => { surface.rejected.insert(name.to_string(), e); }
            }
        }

        surface
    }

    /// Finds the exported interface a caller means by `intf`.
    ///
    /// An exact export name wins. Otherwise `intf` may be the short interface
    /// part of exactly one qualified export (`api` for `bank:plugin/api`).
    pub fn find_export(&self, intf: &str) -> Option<(&str, &InterfaceSchema)> {
        if let Some((name, schema)) = self.exports.get_key_value(intf) {
            return Some((name.as_str(), schema));
        }
        let mut matches = self.exports.iter().filter(|(name, _)| {
            InterfaceName::parse(name).is_some_and(|parsed| parsed.interface == intf)
        });
        let found = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some((found.0.as_str(), found.1))
    }
}

#[derive(Clone, Debug)]
pub struct InterfaceSchema {
    pub funcs: HashMap<String, FuncSignature>,
}

impl InterfaceSchema {
    fn from_inst_ty(engine: &Engine, name: &str, inst_ty: ComponentInstance) -> Result<Self> {
        let mut funcs = HashMap::new();

        for (func_name, func_item) in inst_ty.exports(engine) {
            let ComponentItem::ComponentFunc(func_ty) = func_item else { continue };
            let qualified = format!("{name}#{func_name}");
            let sig = FuncSignature::from_func_ty(&func_ty, &qualified)?;
            funcs.insert(func_name.to_string(), sig);
        }

        Ok(Self { funcs })
    }
}

#[derive(Clone, Debug)]
pub struct FuncSignature {
    pub params: Vec<Type>,
    pub results: Vec<Type>,
}

impl FuncSignature {
    fn from_func_ty(func_ty: &ComponentFunc, func: &str) -> Result<Self> {
        let params: Vec<Type> = func_ty.params()
            .map(|(_, ty)| check_wire_safe(ty))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::InvalidParameter {
                func: func.to_string(),
                details: e.to_string(),
            })?;

        let results: Vec<Type> = func_ty.results()
            .map(check_wire_safe)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::InvalidResult {
                func: func.to_string(),
                details: e.to_string(),
            })?;

        Ok(Self { params, results })
    }
}

/// Recursively checks that a type is pure data.
fn check_wire_safe(ty: Type) -> Result<Type> {
    match &ty {
        Type::Own(_) | Type::Borrow(_) => return Err(Error::ResourceNotWireSafe),
        Type::Future(_) => return Err(Error::FutureNotWireSafe),
        Type::Stream(_) => return Err(Error::StreamNotWireSafe),
        Type::ErrorContext => return Err(Error::ErrorContextNotWireSafe),

        Type::Bool
        | Type::U8 | Type::U16 | Type::U32 | Type::U64
        | Type::S8 | Type::S16 | Type::S32 | Type::S64
        | Type::Float32 | Type::Float64
        | Type::Char | Type::String
        | Type::Enum(_) | Type::Flags(_) => (),

        Type::Option(h) => { check_wire_safe(h.ty())?; }
        Type::Result(h) => {
            h.ok().map_or(Ok(()), |t| check_wire_safe(t).map(|_| ()))?;
            h.err().map_or(Ok(()), |t| check_wire_safe(t).map(|_| ()))?;
        }
        Type::Variant(h) => {
            h.cases().try_for_each(|c| c.ty.map_or(Ok(()), |t| check_wire_safe(t).map(|_| ())))?;
        }

        Type::List(h) => { check_wire_safe(h.ty())?; }
        Type::Tuple(h) => {
            h.types().try_for_each(|t| check_wire_safe(t).map(|_| ()))?;
        }
        Type::Record(h) => {
            h.fields().try_for_each(|f| check_wire_safe(f.ty.clone()).map(|_| ()))?;
        }
    }
    Ok(ty)
}
