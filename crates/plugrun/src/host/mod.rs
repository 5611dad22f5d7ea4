//! # Host services
//!
//! What the supervisor provides by itself: the WASI implementation and the
//! `host:common/logging` interface linked into wasm plugins, and the built-in
//! key/value store registered as a native plugin.

pub mod kv;
pub mod logger;
pub mod wasi;

pub use kv::KvPlugin;
pub use logger::Logger;
pub use wasi::Wasi;

#[derive(Debug)]
pub enum Error {
    Link(String),
    Wasmtime(wasmtime::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Link(msg) => write!(f, "Linker error: {}", msg),
            Self::Wasmtime(e) => write!(f, "Wasmtime error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

impl From<wasmtime::Error> for Error {
    fn from(e: wasmtime::Error) -> Self {
        Self::Wasmtime(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
