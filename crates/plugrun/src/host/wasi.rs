//! WASI preview 2 for plugins.

use wasmtime::component::Linker;

use crate::context::PluginCtx;
use crate::host::Result;

/// Satisfies every `wasi:*` import with the wasmtime-wasi implementation.
///
/// What a plugin may reach (stdio, nothing else) is decided when its
/// `PluginCtx` is built.
#[derive(Clone, Debug, Default)]
pub struct Wasi;

impl Wasi {
    pub fn link(linker: &mut Linker<PluginCtx>) -> Result<()> {
        wasmtime_wasi::p2::add_to_linker_async(linker)?;
        Ok(())
    }
}
