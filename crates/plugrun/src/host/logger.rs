//! # Logger host interface
//!
//! `host:common/logging` lets a plugin emit log lines. They are forwarded to
//! `tracing` with the plugin's service name attached.

use wasmtime::StoreContextMut;
use wasmtime::component::Linker;

use crate::context::PluginCtx;
use crate::host::Error;
use crate::host::Result;

pub const INTERFACE: &str = "host:common/logging";

#[derive(Clone, Debug, Default)]
pub struct Logger;

impl Logger {
    /// True if `import` (possibly versioned) names the logging interface.
    pub fn provides(import: &str) -> bool {
        import.split('@').next() == Some(INTERFACE)
    }

    /// Installs `log(level, msg)` under the exact `import` name.
    pub fn link(linker: &mut Linker<PluginCtx>, import: &str) -> Result<()> {
        let mut instance = linker
            .instance(import)
            .map_err(|e| Error::Link(e.to_string()))?;

        instance
            .func_wrap(
                "log",
                |caller: StoreContextMut<'_, PluginCtx>, (level, msg): (String, String)| {
                    let service = caller.data().service();
                    match level.as_str() {
                        "trace" => tracing::trace!(service, "{}", msg),
                        "debug" => tracing::debug!(service, "{}", msg),
                        "warn" => tracing::warn!(service, "{}", msg),
                        "error" => tracing::error!(service, "{}", msg),
                        _ => tracing::info!(service, "{}", msg),
                    }
                    Ok(())
                },
            )
            .map_err(|e| Error::Link(e.to_string()))?;

        Ok(())
    }
}
