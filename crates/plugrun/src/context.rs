//! Store context for running plugin instances.

use wasmtime::component::ResourceTable;
use wasmtime_wasi::WasiCtx;
use wasmtime_wasi::WasiCtxBuilder;
use wasmtime_wasi::WasiCtxView;
use wasmtime_wasi::WasiView;

use crate::config::Config;
use crate::plugin::CallHost;

/// Per-instance state held in the wasmtime `Store`.
///
/// `host` is only present while a call is executing: it is the handle through
/// which the instance's plugin imports issue sub-calls for that call chain.
pub struct PluginCtx {
    pub(crate) service: String,
    wasi: WasiCtx,
    table: ResourceTable,
    pub(crate) host: Option<CallHost>,
}

impl PluginCtx {
    pub(crate) fn new(service: impl Into<String>, config: &Config) -> Self {
        let mut wasi = WasiCtxBuilder::new();
        if config.inherit_stdio {
            wasi.inherit_stdio();
        }
        Self {
            service: service.into(),
            wasi: wasi.build(),
            table: ResourceTable::new(),
            host: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }
}

impl WasiView for PluginCtx {
    fn ctx(&mut self) -> WasiCtxView<'_> {
        WasiCtxView {
            ctx: &mut self.wasi,
            table: &mut self.table,
        }
    }
}
