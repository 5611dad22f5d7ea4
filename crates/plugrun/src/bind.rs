//! # Import Binder
//!
//! Wires a plugin's imports of other plugins' interfaces. Each imported
//! function becomes an async host closure that converts its arguments to JSON,
//! issues a sub-call through the `CallHost` of the call being executed, and
//! converts the JSON result back into the function's return values.

use wasmtime::component::Linker;
use wasmtime::component::LinkerInstance;
use wasmtime::component::Type;

use plugrpc::CallArgs;

use crate::codec;
use crate::context::PluginCtx;
use crate::schema::InterfaceName;
use crate::schema::InterfaceSchema;

#[derive(Debug)]
pub enum Error {
    /// Wasmtime linker error (e.g., duplicate definition).
    Wasmtime(wasmtime::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wasmtime(e) => write!(f, "Wasmtime linker error: {}", e),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

pub struct Binder;

impl Binder {
    /// Links the import `import` (e.g. `bank:plugin/api`) so that every call
    /// becomes a sub-call to service `bank`, interface `api`.
    pub fn link_plugin_interface(
        linker: &mut Linker<PluginCtx>,
        import: &str,
        target: &InterfaceName,
        schema: &InterfaceSchema,
    ) -> Result<()> {
        let mut linker_instance = linker.instance(import).map_err(Error::Wasmtime)?;

        for (method, signature) in schema.funcs.iter() {
            bind_method(
                &mut linker_instance,
                &target.namespace,
                &target.interface,
                method,
                signature.results.clone(),
            )?;
        }

        Ok(())
    }
}

fn bind_method(
    linker_instance: &mut LinkerInstance<PluginCtx>,
    service: &str,
    intf: &str,
    method: &str,
    result_types: Vec<Type>,
) -> Result<()> {
    let service = service.to_string();
    let intf = intf.to_string();
    let method_name = method.to_string();

    linker_instance.func_new_async(method, move |store, _func_ty, args, results| {
        let service = service.clone();
        let intf = intf.clone();
        let method = method_name.clone();
        let result_types = result_types.clone();

        Box::new(async move {
            let host = store.data().host.clone().ok_or_else(|| {
                wasmtime::Error::msg(format!("{}:{}.{} called outside of a call", service, intf, method))
            })?;

            let params = codec::vals_to_params(args).map_err(wasmtime::Error::new)?;
            let value = host
                .call(CallArgs::new(service, intf, method, params))
                .await
                .map_err(wasmtime::Error::new)?;

            let vals = codec::result_to_vals(&value, &result_types).map_err(wasmtime::Error::new)?;
            if vals.len() != results.len() {
                return Err(wasmtime::Error::msg(format!(
                    "Result count mismatch: expected {}, got {}",
                    results.len(),
                    vals.len()
                )));
            }
            for (slot, val) in results.iter_mut().zip(vals) {
                *slot = val;
            }

            Ok(())
        })
    }).map_err(Error::Wasmtime)?;

    Ok(())
}
