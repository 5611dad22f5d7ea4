//! Runs a supervisor and an application client in one process.
//!
//! With no arguments the bundled `calc` plugin is served from memory. Given a
//! directory, plugins are read from `<dir>/<service>.wasm` instead.
//!
//! Set `RUST_LOG=debug` to watch requests and responses cross the channel.

use anyhow::Context;
use anyhow::Result;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use plugrpc::CallArgs;
use plugrun::ChannelTransport;
use plugrun::Client;
use plugrun::Config;
use plugrun::DirSource;
use plugrun::MemorySource;
use plugrun::PluginSource;
use plugrun::Supervisor;
use plugrun::host::KvPlugin;

const CALC: &str = include_str!("../plugins/calc.wat");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::default().with_system_plugin("calc");
    let supervisor = match std::env::args().nth(1) {
        Some(dir) => start(config.clone(), DirSource::new(dir))?,
        None => start(config.clone(), MemorySource::new().with("calc", CALC))?,
    };
    supervisor.register_native("kv", KvPlugin::new());

    let (app, host) = ChannelTransport::pair();
    supervisor.serve(host).await.context("failed to attach the supervisor")?;

    let client = Client::connect(app, &config);
    client.on_loaded().await.context("supervisor never became ready")?;
    client.pre_load_plugins(vec!["calc".into()]).await?;

    let sum = client
        .function_call(CallArgs::new("calc", "math", "add", vec![json!(20), json!(22)]))
        .await
        .context("calc.add failed")?;
    tracing::info!(%sum, "calc answered");

    client
        .function_call(CallArgs::new("kv", "store", "set", vec![json!("answer"), sum]))
        .await?;
    let stored = client
        .function_call(CallArgs::new("kv", "store", "get", vec![json!("answer")]))
        .await?;
    tracing::info!(%stored, "kv answered");

    match client
        .function_call(CallArgs::new("calc", "math", "div", vec![json!(1), json!(0)]))
        .await
    {
        Ok(value) => tracing::warn!(%value, "division by zero succeeded"),
        Err(e) => tracing::info!(error = %e, "division by zero rejected"),
    }

    supervisor.shutdown();
    Ok(())
}

fn start(config: Config, source: impl PluginSource) -> Result<Supervisor> {
    Supervisor::new(config, source).context("failed to create the supervisor")
}
