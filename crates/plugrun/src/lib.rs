//! # PlugRun
//!
//! The supervisor side of plugin calls. Application frames reach plugins only
//! through messages; the supervisor loads wasm components on demand, links
//! their imports to other plugins, and runs each call chain against a ledger of
//! results already produced.

pub mod bind;
pub mod builder;
pub mod cache;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod context;
pub mod host;
pub mod instance;
pub mod ledger;
pub mod loader;
pub mod peer;
pub mod plugin;
pub mod preload;
pub mod schema;
pub mod source;
pub mod supervisor;
pub mod transport;

pub use channel::ChannelTransport;
pub use client::Client;
pub use config::Config;
pub use plugin::CallHost;
pub use plugin::NativePlugin;
pub use preload::PreloadReport;
pub use source::DirSource;
pub use source::MemorySource;
pub use source::PluginSource;
pub use supervisor::Supervisor;
pub use transport::Transport;
