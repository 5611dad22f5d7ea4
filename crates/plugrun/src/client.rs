//! # Application Client
//!
//! The surface an application frame uses to reach plugins. It is a thin layer
//! over the `Peer`: calls are correlated, preload hints are sent and forgotten,
//! and readiness follows the supervisor's `I_FRAME_INITIALIZED` announcement.

use std::sync::Arc;

use serde_json::Value;

use plugrpc::CallArgs;

use crate::config::Config;
use crate::peer::Peer;
use crate::peer::Result;
use crate::transport::Transport;

#[derive(Clone)]
pub struct Client {
    peer: Arc<Peer>,
}

impl Client {
    /// Attaches to the supervisor reachable through `transport`.
    pub fn connect(transport: impl Transport, config: &Config) -> Self {
        Self {
            peer: Arc::new(Peer::new("client", Box::new(transport), config)),
        }
    }

    /// Calls `args.method` on `args.service` and waits for the result.
    pub async fn function_call(&self, args: CallArgs) -> Result<Value> {
        self.peer.call(args, Vec::new()).await
    }

    /// Asks the supervisor to warm `services`. Returns as soon as the hint is sent.
    pub async fn pre_load_plugins(&self, services: Vec<String>) -> Result<()> {
        self.peer.notify(plugrpc::build_pre_load_services_request(services)).await
    }

    /// Waits until the supervisor accepts requests.
    pub async fn on_loaded(&self) -> Result<()> {
        self.peer.ready().await
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }
}
