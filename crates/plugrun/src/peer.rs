//! # Correlation Engine
//!
//! The `Peer` owns one end of a transport. It tags every outbound call with a
//! fresh id, parks a resolver under that id, and lets a background pump settle
//! the resolver when the response carrying the same id comes back.
//!
//! ## Invariants
//! - **Order Independence**: Responses are matched by id only. Arrival order is
//!   irrelevant.
//! - **At Most Once**: A resolver is removed from the pending map before it is
//!   settled, so a duplicate response finds nothing and is dropped.
//! - **Local Abandonment**: A timed-out or failed call frees its own entry. No
//!   cancellation is sent to the other side.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use plugrpc::CallArgs;
use plugrpc::CallId;
use plugrpc::CallResponse;
use plugrpc::CallResult;
use plugrpc::Message;
use plugrpc::PluginError;

use crate::config::Config;
use crate::transport;
use crate::transport::Transport;

#[derive(Debug, Clone)]
pub enum Error {
    Transport(transport::Error),
    Wire(plugrpc::Error),
    /// The call reached a plugin and the plugin failed.
    Plugin(PluginError),
    Timeout,
    ChannelClosed,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "Transport error: {}", e),
            Self::Wire(e) => write!(f, "Wire error: {}", e),
            Self::Plugin(e) => write!(f, "Plugin error: {}", e),
            Self::Timeout => write!(f, "Request timed out"),
            Self::ChannelClosed => write!(f, "Response channel closed"),
        }
    }
}

impl std::error::Error for Error {}

impl From<transport::Error> for Error {
    fn from(e: transport::Error) -> Self {
        Self::Transport(e)
    }
}

impl From<plugrpc::Error> for Error {
    fn from(e: plugrpc::Error) -> Self {
        Self::Wire(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

type Pending = DashMap<CallId, oneshot::Sender<Result<Value>>>;

/// Correlating end of a transport.
///
/// The pump task runs until the transport closes or the peer is dropped.
pub struct Peer {
    peer_name: String,
    transport: Arc<dyn Transport>,
    pending: Arc<Pending>,
    ready: watch::Receiver<bool>,
    call_timeout: Option<Duration>,
    pump: JoinHandle<()>,
}

impl Peer {
    /// Creates a new peer and spawns the background pump task.
    pub fn new(peer_name: impl Into<String>, transport: Box<dyn Transport>, config: &Config) -> Self {
        let peer_name = peer_name.into();
        let transport: Arc<dyn Transport> = Arc::from(transport);
        let pending: Arc<Pending> = Arc::new(DashMap::new());
        let (ready_tx, ready) = watch::channel(false);

        let pump_transport = transport.clone();
        let pump_pending = pending.clone();
        let pump_name = peer_name.clone();

        let pump = tokio::spawn(async move {
            let error = loop {
                match pump_transport.recv().await {
                    Ok(Some(msg)) => Self::handle_message(&pump_name, &msg, &pump_pending, &ready_tx),
                    Ok(None) => {
                        break Error::Transport(transport::Error::ConnectionLost("Stream closed".into()));
                    }
                    Err(e) => {
                        tracing::warn!(peer = %pump_name, error = %e, "transport failed in pump");
                        break Error::Transport(e);
                    }
                }
            };
            Self::notify_all_pending(&pump_pending, error);
        });

        Self {
            peer_name,
            transport,
            pending,
            ready,
            call_timeout: config.call_timeout,
            pump,
        }
    }

    pub fn peer_name(&self) -> &str {
        &self.peer_name
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Rejects every waiting call with `error`.
    fn notify_all_pending(pending: &Pending, error: Error) {
        let keys: Vec<CallId> = pending.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((_, tx)) = pending.remove(&key) {
                let _ = tx.send(Err(error.clone()));
            }
        }
    }

    /// Routes one inbound message. Nothing here can fail the pump.
    fn handle_message(peer: &str, msg: &[u8], pending: &Pending, ready: &watch::Sender<bool>) {
        match Message::from_slice(msg) {
            Message::PluginCallResponse(response) => Self::settle(peer, response, pending),
            Message::FrameInitialized(_) => {
                ready.send_replace(true);
            }
            Message::Unknown => tracing::trace!(peer, "dropping unrecognized message"),
            other => tracing::trace!(peer, kind = ?other.kind(), "dropping message not meant for a caller"),
        }
    }

    fn settle(peer: &str, response: CallResponse, pending: &Pending) {
        let Some((id, tx)) = pending.remove(&response.id) else {
            tracing::trace!(peer, id = %response.id, "dropping unmatched response");
            return;
        };
        tracing::debug!(peer, id = %id, "response received");
        let outcome = response.outcome().map_err(Error::Plugin);
        // receiver gone means the caller already gave up
        let _ = tx.send(outcome);
    }

    /// Reserves a fresh id and parks a resolver under it.
    ///
    /// A collision with a live id is astronomically unlikely but still resolved
    /// by drawing again, so one id never has two resolvers.
    pub fn prepare_call(&self) -> (CallId, oneshot::Receiver<Result<Value>>) {
        let (tx, rx) = oneshot::channel();
        loop {
            let id = CallId::generate();
            if let Entry::Vacant(slot) = self.pending.entry(id.clone()) {
                slot.insert(tx);
                return (id, rx);
            }
        }
    }

    /// Sends an encoded request and awaits the response parked under `id`.
    pub async fn send_and_await(
        &self,
        id: CallId,
        payload: Vec<u8>,
        rx: oneshot::Receiver<Result<Value>>,
    ) -> Result<Value> {
        if let Err(e) = self.transport.send(&payload).await {
            self.pending.remove(&id);
            return Err(e.into());
        }

        let received = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.pending.remove(&id);
                    tracing::debug!(peer = %self.peer_name, id = %id, "call timed out");
                    return Err(Error::Timeout);
                }
            },
            None => rx.await,
        };

        match received {
            Ok(result) => result,
            Err(_) => {
                self.pending.remove(&id);
                Err(Error::ChannelClosed)
            }
        }
    }

    /// Issues a call and waits for its result.
    pub async fn call(&self, args: CallArgs, precomputed: Vec<CallResult>) -> Result<Value> {
        let (id, rx) = self.prepare_call();
        tracing::debug!(peer = %self.peer_name, id = %id, service = %args.service, intf = %args.intf, method = %args.method, "dispatching call");

        let msg: Message = plugrpc::build_plugin_call_request(id.clone(), args, precomputed).into();
        let payload = match msg.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pending.remove(&id);
                return Err(e.into());
            }
        };

        self.send_and_await(id, payload, rx).await
    }

    /// Sends a message that expects no reply.
    pub async fn notify(&self, msg: impl Into<Message>) -> Result<()> {
        let payload = msg.into().to_bytes()?;
        self.transport.send(&payload).await?;
        Ok(())
    }

    /// Resolves once the other side has announced it is ready.
    pub async fn ready(&self) -> Result<()> {
        let mut ready = self.ready.clone();
        ready.wait_for(|ready| *ready).await.map_err(|_| Error::ChannelClosed)?;
        Ok(())
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
