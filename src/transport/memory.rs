//! In-memory transport implementation.
//!
//! This module provides a pure in-process implementation of the domain-level
//! `Transport` trait. It is intended primarily for testing, local execution,
//! and as a reference for transport semantics.
//!
//! ## Reference Semantics
//!
//! - Once `on()`/`once()` returns, messages sent afterwards to that endpoint
//!   and channel are deliverable.
//! - Delivery happens synchronously inside `send()`, into unbounded inboxes,
//!   so per-channel ordering is exactly send order and no message is dropped
//!   due to scheduling.
//! - A once-listener is detached as part of the delivery that fires it.
//! - Closing or dropping a transport detaches all of its listeners and cancels its
//!   liveness token; messages sent to it afterwards are dropped.
//!
//! ## Non-Goals
//!
//! No persistence, no failure injection, no emulation of a specific IPC
//! mechanism.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::macros::{log_debug, log_trace};
use crate::{
    // ---
    Endpoint,
    ListenerHandle,
    ListenerId,
    Message,
    Result,
    RpcError,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};

struct ListenerEntry {
    id: ListenerId,
    once: bool,
    tx: mpsc::UnboundedSender<Message>,
}

struct EndpointSlot {
    session: u64,
    listeners: HashMap<String, Vec<ListenerEntry>>,
    alive: CancellationToken,
}

#[derive(Default)]
struct HubState {
    next_listener: u64,
    next_session: u64,
    endpoints: HashMap<Endpoint, EndpointSlot>,
}

/// Shared message bus for the in-memory transport.
///
/// All `MemoryTransport` instances attached to one `MemoryHub` can reach each
/// other by endpoint, the way peers attached to one IPC host would.
///
/// Integration tests construct a hub per test for isolation and pass it to
/// [`create_memory_transport_with_hub`]:
///
/// ```
/// # use stream_rpc::{MemoryHub, TransportConfig};
/// # async fn example() -> stream_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let main = stream_rpc::create_memory_transport_with_hub(TransportConfig::new("main"), hub.clone()).await?;
/// let renderer = stream_rpc::create_memory_transport_with_hub(TransportConfig::new("renderer"), hub).await?;
/// # Ok(())
/// # }
/// ```
pub struct MemoryHub {
    // ---
    state: Mutex<HubState>,
}

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl MemoryHub {
    /// Create a new, empty hub.
    pub fn new() -> Arc<Self> {
        // ---
        Arc::new(Self::default())
    }

    /// Attach `endpoint` and return the session that owns the attachment.
    fn attach(&self, endpoint: &Endpoint) -> Result<u64> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if state.endpoints.contains_key(endpoint) {
            return Err(RpcError::ConfigConflict(format!(
                "endpoint {endpoint} is already attached to this hub"
            )));
        }
        state.next_session += 1;
        let session = state.next_session;
        state.endpoints.insert(
            endpoint.clone(),
            EndpointSlot {
                session,
                listeners: HashMap::new(),
                alive: CancellationToken::new(),
            },
        );
        log_debug!("{endpoint}: attached to memory hub (session {session})");
        Ok(session)
    }

    fn send(&self, sender: &Endpoint, target: &Endpoint, channel: &str, args: Vec<Value>) {
        // ---
        let mut state = lock_ignore_poison(&self.state);

        let Some(slot) = state.endpoints.get_mut(target) else {
            log_debug!("{sender}: dropping message on {channel}, endpoint {target} is gone");
            return;
        };
        let Some(entries) = slot.listeners.get_mut(channel) else {
            log_trace!("{sender}: no listener for {channel} on {target}");
            return;
        };

        // Once-listeners fire and detach in the same step; closed inboxes
        // are pruned.
        entries.retain(|entry| {
            let msg = Message {
                sender: sender.clone(),
                channel: channel.to_string(),
                args: args.clone(),
            };
            entry.tx.send(msg).is_ok() && !entry.once
        });
        if entries.is_empty() {
            slot.listeners.remove(channel);
        }
    }

    fn listen(
        &self,
        endpoint: &Endpoint,
        session: u64,
        channel: &str,
        once: bool,
    ) -> Result<ListenerHandle> {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        state.next_listener += 1;
        let id = ListenerId(state.next_listener);

        // A newer transport may have reattached the same node_id.
        let slot = state
            .endpoints
            .get_mut(endpoint)
            .filter(|slot| slot.session == session)
            .ok_or_else(|| RpcError::Transport(format!("endpoint {endpoint} is closed")))?;

        let (tx, rx) = mpsc::unbounded_channel();
        slot.listeners
            .entry(channel.to_string())
            .or_default()
            .push(ListenerEntry { id, once, tx });

        log_trace!("{endpoint}: listen on {channel} ({id:?}, once={once})");

        Ok(ListenerHandle {
            id,
            channel: channel.to_string(),
            inbox: rx,
        })
    }

    fn remove_listener(&self, endpoint: &Endpoint, channel: &str, id: ListenerId) {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if let Some(slot) = state.endpoints.get_mut(endpoint) {
            if let Some(entries) = slot.listeners.get_mut(channel) {
                entries.retain(|entry| entry.id != id);
                if entries.is_empty() {
                    slot.listeners.remove(channel);
                }
            }
        }
    }

    fn remove_all_listeners(&self, endpoint: &Endpoint, channel: &str) {
        // ---
        let mut state = lock_ignore_poison(&self.state);
        if let Some(slot) = state.endpoints.get_mut(endpoint) {
            slot.listeners.remove(channel);
        }
    }

    fn listener_count(&self, endpoint: &Endpoint, channel: &str) -> usize {
        // ---
        let state = lock_ignore_poison(&self.state);
        state
            .endpoints
            .get(endpoint)
            .and_then(|slot| slot.listeners.get(channel))
            .map_or(0, Vec::len)
    }

    fn liveness(&self, endpoint: &Endpoint) -> CancellationToken {
        // ---
        let state = lock_ignore_poison(&self.state);
        match state.endpoints.get(endpoint) {
            Some(slot) => slot.alive.clone(),
            None => {
                let gone = CancellationToken::new();
                gone.cancel();
                gone
            }
        }
    }

    fn detach(&self, endpoint: &Endpoint, session: u64) {
        // ---
        let slot = {
            let mut state = lock_ignore_poison(&self.state);
            match state.endpoints.get(endpoint) {
                Some(slot) if slot.session == session => state.endpoints.remove(endpoint),
                _ => None,
            }
        };
        if let Some(slot) = slot {
            log_debug!("{endpoint}: detached from memory hub");
            // Dropping the slot closes every inbox.
            slot.alive.cancel();
        }
    }
}

impl Default for MemoryHub {
    fn default() -> Self {
        // ---
        Self {
            state: Mutex::new(HubState::default()),
        }
    }
}

/// Process-global hub used by [`create_memory_transport`].
static GLOBAL_HUB: OnceLock<Arc<MemoryHub>> = OnceLock::new();

fn global_hub() -> Arc<MemoryHub> {
    GLOBAL_HUB.get_or_init(MemoryHub::new).clone()
}

/// In-memory transport.
///
/// One endpoint attached to a [`MemoryHub`].
struct MemoryTransport {
    // ---
    base: TransportBase,
    hub: Arc<MemoryHub>,
    session: u64,
}

impl Drop for MemoryTransport {
    fn drop(&mut self) {
        // No-op after close().
        self.hub.detach(&self.base.endpoint, self.session);
    }
}

#[async_trait::async_trait]
impl Transport for MemoryTransport {
    // ---
    fn base(&self) -> &TransportBase {
        &self.base
    }

    async fn send(&self, target: &Endpoint, channel: &str, args: Vec<Value>) -> Result<()> {
        self.hub.send(self.endpoint(), target, channel, args);
        Ok(())
    }

    async fn on(&self, channel: &str) -> Result<ListenerHandle> {
        self.hub.listen(self.endpoint(), self.session, channel, false)
    }

    async fn once(&self, channel: &str) -> Result<ListenerHandle> {
        self.hub.listen(self.endpoint(), self.session, channel, true)
    }

    fn remove_listener(&self, channel: &str, id: ListenerId) {
        self.hub.remove_listener(self.endpoint(), channel, id);
    }

    fn remove_all_listeners(&self, channel: &str) {
        self.hub.remove_all_listeners(self.endpoint(), channel);
    }

    fn listener_count(&self, channel: &str) -> usize {
        self.hub.listener_count(self.endpoint(), channel)
    }

    fn liveness(&self, endpoint: &Endpoint) -> CancellationToken {
        self.hub.liveness(endpoint)
    }

    /// Detach this endpoint only; other transports on the hub are unaffected.
    async fn close(&self) -> Result<()> {
        self.hub.detach(self.endpoint(), self.session);
        Ok(())
    }
}

/// Create a new in-memory transport on the process-global hub.
///
/// # Errors
///
/// Returns [`RpcError::ConfigConflict`] if an open transport with the same
/// `node_id` is already attached to the global hub.
pub async fn create_memory_transport(config: TransportConfig) -> Result<TransportPtr> {
    // ---
    create_memory_transport_with_hub(config, global_hub()).await
}

/// Create a new in-memory transport on the provided hub.
///
/// # Errors
///
/// Returns [`RpcError::ConfigConflict`] if an open transport with the same
/// `node_id` is already attached to `hub`.
pub async fn create_memory_transport_with_hub(
    config: TransportConfig,
    hub: Arc<MemoryHub>,
) -> Result<TransportPtr> {
    // ---
    let base = TransportBase::from(&config);
    let session = hub.attach(&base.endpoint)?;

    Ok(Arc::new(MemoryTransport { base, hub, session }))
}
