// src/domain/transport.rs

//! Transport domain abstractions.
//!
//! This module defines the duplex event-channel contract the protocol engine
//! needs from its host environment. It intentionally avoids any reference to
//! a concrete IPC mechanism.
//!
//! The transport is responsible only for delivering argument lists on named
//! channels between endpoints. Sub-channel multiplexing, envelopes, liveness
//! checks and cleanup are handled by the engine.
//!
//! The reference implementation lives under `src/transport/memory.rs`.
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identity of one attachment to the transport.
///
/// Replies are always addressed to the endpoint that sent the request,
/// never broadcast. Endpoints are immutable and cheap to clone.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Endpoint(pub Arc<str>);

impl Endpoint {
    /// Borrow the endpoint identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<T> From<T> for Endpoint
where
    T: Into<Arc<str>>,
{
    fn from(value: T) -> Self {
        // ---
        Endpoint(value.into())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one listener attachment.
///
/// Returned from [`Transport::on`] and [`Transport::once`] and accepted by
/// [`Transport::remove_listener`]. Unique per transport instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// A message delivered to a listener.
///
/// `args` are structured values that pass through the transport unchanged.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Endpoint that sent the message; replies go here.
    pub sender: Endpoint,

    /// Wire channel the message was sent on.
    pub channel: String,

    /// Positional arguments.
    pub args: Vec<Value>,
}

/// Handle returned from a successful listener registration.
///
/// A persistent listener keeps delivering until it is removed with
/// [`Transport::remove_listener`] or [`Transport::remove_all_listeners`], or
/// the transport is closed. A once-listener delivers at most one message.
/// In every case the inbox yields `None` after the listener is detached.
///
/// Dropping the handle does not detach the listener; callers that own a
/// listener are expected to remove it explicitly.
pub struct ListenerHandle {
    // ---
    /// Identifier used to remove this listener.
    pub id: ListenerId,

    /// Wire channel the listener is attached to.
    pub channel: String,

    /// Receiver for delivered messages.
    pub inbox: mpsc::UnboundedReceiver<Message>,
}

/// Shared base state for all transport implementations.
///
/// Each concrete transport embeds this as a field named `base` so that the
/// default `Transport` methods can delegate to it.
pub struct TransportBase {
    /// Endpoint identity of this transport instance (the node_id).
    pub endpoint: Endpoint,
}

impl TransportBase {
    /// Create a new TransportBase.
    pub fn new(endpoint: impl Into<Endpoint>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }
}

impl From<&TransportConfig> for TransportBase {
    fn from(config: &TransportConfig) -> Self {
        // ---
        Self::new(config.node_id.as_str())
    }
}

/// Configuration for creating a transport instance.
///
/// Passed to transport factory functions (`create_*_transport()`).
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// Node ID; becomes the endpoint identity of the transport.
    pub node_id: String,

    /// Optional transport type override. Only `"memory"` is built in.
    pub transport_type: Option<String>,
}

impl TransportConfig {
    /// Config for the given node with default transport selection.
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            transport_type: None,
        }
    }
}

/// Duplex event-channel abstraction.
///
/// Implementations must ensure that:
/// - Once `on()`/`once()` returns, messages sent to this endpoint on that
///   channel *after* that point are deliverable to the returned inbox.
/// - Messages from one sender on one channel are delivered in send order.
/// - `send()` never waits on a receiver.
/// - `remove_listener()` and `remove_all_listeners()` take effect before they
///   return; nothing is delivered to a removed listener afterwards.
///
/// # Notes
///
/// This trait uses `async_trait`; the expanded documentation may show
/// explicit lifetimes and a boxed `Future`. Consumers should treat those
/// methods as normal `async fn`s.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    // ---
    /// Returns a reference to the shared base state.
    fn base(&self) -> &TransportBase;

    /// Returns the endpoint identity of this transport.
    ///
    /// Default implementation delegates to `base()`.
    fn endpoint(&self) -> &Endpoint {
        &self.base().endpoint
    }

    /// Send `args` on `channel` to the listeners of `target`.
    ///
    /// Sending to an endpoint that does not exist or has been closed is not
    /// an error; the message is dropped.
    async fn send(&self, target: &Endpoint, channel: &str, args: Vec<Value>) -> Result<()>;

    /// Attach a persistent listener to `channel` on this endpoint.
    async fn on(&self, channel: &str) -> Result<ListenerHandle>;

    /// Attach a listener to `channel` that detaches after one delivery.
    async fn once(&self, channel: &str) -> Result<ListenerHandle>;

    /// Detach a single listener. Unknown ids are ignored.
    fn remove_listener(&self, channel: &str, id: ListenerId);

    /// Detach every listener on `channel` for this endpoint.
    fn remove_all_listeners(&self, channel: &str);

    /// Number of listeners currently attached to `channel` on this endpoint.
    fn listener_count(&self, channel: &str) -> usize;

    /// Token that is cancelled once `endpoint` has been destroyed.
    ///
    /// For an endpoint that is already gone the token is returned cancelled.
    fn liveness(&self, endpoint: &Endpoint) -> CancellationToken;

    /// Close the transport, detach all its listeners and mark its endpoint
    /// destroyed.
    async fn close(&self) -> Result<()>;
}

/// Shared transport pointer.
///
/// `.clone()` only increments a reference count; all clones share one
/// endpoint.
pub type TransportPtr = Arc<dyn Transport>;
