//! Stream RPC engine.
//!
//! One engine binds one transport endpoint and one channel prefix. It plays
//! both roles: it answers invocations for the operations registered on it,
//! and it invokes operations on peers (or on itself) with [`RpcEngine::run`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::handshake;
use crate::macros::log_debug;
use crate::naming::ChannelNamer;
use crate::registry::{wrap_factory, HandlerRegistry};
use crate::{Endpoint, EngineConfig, RemoteStream, Result, TransportPtr};

/// Protocol engine turning a duplex event channel into stream RPC.
///
/// Cloning is cheap; all clones share the same registry and invocation
/// counter. When the last clone (and the last stream it returned) is dropped,
/// every listener the engine attached is removed.
///
/// # Example
///
/// ```
/// use futures::{stream, StreamExt};
/// use serde_json::json;
/// use stream_rpc::{MemoryHub, RpcEngineBuilder, TransportBuilder};
///
/// # async fn example() -> stream_rpc::Result<()> {
/// let transport = TransportBuilder::new()
///     .node_id("main")
///     .hub(MemoryHub::new())
///     .build()
///     .await?;
/// let engine = RpcEngineBuilder::new(transport).prefix("$foo/").build().await?;
///
/// engine
///     .register("echo", |args, _cancel| {
///         stream::iter(args.into_iter().map(Ok::<_, serde_json::Value>))
///     })
///     .await?;
///
/// let values: Vec<_> = engine
///     .run("echo", None, vec![json!(1), json!(2)])
///     .collect()
///     .await;
/// assert_eq!(values.len(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RpcEngine {
    inner: Arc<Inner>,
}

pub(crate) struct Inner {
    pub(crate) transport: TransportPtr,
    pub(crate) namer: ChannelNamer,
    pub(crate) default_target: Endpoint,
    next_invocation: AtomicU64,
    registry: Arc<HandlerRegistry>,
}

impl Inner {
    /// Allocate the next sub-channel for `operation`; never reused.
    pub(crate) fn next_sub_channel(&self, operation: &str) -> String {
        let n = self.next_invocation.fetch_add(1, Ordering::Relaxed);
        self.namer.sub_channel(operation, n)
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.registry.unregister_all();
    }
}

impl RpcEngine {
    /// Create an engine (internal use by `RpcEngineBuilder`).
    pub(crate) async fn new(transport: TransportPtr, config: EngineConfig) -> Result<Self> {
        // ---
        let namer = ChannelNamer::new(config.prefix.unwrap_or_default());
        let default_target = config
            .default_target
            .unwrap_or_else(|| transport.endpoint().clone());

        let registry = Arc::new(HandlerRegistry::new(transport.clone(), namer.clone()));

        let responder = transport.on(&namer.check_listener()).await?;
        registry.set_responder(responder.id);
        let _responder_task = handshake::start_responder(
            transport.clone(),
            namer.clone(),
            Arc::downgrade(&registry),
            responder,
        );

        log_debug!(
            "{}: engine ready (prefix {:?}, default target {default_target})",
            transport.endpoint(),
            namer.prefix()
        );

        Ok(Self {
            inner: Arc::new(Inner {
                transport,
                namer,
                default_target,
                next_invocation: AtomicU64::new(0),
                registry,
            }),
        })
    }

    /// Endpoint this engine is attached as.
    pub fn endpoint(&self) -> &Endpoint {
        self.inner.transport.endpoint()
    }

    /// Channel prefix of this engine.
    pub fn prefix(&self) -> &str {
        self.inner.namer.prefix()
    }

    /// Register a producer factory for `operation`.
    ///
    /// Every invocation calls `factory` with its arguments and a token that
    /// is cancelled if the caller cancels or goes away. Values of the
    /// returned stream are sent as items, its first `Err` as the terminal
    /// error, and its end as completion.
    ///
    /// Registering a name that is already registered attaches one more
    /// listener; [`listener_count`](Self::listener_count) reflects both and
    /// [`unregister`](Self::unregister) removes both.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport refuses the listener.
    pub async fn register<F, S>(&self, operation: &str, factory: F) -> Result<()>
    where
        F: Fn(Vec<Value>, CancellationToken) -> S + Send + Sync + 'static,
        S: Stream<Item = std::result::Result<Value, Value>> + Send + 'static,
    {
        // ---
        self.inner
            .registry
            .register(operation, wrap_factory(factory))
            .await
    }

    /// Remove the listeners and bookkeeping for `operation`. Idempotent.
    pub fn unregister(&self, operation: &str) {
        self.inner.registry.unregister(operation);
    }

    /// Remove the liveness responder and every registered operation.
    ///
    /// After this the engine no longer answers anything; invocations it
    /// issues still work against other endpoints.
    pub fn unregister_all(&self) {
        self.inner.registry.unregister_all();
    }

    /// Whether `operation` currently has a producer on this engine.
    pub fn is_registered(&self, operation: &str) -> bool {
        self.inner.registry.is_registered(operation)
    }

    /// Number of transport listeners on this engine's channel for
    /// `operation`.
    pub fn listener_count(&self, operation: &str) -> usize {
        self.inner
            .transport
            .listener_count(&self.inner.namer.operation(operation))
    }

    /// Invoke `operation` on `target` and stream its results.
    ///
    /// `None` targets the engine's default target, which is its own endpoint
    /// unless configured otherwise. The returned stream is cold; see
    /// [`RemoteStream`].
    pub fn run(&self, operation: &str, target: Option<Endpoint>, args: Vec<Value>) -> RemoteStream {
        RemoteStream::new(self.inner.clone(), operation.to_string(), target, args)
    }

    /// Like [`run`](Self::run), deserializing every item into `T`.
    ///
    /// An item that does not deserialize yields
    /// [`RpcError::Serialization`](crate::RpcError::Serialization) and the
    /// stream continues.
    pub fn run_as<T>(
        &self,
        operation: &str,
        target: Option<Endpoint>,
        args: Vec<Value>,
    ) -> impl Stream<Item = Result<T>> + Send + 'static
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.run(operation, target, args)
            .map(|item| item.and_then(|value| Ok(serde_json::from_value(value)?)))
    }
}
