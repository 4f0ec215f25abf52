//! Handler registry.
//!
//! Tracks which operations have a registered producer on one engine and
//! dispatches incoming invocation messages to them. Each invocation gets its
//! own spawned [`ProducerDriver`](producer::ProducerDriver), so producers for
//! the same operation run concurrently on distinct sub-channels.
mod producer;

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::macros::{log_debug, log_warn};
use crate::naming::ChannelNamer;
use crate::{InvocationMessage, ListenerHandle, ListenerId, Result, TransportPtr};

pub(crate) use producer::{wrap_factory, BoxedFactory};
pub use producer::ProducerStream;

/// Acquire mutex guard, ignoring poisoning
fn lock_ignore_poison<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Per-engine table of registered operations.
///
/// Key: logical operation name, Value: every raw listener attached for it.
/// Registering a name twice stacks a second listener; both are tracked so
/// that `unregister` releases all of them.
pub(crate) struct HandlerRegistry {
    transport: TransportPtr,
    namer: ChannelNamer,
    bindings: Mutex<HashMap<String, Vec<ListenerId>>>,
    responder: Mutex<Option<ListenerId>>,
}

impl HandlerRegistry {
    pub fn new(transport: TransportPtr, namer: ChannelNamer) -> Self {
        Self {
            transport,
            namer,
            bindings: Mutex::new(HashMap::new()),
            responder: Mutex::new(None),
        }
    }

    /// Record the liveness responder listener so `unregister_all` removes it.
    pub fn set_responder(&self, id: ListenerId) {
        *lock_ignore_poison(&self.responder) = Some(id);
    }

    pub fn is_registered(&self, operation: &str) -> bool {
        lock_ignore_poison(&self.bindings).contains_key(operation)
    }

    /// Attach a listener for `operation` and start dispatching invocations
    /// to `factory`.
    pub async fn register(&self, operation: &str, factory: BoxedFactory) -> Result<()> {
        // ---
        let handle = self.transport.on(&self.namer.operation(operation)).await?;

        lock_ignore_poison(&self.bindings)
            .entry(operation.to_string())
            .or_default()
            .push(handle.id);

        let _dispatch = Self::start_dispatch_task(self.transport.clone(), handle, factory);
        Ok(())
    }

    /// Remove every listener and the bookkeeping entry for `operation`.
    ///
    /// Unknown names are ignored.
    pub fn unregister(&self, operation: &str) {
        // ---
        let ids = lock_ignore_poison(&self.bindings).remove(operation);
        let Some(ids) = ids else {
            return;
        };

        let channel = self.namer.operation(operation);
        for id in ids {
            self.transport.remove_listener(&channel, id);
        }
        log_debug!("unregistered {channel}");
    }

    /// Remove the liveness responder and every registered operation.
    pub fn unregister_all(&self) {
        // ---
        if let Some(id) = lock_ignore_poison(&self.responder).take() {
            self.transport
                .remove_listener(&self.namer.check_listener(), id);
        }

        let operations: Vec<String> = lock_ignore_poison(&self.bindings).keys().cloned().collect();
        for operation in operations {
            self.unregister(&operation);
        }
    }

    // Receive invocation messages for one registration until its listener is removed
    fn start_dispatch_task(
        transport: TransportPtr,
        mut handle: ListenerHandle,
        factory: BoxedFactory,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            log_debug!("dispatch task started for {}", handle.channel);

            while let Some(msg) = handle.inbox.recv().await {
                let invocation = match InvocationMessage::from_args(msg.args) {
                    Ok(invocation) => invocation,
                    Err(_err) => {
                        log_warn!("{}: dropping invocation from {}: {_err}", handle.channel, msg.sender);
                        continue;
                    }
                };

                // Attach before the producer can emit so a cancel sent after
                // the first envelope is never missed.
                let cancel_channel = ChannelNamer::cancel_channel(&invocation.sub_channel);
                let cancel = match transport.on(&cancel_channel).await {
                    Ok(cancel) => Some(cancel),
                    Err(_err) => {
                        log_warn!("{cancel_channel}: cancel listener unavailable: {_err}");
                        None
                    }
                };

                let token = CancellationToken::new();
                let stream = factory(invocation.args, token.clone());

                let driver = producer::ProducerDriver {
                    transport: transport.clone(),
                    reply_to: msg.sender,
                    sub_channel: invocation.sub_channel,
                    token,
                    cancel,
                };
                tokio::spawn(driver.drive(stream));
            }

            log_debug!("dispatch task stopped for {}", handle.channel);
        })
    }
}
