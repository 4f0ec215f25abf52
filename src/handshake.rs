//! Liveness handshake.
//!
//! An invocation message is fire-and-forget: without a check, invoking an
//! operation nobody registered would hang forever with neither data nor
//! error. Every engine therefore answers liveness queries on
//! `<prefix>check-listener`, and every invocation asks its target once.
//!
//! The check runs alongside data delivery and never gates it; a positive
//! reply is informational, a negative one becomes a stream error. There is
//! no timeout: a target that never answers leaves the check pending until
//! the target endpoint is destroyed.

use std::sync::Weak;

use serde_json::Value;
use tokio::task::JoinHandle;

use crate::macros::{log_debug, log_trace, log_warn};
use crate::naming::ChannelNamer;
use crate::registry::HandlerRegistry;
use crate::{Endpoint, ListenerHandle, ListenerId, Result, RpcError, TransportPtr};

/// Answer liveness queries until the responder listener is removed or the
/// registry is gone.
pub(crate) fn start_responder(
    transport: TransportPtr,
    namer: ChannelNamer,
    registry: Weak<HandlerRegistry>,
    mut handle: ListenerHandle,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log_debug!("liveness responder started on {}", handle.channel);

        while let Some(msg) = handle.inbox.recv().await {
            let Some(operation) = msg.args.first().and_then(Value::as_str) else {
                log_warn!("{}: liveness query from {} without operation name", handle.channel, msg.sender);
                continue;
            };
            let Some(registry) = registry.upgrade() else {
                break;
            };

            let registered = registry.is_registered(operation);
            log_trace!("liveness query from {} for {operation}: {registered}", msg.sender);

            let reply = namer.check_reply(operation);
            if let Err(_err) = transport.send(&msg.sender, &reply, vec![Value::Bool(registered)]).await {
                log_warn!("{reply}: failed to answer {}: {_err}", msg.sender);
            }
        }

        log_debug!("liveness responder stopped on {}", handle.channel);
    })
}

/// Detaches a reply listener that never fired.
struct ReplyGuard {
    transport: TransportPtr,
    channel: String,
    id: ListenerId,
}

impl Drop for ReplyGuard {
    fn drop(&mut self) {
        // No-op if the once-listener already fired.
        self.transport.remove_listener(&self.channel, self.id);
    }
}

/// Ask `target` whether it has a producer registered for `operation`.
///
/// Resolves `Ok(())` on a `true` reply. Resolves
/// [`RpcError::InvalidOperation`] on any other reply or when `target` is
/// destroyed first. Dropping the future detaches the reply listener.
pub(crate) async fn check_remote(
    transport: TransportPtr,
    namer: ChannelNamer,
    operation: String,
    target: Endpoint,
) -> Result<()> {
    // ---
    let reply_channel = namer.check_reply(&operation);
    let mut reply = transport.once(&reply_channel).await?;
    let _guard = ReplyGuard {
        transport: transport.clone(),
        channel: reply_channel,
        id: reply.id,
    };

    transport
        .send(&target, &namer.check_listener(), vec![Value::from(operation.as_str())])
        .await?;

    let target_gone = transport.liveness(&target);

    tokio::select! {
        biased;

        msg = reply.inbox.recv() => match msg {
            Some(msg) if msg.args.first() == Some(&Value::Bool(true)) => Ok(()),
            Some(_) => Err(RpcError::InvalidOperation(operation)),
            None => Err(RpcError::ConnectionLost),
        },

        _ = target_gone.cancelled() => {
            log_debug!("{target} went away before answering liveness query for {operation}");
            Err(RpcError::InvalidOperation(operation))
        }
    }
}
