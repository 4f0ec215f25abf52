//! Invoker side of an invocation: the cold result stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::Stream;
use serde_json::Value;

use crate::engine::Inner;
use crate::handshake;
use crate::macros::{log_debug, log_error, log_trace, log_warn};
use crate::naming::ChannelNamer;
use crate::{Endpoint, Envelope, InvocationMessage, ListenerId, Result, RpcError, TransportPtr};

/// Result stream of one remote invocation.
///
/// Returned by [`RpcEngine::run`](crate::RpcEngine::run). The stream is cold:
/// nothing is sent until it is first polled. Each item is either a value
/// produced remotely or the single error that ends the stream:
///
/// - [`RpcError::Remote`] when the producer failed,
/// - [`RpcError::InvalidOperation`] when the target has no such operation,
/// - [`RpcError::ConnectionLost`] when the transport detached the listener.
///
/// Dropping the stream before it ends removes its sub-channel listener and
/// asks the producer to stop.
pub struct RemoteStream {
    inner: Pin<Box<dyn Stream<Item = Result<Value>> + Send>>,
}

impl Stream for RemoteStream {
    type Item = Result<Value>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for RemoteStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStream").finish_non_exhaustive()
    }
}

/// Owns the decode listener of one sub-channel.
///
/// `settle` removes the listener once a terminal envelope has been seen.
/// Dropping an unsettled guard is a consumer cancellation: the listener is
/// removed and a `cancel` envelope is sent upstream.
struct SubChannelGuard {
    transport: TransportPtr,
    sub_channel: String,
    id: ListenerId,
    target: Endpoint,
    settled: bool,
}

impl SubChannelGuard {
    fn settle(&mut self) {
        if !self.settled {
            self.settled = true;
            self.transport.remove_listener(&self.sub_channel, self.id);
        }
    }
}

impl Drop for SubChannelGuard {
    fn drop(&mut self) {
        // ---
        if self.settled {
            return;
        }
        self.settled = true;
        self.transport.remove_listener(&self.sub_channel, self.id);
        log_debug!("{}: cancelled by consumer", self.sub_channel);

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let transport = self.transport.clone();
        let target = self.target.clone();
        let channel = ChannelNamer::cancel_channel(&self.sub_channel);
        runtime.spawn(async move {
            if let Err(_err) = transport.send(&target, &channel, Envelope::Cancel.into_args()).await {
                log_warn!("{channel}: failed to send cancel: {_err}");
            }
        });
    }
}

enum Step {
    Delivered(Option<crate::Message>),
    Checked(Result<()>),
}

impl RemoteStream {
    pub(crate) fn new(
        engine: Arc<Inner>,
        operation: String,
        target: Option<Endpoint>,
        args: Vec<Value>,
    ) -> Self {
        // ---
        let stream = async_stream::stream! {
            let target = target.unwrap_or_else(|| engine.default_target.clone());
            let transport = engine.transport.clone();
            let sub_channel = engine.next_sub_channel(&operation);

            // Listen before sending so no envelope can be missed.
            let mut decoder = match transport.on(&sub_channel).await {
                Ok(handle) => handle,
                Err(err) => {
                    log_error!("{sub_channel}: cannot listen for results: {err}");
                    yield Err(err);
                    return;
                }
            };
            let mut guard = SubChannelGuard {
                transport: transport.clone(),
                sub_channel: sub_channel.clone(),
                id: decoder.id,
                target: target.clone(),
                settled: false,
            };

            let mut check = Box::pin(handshake::check_remote(
                transport.clone(),
                engine.namer.clone(),
                operation.clone(),
                target.clone(),
            ));
            let mut check_pending = true;

            log_debug!("{sub_channel}: invoking {operation} on {target}");
            let invocation = InvocationMessage::new(sub_channel.clone(), args);
            if let Err(err) = transport
                .send(&target, &engine.namer.operation(&operation), invocation.into_args())
                .await
            {
                guard.settle();
                yield Err(err);
                return;
            }

            loop {
                let step = tokio::select! {
                    biased;
                    msg = decoder.inbox.recv() => Step::Delivered(msg),
                    verdict = &mut check, if check_pending => Step::Checked(verdict),
                };

                match step {
                    Step::Delivered(Some(msg)) => {
                        // Sub-channel numbers are per invoker; only the target answers here.
                        if msg.sender != target {
                            log_warn!("{sub_channel}: ignoring envelope from {}", msg.sender);
                            continue;
                        }
                        let envelope = match Envelope::from_args(msg.args) {
                            Ok(envelope) => envelope,
                            Err(_err) => {
                                log_warn!("{sub_channel}: dropping envelope from {}: {_err}", msg.sender);
                                continue;
                            }
                        };
                        if envelope.is_terminal() {
                            guard.settle();
                        }
                        match envelope {
                            Envelope::Item(value) => yield Ok(value),
                            Envelope::Error(payload) => {
                                yield Err(RpcError::Remote(payload));
                                return;
                            }
                            Envelope::End => {
                                log_trace!("{sub_channel}: completed");
                                return;
                            }
                            Envelope::Cancel => {
                                log_warn!("{sub_channel}: unexpected cancel from {}", msg.sender);
                            }
                        }
                    }
                    Step::Delivered(None) => {
                        guard.settle();
                        yield Err(RpcError::ConnectionLost);
                        return;
                    }
                    Step::Checked(Ok(())) => {
                        check_pending = false;
                        log_trace!("{sub_channel}: {target} confirmed {operation}");
                    }
                    Step::Checked(Err(err)) => {
                        guard.settle();
                        yield Err(err);
                        return;
                    }
                }
            }
        };

        Self {
            inner: Box::pin(stream),
        }
    }
}
