use std::pin::Pin;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::macros::{log_debug, log_trace, log_warn};
use crate::{Endpoint, Envelope, ListenerHandle, TransportPtr};

/// Result stream produced for one invocation.
///
/// `Ok` values are sent as `item` envelopes; the first `Err` is sent as an
/// `error` envelope and ends the invocation.
pub type ProducerStream = Pin<Box<dyn Stream<Item = std::result::Result<Value, Value>> + Send>>;

/// Type-erased producer factory
///
/// Called with the invocation arguments and a token that is cancelled when
/// the caller cancels the invocation or its endpoint is destroyed.
///
/// Wrapped in Arc for cheap cloning into dispatch tasks.
pub(crate) type BoxedFactory =
    Arc<dyn Fn(Vec<Value>, CancellationToken) -> ProducerStream + Send + Sync>;

/// Wrap a typed producer factory into a type-erased one
///
/// This lets the registry store factories returning different stream types.
pub(crate) fn wrap_factory<F, S>(factory: F) -> BoxedFactory
where
    F: Fn(Vec<Value>, CancellationToken) -> S + Send + Sync + 'static,
    S: Stream<Item = std::result::Result<Value, Value>> + Send + 'static,
{
    // ---
    Arc::new(move |args, token| Box::pin(factory(args, token)) as ProducerStream)
}

/// Why a producer driver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DriveOutcome {
    /// Producer ended normally; `end` was sent.
    Completed,
    /// Producer failed; `error` was sent.
    Failed,
    /// Caller sent `cancel`.
    Cancelled,
    /// Caller endpoint was destroyed.
    CallerGone,
    /// Sending an envelope failed, or our own endpoint closed.
    TransportClosed,
}

/// Drives one producer and re-encodes its emissions onto a sub-channel.
pub(crate) struct ProducerDriver {
    pub transport: TransportPtr,
    pub reply_to: Endpoint,
    pub sub_channel: String,
    pub token: CancellationToken,
    pub cancel: Option<ListenerHandle>,
}

impl ProducerDriver {
    // ---
    pub async fn drive(mut self, mut producer: ProducerStream) -> DriveOutcome {
        // ---
        let caller_gone = self.transport.liveness(&self.reply_to);

        let outcome = loop {
            tokio::select! {
                biased;

                _ = caller_gone.cancelled() => break DriveOutcome::CallerGone,

                cancelled = next_cancel(&mut self.cancel, &self.reply_to) => {
                    if cancelled {
                        break DriveOutcome::Cancelled;
                    }
                    break DriveOutcome::TransportClosed;
                }

                next = producer.next() => {
                    let (envelope, stop) = match next {
                        Some(Ok(value)) => (Envelope::Item(value), None),
                        Some(Err(err)) => (Envelope::Error(err), Some(DriveOutcome::Failed)),
                        None => (Envelope::End, Some(DriveOutcome::Completed)),
                    };
                    if let Err(_err) = self.send(envelope).await {
                        log_warn!("{}: failed to send envelope: {_err}", self.sub_channel);
                        break DriveOutcome::TransportClosed;
                    }
                    if let Some(stop) = stop {
                        break stop;
                    }
                }
            }
        };

        // Dropping the producer here stops it before the token fires.
        drop(producer);

        match outcome {
            DriveOutcome::Cancelled | DriveOutcome::CallerGone => self.token.cancel(),
            _ => {}
        }

        if let Some(cancel) = self.cancel.take() {
            self.transport.remove_listener(&cancel.channel, cancel.id);
        }

        log_debug!("{}: producer finished ({outcome:?})", self.sub_channel);
        outcome
    }

    async fn send(&self, envelope: Envelope) -> crate::Result<()> {
        // ---
        log_trace!("{}: -> {} {}", self.sub_channel, self.reply_to, envelope.kind());
        self.transport
            .send(&self.reply_to, &self.sub_channel, envelope.into_args())
            .await
    }
}

/// Wait for a `cancel` envelope sent by `caller`.
///
/// Sub-channel numbers are only unique per invoker, so callers on other
/// endpoints may share this cancel channel; their envelopes are ignored.
/// Returns `false` if the cancel listener was detached underneath us. Other
/// envelope kinds on the cancel channel are ignored. Without a listener this
/// never resolves.
async fn next_cancel(cancel: &mut Option<ListenerHandle>, caller: &Endpoint) -> bool {
    // ---
    let Some(handle) = cancel.as_mut() else {
        return futures::future::pending().await;
    };

    loop {
        let Some(msg) = handle.inbox.recv().await else {
            return false;
        };
        if msg.sender != *caller {
            log_trace!("{}: ignoring envelope from {}", handle.channel, msg.sender);
            continue;
        }
        match Envelope::from_args(msg.args) {
            Ok(Envelope::Cancel) => return true,
            Ok(_other) => {
                log_warn!("{}: ignoring {} on cancel channel", handle.channel, _other.kind());
            }
            Err(_err) => log_warn!("{}: {_err}", handle.channel),
        }
    }
}
