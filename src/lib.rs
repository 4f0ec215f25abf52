//! Multiplexed stream RPC over a push-style duplex event channel
//!
//! This library turns a channel that can only broadcast named events with
//! argument lists into remote invocation of streaming operations. A caller
//! invokes a named operation on a target endpoint and receives a stream of
//! values terminated by completion or by a single error. It handles
//! per-invocation sub-channel allocation, the liveness handshake that turns
//! "nobody registered this" into an error, consumer cancellation, and
//! listener cleanup.
//!
//! Two roles share one [`RpcEngine`]: the handler owner registers producer
//! factories with [`RpcEngine::register`], and the invoker calls
//! [`RpcEngine::run`]. The event channel itself sits behind the
//! [`Transport`] trait; an in-process [`MemoryHub`] implementation ships
//! with the crate.
//!

// Import all sub modules once...
mod domain;
mod handshake;
mod naming;
mod protocol;
mod registry;
mod stream;
mod transport;

mod engine;
mod engine_builder;
mod engine_config;
mod transport_builder;

mod error;
mod macros;

// Re-export main types
pub use engine::RpcEngine;
pub use engine_builder::RpcEngineBuilder;
pub use engine_config::EngineConfig;
pub use stream::RemoteStream;
pub use transport_builder::TransportBuilder;

pub use naming::ChannelNamer;
pub use protocol::{Envelope, InvocationMessage};
pub use registry::ProducerStream;

pub use error::{Result, RpcError};

pub use transport::{create_memory_transport, create_memory_transport_with_hub, MemoryHub};

pub use tokio_util::sync::CancellationToken;

// --- public re-exports
pub use domain::{
    //
    Endpoint,
    ListenerHandle,
    ListenerId,
    Message,
    Transport,
    TransportBase,
    TransportConfig,
    TransportPtr,
};
