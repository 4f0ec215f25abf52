//! Domain layer public interface.
//!
//! This module defines domain-level abstractions that are independent of
//! concrete IPC mechanisms or protocol concerns.
//!
//! All domain consumers must import symbols via this module, not by
//! referencing individual files directly.

mod transport;

// --- Transport domain re-exports ---

pub use transport::{
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
