//! Public, transport-agnostic engine configuration.
//!
//! This type intentionally contains no transport-specific concepts. The
//! transport is configured separately through
//! [`TransportBuilder`](crate::TransportBuilder).

use crate::Endpoint;

/// Engine configuration.
///
/// # Example
///
/// ```
/// use stream_rpc::{Endpoint, EngineConfig};
///
/// let config = EngineConfig::new()
///     .with_prefix("$foo/")
///     .with_default_target(Endpoint::from("main"));
/// assert_eq!(config.prefix.as_deref(), Some("$foo/"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    // ---
    /// Namespace prepended to every wire channel this engine sends on or
    /// listens to.
    ///
    /// Engines sharing one transport must use disjoint prefixes. `None`
    /// means no prefix.
    pub prefix: Option<String>,

    /// Endpoint targeted by [`RpcEngine::run`](crate::RpcEngine::run) when
    /// no explicit target is given.
    ///
    /// `None` means the engine's own endpoint, which is what same-process
    /// setups and tests want.
    pub default_target: Option<Endpoint>,
}

impl EngineConfig {
    /// Configuration with no prefix that targets the engine itself.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the channel prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set the default invocation target.
    pub fn with_default_target(mut self, target: impl Into<Endpoint>) -> Self {
        self.default_target = Some(target.into());
        self
    }
}
