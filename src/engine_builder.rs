//! RPC engine builder.
//!
//! Provides a fluent builder API for configuring engine instances with a
//! channel prefix and a default invocation target.

use crate::{Endpoint, EngineConfig, Result, RpcEngine, RpcError, TransportPtr};

/// Builder for creating RPC engine instances.
///
/// # Examples
///
/// ## Handler owner with a namespaced prefix
/// ```no_run
/// use stream_rpc::{RpcEngineBuilder, TransportBuilder};
///
/// # async fn example() -> stream_rpc::Result<()> {
/// let transport = TransportBuilder::new().node_id("main").build().await?;
///
/// let engine = RpcEngineBuilder::new(transport)
///     .prefix("$foo/")
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Invoker that targets a peer by default
/// ```no_run
/// use stream_rpc::{Endpoint, RpcEngineBuilder, TransportBuilder};
///
/// # async fn example() -> stream_rpc::Result<()> {
/// let transport = TransportBuilder::new().node_id("renderer").build().await?;
///
/// let engine = RpcEngineBuilder::new(transport)
///     .default_target(Endpoint::from("main"))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RpcEngineBuilder {
    // ---
    transport: TransportPtr,
    prefix: Option<String>,
    default_target: Option<Endpoint>,

    // Whether a full config was supplied (conflicts detected at build())
    config: Option<EngineConfig>,
}

impl RpcEngineBuilder {
    /// Create a new engine builder over `transport`.
    pub fn new(transport: TransportPtr) -> Self {
        // ---
        Self {
            transport,
            prefix: None,
            default_target: None,
            config: None,
        }
    }

    /// Namespace every wire channel of the engine with `prefix`.
    ///
    /// Default: no prefix.
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Endpoint used by `run` when no target is given.
    ///
    /// Default: the transport's own endpoint.
    pub fn default_target(mut self, target: impl Into<Endpoint>) -> Self {
        self.default_target = Some(target.into());
        self
    }

    /// Use a complete [`EngineConfig`].
    ///
    /// Cannot be combined with the individual setters.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the engine (consumes self).
    ///
    /// Attaches the liveness responder before returning, so the engine
    /// answers liveness queries as soon as it exists.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `config()` was combined with `prefix()` or `default_target()`
    /// - the transport refuses the responder listener
    pub async fn build(self) -> Result<RpcEngine> {
        // ---
        let has_setters = self.prefix.is_some() || self.default_target.is_some();

        let config = match self.config {
            Some(_) if has_setters => {
                return Err(RpcError::ConfigConflict(
                    "Cannot use both config() and individual setters (prefix, default_target)"
                        .into(),
                ));
            }
            Some(config) => config,
            None => EngineConfig {
                prefix: self.prefix,
                default_target: self.default_target,
            },
        };

        RpcEngine::new(self.transport, config).await
    }
}
