//! Transport builder for creating transport instances.
//!
//! Provides a fluent builder API for constructing transports with clear
//! separation between required and optional configuration.

use std::sync::Arc;

use crate::{MemoryHub, Result, RpcError, TransportConfig, TransportPtr};

/// Builder for creating transport instances.
///
/// # Examples
///
/// ## Two endpoints on a private hub
/// ```
/// use stream_rpc::{MemoryHub, TransportBuilder};
///
/// # async fn example() -> stream_rpc::Result<()> {
/// let hub = MemoryHub::new();
/// let main = TransportBuilder::new()
///     .node_id("main")
///     .hub(hub.clone())
///     .build()
///     .await?;
/// let renderer = TransportBuilder::new()
///     .node_id("renderer")
///     .hub(hub)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct TransportBuilder {
    node_id: Option<String>,
    transport_type: Option<String>,
    hub: Option<Arc<MemoryHub>>,
}

impl TransportBuilder {
    /// Create a new transport builder.
    pub fn new() -> Self {
        Self {
            node_id: None,
            transport_type: None,
            hub: None,
        }
    }

    /// Set the node ID (required). It becomes the endpoint identity.
    pub fn node_id(mut self, id: impl Into<String>) -> Self {
        self.node_id = Some(id.into());
        self
    }

    /// Set explicit transport type.
    ///
    /// Valid values: `"memory"`. Defaults to memory when not specified.
    pub fn transport_type(mut self, flag: impl Into<String>) -> Self {
        self.transport_type = Some(flag.into());
        self
    }

    /// Attach to an explicit hub instead of the process-global one.
    ///
    /// Only meaningful for the memory transport.
    pub fn hub(mut self, hub: Arc<MemoryHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    /// Build the transport (consumes self).
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - `node_id` is missing or empty
    /// - `transport_type` names an unknown transport
    /// - a hub is given together with a non-memory transport type
    /// - transport creation fails
    pub async fn build(self) -> Result<TransportPtr> {
        // ---
        let node_id = self
            .node_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RpcError::MissingConfig("node_id".into()))?;

        let config = TransportConfig {
            node_id,
            transport_type: self.transport_type.clone(),
        };

        match (self.transport_type.as_deref(), self.hub) {
            (None | Some("memory"), Some(hub)) => {
                crate::create_memory_transport_with_hub(config, hub).await
            }
            (None | Some("memory"), None) => crate::create_memory_transport(config).await,
            (Some(other), _) => Err(RpcError::ConfigConflict(format!(
                "unrecognized transport_type: {other}, valid values: memory"
            ))),
        }
    }
}

impl Default for TransportBuilder {
    fn default() -> Self {
        Self::new()
    }
}
