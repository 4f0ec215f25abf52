use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during stream RPC operations
#[derive(Error, Debug)]
pub enum RpcError {
    /// The target has no producer registered for the requested operation
    #[error("invalid operation: `{0}`")]
    InvalidOperation(String),

    /// The remote producer failed; the payload is passed through verbatim
    #[error("remote producer failed: {0}")]
    Remote(Value),

    /// The transport dropped a listener before a terminal envelope arrived
    #[error("connection lost")]
    ConnectionLost,

    /// Malformed data on the wire
    #[error("protocol error: {0}")]
    Protocol(String),

    /// JSON serialization or deserialization failed
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// A required configuration value was not provided
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// Configuration values contradict each other
    #[error("configuration conflict: {0}")]
    ConfigConflict(String),
}

impl RpcError {
    /// Payload of a remote producer failure, if this is one.
    pub fn remote_payload(&self) -> Option<&Value> {
        match self {
            RpcError::Remote(payload) => Some(payload),
            _ => None,
        }
    }
}

/// Result type alias for stream RPC operations
pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use serde_json::json;

    #[test]
    fn invalid_operation_names_the_operation() {
        // ---
        let err = RpcError::InvalidOperation("invalid".into());
        assert_eq!(err.to_string(), "invalid operation: `invalid`");
    }

    #[test]
    fn remote_payload_is_verbatim() {
        // ---
        let err = RpcError::Remote(json!("Test Error"));
        assert_eq!(err.remote_payload(), Some(&json!("Test Error")));
        assert!(RpcError::ConnectionLost.remote_payload().is_none());
    }
}
