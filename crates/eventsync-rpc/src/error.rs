//! Transport-level error types.

use thiserror::Error;

use crate::request::JsonRpcError;

#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed (connection refused, non-2xx, body read).
    #[error("HTTP error: {0}")]
    Http(String),

    /// WebSocket connect/send/receive failure, or the connection closed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    /// Every candidate endpoint failed its chain-identity query.
    #[error("no reachable endpoint ({attempted} tried)")]
    NoReachableEndpoint { attempted: usize },

    /// The transport does not support the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` for connectivity failures (as opposed to node-side
    /// execution errors or malformed payloads).
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(TransportError::Timeout { ms: 10_000 }.is_connectivity());
        let revert = TransportError::Rpc(JsonRpcError {
            code: 3,
            message: "execution reverted".into(),
            data: None,
        });
        assert!(!revert.is_connectivity());
        assert_eq!(revert.to_string(), "RPC error 3: execution reverted");
    }
}
