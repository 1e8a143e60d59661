//! Error taxonomy for the ingestion pipeline.

use thiserror::Error;

/// Errors that can occur while ingesting and reconciling chain events.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Every candidate RPC endpoint failed its chain-identity query.
    #[error("no reachable RPC endpoint ({attempted} candidates tried)")]
    EndpointUnreachable { attempted: usize },

    /// Degraded mode: only request/response queries are available.
    #[error("streaming unsupported: {reason}")]
    StreamingUnsupported { reason: String },

    /// A single contract read failed (transport or decode).
    #[error("contract call {method} failed: {reason}")]
    ContractCall { method: String, reason: String },

    /// A reconciliation lookup could not find the expected record.
    #[error("{entity} not found: {key}")]
    RecordNotFound { entity: &'static str, key: String },

    /// A create hit an existing row with the same key.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// Store write or read failed.
    #[error("storage error: {0}")]
    Persistence(String),

    /// The log does not carry what its kind requires.
    #[error("malformed {kind} log: {reason}")]
    MalformedLog { kind: String, reason: String },

    /// Transport-level subscription failure; ends the listening session.
    #[error("subscription error: {0}")]
    Subscription(String),

    /// Head-block or range query failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl SyncError {
    /// Returns `true` for create conflicts, which handlers answer with an update.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Returns `true` for connectivity failures: they end a listening
    /// session and make the supervisor resolve endpoints again.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Subscription(_) | Self::EndpointUnreachable { .. })
    }
}
