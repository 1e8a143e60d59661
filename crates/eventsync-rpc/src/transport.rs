//! The `RpcTransport` trait: request/response JSON-RPC over any wire.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::request::{JsonRpcRequest, JsonRpcResponse};

/// Object-safe transport, stored as `Arc<dyn RpcTransport>`.
///
/// Implementations perform exactly one attempt per call; retry belongs to
/// the caller.
#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError>;

    /// Endpoint URL, for logs.
    fn url(&self) -> &str;
}
