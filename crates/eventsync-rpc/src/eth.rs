//! Typed EVM query surface over a raw JSON-RPC transport.
//!
//! [`EthQuery`] covers the four point-in-time calls the pipeline makes;
//! [`LogSubscriber`] covers the streaming side. Both are traits so tests can
//! drive the pipeline from an in-process fake chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::error::TransportError;
use crate::log::{parse_hex_u64, RawLog};
use crate::request::JsonRpcRequest;
use crate::subscriptions::NotificationReceiver;
use crate::transport::RpcTransport;

/// Inclusive block range over a set of emitting addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFilter {
    pub addresses: Vec<String>,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogFilter {
    fn to_json(&self) -> Value {
        json!({
            "address": self.addresses,
            "fromBlock": format!("0x{:x}", self.from_block),
            "toBlock": format!("0x{:x}", self.to_block),
        })
    }
}

#[async_trait]
pub trait EthQuery: Send + Sync {
    async fn chain_id(&self) -> Result<u64, TransportError>;

    async fn block_number(&self) -> Result<u64, TransportError>;

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError>;

    /// `eth_call` against the latest block; returns the raw return data.
    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// A live `logs` subscription.
pub struct LogSubscription {
    id: String,
    rx: NotificationReceiver,
}

impl LogSubscription {
    pub fn new(id: impl Into<String>, rx: NotificationReceiver) -> Self {
        Self { id: id.into(), rx }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Next log. `None` once the transport has closed the stream; an `Err`
    /// is either a transport failure or a push that is not a log object.
    pub async fn recv(&mut self) -> Option<Result<RawLog, TransportError>> {
        let item = self.rx.recv().await?;
        Some(item.and_then(|v| serde_json::from_value(v).map_err(TransportError::from)))
    }
}

#[async_trait]
pub trait LogSubscriber: Send + Sync {
    async fn subscribe_logs(&self, addresses: &[String]) -> Result<LogSubscription, TransportError>;
}

/// [`EthQuery`] over any [`RpcTransport`].
pub struct EthClient {
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
}

impl EthClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self { transport, next_id: AtomicU64::new(1) }
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    async fn request<R: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<R, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.transport.send(JsonRpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }

    async fn quantity(&self, method: &str) -> Result<u64, TransportError> {
        let hex: String = self.request(method, vec![]).await?;
        parse_hex_u64(&hex)
            .ok_or_else(|| TransportError::Other(format!("{method}: invalid quantity {hex:?}")))
    }
}

#[async_trait]
impl EthQuery for EthClient {
    async fn chain_id(&self) -> Result<u64, TransportError> {
        self.quantity("eth_chainId").await
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        self.quantity("eth_blockNumber").await
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        self.request("eth_getLogs", vec![filter.to_json()]).await
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let tx = json!({ "to": to, "data": format!("0x{}", hex::encode(data)) });
        let out: String = self.request("eth_call", vec![tx, json!("latest")]).await?;
        let digits = out.strip_prefix("0x").unwrap_or(&out);
        hex::decode(digits).map_err(|e| TransportError::Other(format!("eth_call: bad hex: {e}")))
    }
}
