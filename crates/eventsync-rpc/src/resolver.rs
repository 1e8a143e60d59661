//! Endpoint resolution: pick the first working RPC endpoint and try to
//! establish the streaming side.
//!
//! A candidate counts as reachable once it answers `eth_chainId`. Streaming
//! failure does not fail resolution; it yields [`StreamHandle::Degraded`],
//! and the supervisor falls back to timed backfill. Resolution can be
//! repeated mid-run; [`FailoverQuery`] lets the new query endpoint replace
//! the old one under readers that already hold it.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::eth::{EthClient, EthQuery, LogFilter, LogSubscriber};
use crate::log::RawLog;
use crate::http::HttpTransport;
use crate::ws::{RedialingSubscriber, WsTransport};

/// Opens transports for a URL. The seam tests replace.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn query(&self, url: &str) -> Result<Arc<dyn EthQuery>, TransportError>;

    async fn stream(&self, url: &str) -> Result<Arc<dyn LogSubscriber>, TransportError>;
}

/// HTTP for queries, WebSocket for streaming.
#[derive(Debug, Clone)]
pub struct RpcConnector {
    pub request_timeout: Duration,
}

impl Default for RpcConnector {
    fn default() -> Self {
        Self { request_timeout: Duration::from_secs(10) }
    }
}

#[async_trait]
impl Connector for RpcConnector {
    async fn query(&self, url: &str) -> Result<Arc<dyn EthQuery>, TransportError> {
        let transport = HttpTransport::new(url, self.request_timeout)?;
        Ok(Arc::new(EthClient::new(Arc::new(transport))))
    }

    async fn stream(&self, url: &str) -> Result<Arc<dyn LogSubscriber>, TransportError> {
        let ws = tokio::time::timeout(self.request_timeout, WsTransport::connect(url))
            .await
            .map_err(|_| TransportError::Timeout { ms: self.request_timeout.as_millis() as u64 })??;
        Ok(Arc::new(RedialingSubscriber::new(ws, self.request_timeout)))
    }
}

#[derive(Clone)]
pub enum StreamHandle {
    Live(Arc<dyn LogSubscriber>),
    /// Only request/response queries are available.
    Degraded { reason: String },
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live(_) => f.write_str("Live"),
            Self::Degraded { reason } => f.debug_struct("Degraded").field("reason", reason).finish(),
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Clone)]
pub struct ResolvedEndpoint {
    pub url: String,
    pub chain_id: u64,
    pub query: Arc<dyn EthQuery>,
    pub stream: StreamHandle,
}

impl ResolvedEndpoint {
    pub fn is_degraded(&self) -> bool {
        matches!(self.stream, StreamHandle::Degraded { .. })
    }
}

/// [`EthQuery`] whose backing endpoint can be replaced while in use. Each
/// call goes to the endpoint that was current when it started.
pub struct FailoverQuery {
    current: RwLock<Arc<dyn EthQuery>>,
}

impl FailoverQuery {
    pub fn new(initial: Arc<dyn EthQuery>) -> Self {
        Self { current: RwLock::new(initial) }
    }

    pub fn replace(&self, next: Arc<dyn EthQuery>) {
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = next;
    }

    fn current(&self) -> Arc<dyn EthQuery> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EthQuery for FailoverQuery {
    async fn chain_id(&self) -> Result<u64, TransportError> {
        self.current().chain_id().await
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        self.current().block_number().await
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        self.current().get_logs(filter).await
    }

    async fn call(&self, to: &str, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.current().call(to, data).await
    }
}

pub struct EndpointResolver<C = RpcConnector> {
    connector: C,
    candidates: Vec<String>,
    ws_url: Option<String>,
    expected_chain_id: Option<u64>,
}

impl EndpointResolver<RpcConnector> {
    pub fn new(candidates: Vec<String>, ws_url: Option<String>) -> Self {
        Self::with_connector(RpcConnector::default(), candidates, ws_url)
    }
}

impl<C: Connector> EndpointResolver<C> {
    pub fn with_connector(connector: C, candidates: Vec<String>, ws_url: Option<String>) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(candidates.len());
        for url in candidates {
            if !unique.contains(&url) {
                unique.push(url);
            }
        }
        Self { connector, candidates: unique, ws_url, expected_chain_id: None }
    }

    /// Skip candidates that report a different chain id.
    pub fn expect_chain_id(mut self, chain_id: u64) -> Self {
        self.expected_chain_id = Some(chain_id);
        self
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Try candidates in order; the first that answers `eth_chainId` wins.
    pub async fn resolve(&self) -> Result<ResolvedEndpoint, TransportError> {
        let mut chosen = None;
        for url in &self.candidates {
            match self.check_endpoint(url).await {
                Ok((query, chain_id)) => {
                    tracing::info!(url = %url, chain_id, "RPC endpoint selected");
                    chosen = Some((url.clone(), chain_id, query));
                    break;
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "RPC endpoint unusable"),
            }
        }
        let Some((url, chain_id, query)) = chosen else {
            return Err(TransportError::NoReachableEndpoint { attempted: self.candidates.len() });
        };

        let stream = match &self.ws_url {
            None => StreamHandle::Degraded { reason: "no streaming endpoint configured".into() },
            Some(ws) => match self.connector.stream(ws).await {
                Ok(sub) => StreamHandle::Live(sub),
                Err(e) => StreamHandle::Degraded { reason: format!("{ws}: {e}") },
            },
        };
        if let StreamHandle::Degraded { reason } = &stream {
            tracing::warn!(reason = %reason, "streaming unavailable, running degraded (polling only)");
        }

        Ok(ResolvedEndpoint { url, chain_id, query, stream })
    }

    async fn check_endpoint(&self, url: &str) -> Result<(Arc<dyn EthQuery>, u64), TransportError> {
        let query = self.connector.query(url).await?;
        let chain_id = query.chain_id().await?;
        if let Some(expected) = self.expected_chain_id {
            if chain_id != expected {
                return Err(TransportError::Other(format!(
                    "chain id {chain_id} does not match expected {expected}"
                )));
            }
        }
        Ok((query, chain_id))
    }
}
