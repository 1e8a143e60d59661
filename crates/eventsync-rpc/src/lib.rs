//! eventsync-rpc — JSON-RPC transports and endpoint resolution.
//!
//! - [`RpcTransport`]: single-attempt request/response over HTTP or WebSocket
//! - [`EthQuery`] / [`LogSubscriber`]: the typed chain surface the pipeline uses
//! - [`EndpointResolver`]: ordered failover across candidate endpoints, with
//!   degraded mode when no streaming transport can be opened

pub mod error;
pub mod eth;
pub mod http;
pub mod log;
pub mod request;
pub mod resolver;
pub mod subscriptions;
pub mod transport;
pub mod ws;

pub use error::TransportError;
pub use eth::{EthClient, EthQuery, LogFilter, LogSubscriber, LogSubscription};
pub use http::HttpTransport;
pub use log::RawLog;
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcId};
pub use resolver::{Connector, EndpointResolver, FailoverQuery, ResolvedEndpoint, RpcConnector, StreamHandle};
pub use subscriptions::{SubscriptionId, SubscriptionManager};
pub use transport::RpcTransport;
pub use ws::{RedialingSubscriber, WsTransport};
