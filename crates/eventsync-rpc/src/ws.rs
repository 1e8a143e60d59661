//! WebSocket JSON-RPC transport with log subscriptions.
//!
//! A background task owns the socket and multiplexes caller requests over
//! it. Request ids are rewritten to a connection-local counter so that
//! concurrent callers cannot collide, then restored on the response.
//!
//! [`WsTransport`] does not reconnect. When the socket closes, every pending
//! request and every open subscription receives an error. [`RedialingSubscriber`]
//! dials a fresh connection on the next subscribe once the old one is gone,
//! so the supervisor decides when reconnection happens.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::TransportError;
use crate::eth::{LogSubscriber, LogSubscription};
use crate::request::{JsonRpcRequest, JsonRpcResponse, RpcId, SubscriptionNotification};
use crate::subscriptions::{SubscriptionId, SubscriptionManager};
use crate::transport::RpcTransport;

type Socket = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type Reply = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;

enum WsCommand {
    Send { req: JsonRpcRequest, tx: Reply },
    Close,
}

pub struct WsTransport {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
    next_id: AtomicU64,
}

impl WsTransport {
    /// Dial `url` and complete the handshake before returning, so an
    /// unreachable streaming endpoint is reported here rather than later.
    pub async fn connect(url: impl Into<String>) -> Result<Self, TransportError> {
        let url = url.into();
        let (ws_stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(format!("connect {url}: {e}")))?;
        tracing::info!(url = %url, "WebSocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let subscriptions = SubscriptionManager::new();
        tokio::spawn(ws_task(url.clone(), ws_stream, cmd_rx, subscriptions.clone()));

        Ok(Self { url, cmd_tx, subscriptions, next_id: AtomicU64::new(1) })
    }

    /// Whether the background task is still running.
    pub fn is_open(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let resp = self.send(JsonRpcRequest::new(id, method, params)).await?;
        resp.into_result().map_err(TransportError::Rpc)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcTransport for WsTransport {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send { req, tx })
            .map_err(|_| TransportError::WebSocket("connection closed".into()))?;
        rx.await
            .map_err(|_| TransportError::WebSocket("response dropped".into()))?
    }

    fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl LogSubscriber for WsTransport {
    async fn subscribe_logs(&self, addresses: &[String]) -> Result<LogSubscription, TransportError> {
        let result = self
            .request("eth_subscribe", vec![json!("logs"), json!({ "address": addresses })])
            .await?;
        let id = result
            .as_str()
            .ok_or_else(|| TransportError::Other(format!("unexpected eth_subscribe result: {result}")))?
            .to_string();
        let rx = self.subscriptions.register(SubscriptionId(id.clone()));
        tracing::debug!(subscription = %id, contracts = addresses.len(), "subscribed to logs");
        Ok(LogSubscription::new(id, rx))
    }
}

/// [`LogSubscriber`] that replaces a closed [`WsTransport`] on the next
/// subscribe.
pub struct RedialingSubscriber {
    url: String,
    connect_timeout: Duration,
    current: Mutex<Option<Arc<WsTransport>>>,
}

impl RedialingSubscriber {
    /// Wrap an already-open transport; redials give up after `connect_timeout`.
    pub fn new(initial: WsTransport, connect_timeout: Duration) -> Self {
        Self {
            url: initial.url.clone(),
            connect_timeout,
            current: Mutex::new(Some(Arc::new(initial))),
        }
    }

    async fn transport(&self) -> Result<Arc<WsTransport>, TransportError> {
        let mut current = self.current.lock().await;
        if let Some(ws) = current.as_ref().filter(|ws| ws.is_open()) {
            return Ok(ws.clone());
        }
        tracing::info!(url = %self.url, "redialing WebSocket");
        let ws = tokio::time::timeout(self.connect_timeout, WsTransport::connect(self.url.clone()))
            .await
            .map_err(|_| TransportError::Timeout { ms: self.connect_timeout.as_millis() as u64 })??;
        let ws = Arc::new(ws);
        *current = Some(ws.clone());
        Ok(ws)
    }
}

#[async_trait]
impl LogSubscriber for RedialingSubscriber {
    async fn subscribe_logs(&self, addresses: &[String]) -> Result<LogSubscription, TransportError> {
        self.transport().await?.subscribe_logs(addresses).await
    }
}

/// In-flight requests keyed by the connection-local id.
struct Pending {
    original_id: RpcId,
    tx: Reply,
}

async fn ws_task(
    url: String,
    ws_stream: Socket,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionManager,
) {
    let (mut sink, mut stream) = ws_stream.split();
    let mut pending: HashMap<u64, Pending> = HashMap::new();
    let mut wire_id: u64 = 0;

    let reason = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => match cmd {
                None | Some(WsCommand::Close) => {
                    let _ = sink.send(Message::Close(None)).await;
                    break "transport dropped".to_string();
                }
                Some(WsCommand::Send { mut req, tx }) => {
                    wire_id += 1;
                    let original_id = std::mem::replace(&mut req.id, RpcId::Number(wire_id));
                    let text = match serde_json::to_string(&req) {
                        Ok(t) => t,
                        Err(e) => {
                            let _ = tx.send(Err(e.into()));
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        let _ = tx.send(Err(TransportError::WebSocket(e.to_string())));
                        break format!("send failed: {e}");
                    }
                    pending.insert(wire_id, Pending { original_id, tx });
                }
            },
            msg = stream.next() => match msg {
                None => break "stream ended".to_string(),
                Some(Err(e)) => break format!("receive error: {e}"),
                Some(Ok(Message::Text(text))) => {
                    handle_message(text.as_str(), &mut pending, &subscriptions);
                }
                Some(Ok(Message::Close(frame))) => {
                    break format!("closed by server: {frame:?}");
                }
                Some(Ok(_)) => {}
            },
        }
    };

    tracing::warn!(url = %url, reason = %reason, pending = pending.len(), "WebSocket session ended");
    for (_, p) in pending.drain() {
        let _ = p.tx.send(Err(TransportError::WebSocket(reason.clone())));
    }
    subscriptions.fail_all(&reason);
}

fn handle_message(text: &str, pending: &mut HashMap<u64, Pending>, subscriptions: &SubscriptionManager) {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("ignoring non-JSON WebSocket frame");
        return;
    };

    if value.get("method").and_then(Value::as_str) == Some("eth_subscription") {
        match serde_json::from_value::<SubscriptionNotification>(value) {
            Ok(n) => subscriptions.dispatch(&SubscriptionId(n.params.subscription), n.params.result),
            Err(e) => tracing::debug!(error = %e, "malformed subscription notification"),
        }
        return;
    }

    let Ok(mut resp) = serde_json::from_value::<JsonRpcResponse>(value) else {
        tracing::debug!("ignoring unrecognised WebSocket message");
        return;
    };
    let wire_id = match &resp.id {
        RpcId::Number(n) => *n,
        _ => return,
    };
    if let Some(p) = pending.remove(&wire_id) {
        resp.id = p.original_id;
        let _ = p.tx.send(Ok(resp));
    }
}
