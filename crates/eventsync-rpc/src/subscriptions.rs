//! Routing of `eth_subscription` pushes to per-subscription channels.
//!
//! A node may push the first notification before the caller has seen the
//! `eth_subscribe` response and registered its channel. Such early pushes
//! are parked per subscription id and flushed on registration.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Upper bound on parked notifications across all unknown ids.
const MAX_ORPHANS: usize = 1024;

/// Subscription id returned by `eth_subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub String);

impl From<String> for SubscriptionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub type NotificationSender = mpsc::UnboundedSender<Result<Value, TransportError>>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Result<Value, TransportError>>;

#[derive(Default)]
struct Inner {
    senders: HashMap<SubscriptionId, NotificationSender>,
    orphans: HashMap<SubscriptionId, Vec<Value>>,
    orphan_count: usize,
}

#[derive(Clone, Default)]
pub struct SubscriptionManager {
    inner: Arc<Mutex<Inner>>,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned map is still structurally valid.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a channel for `id`, replaying anything that arrived early.
    pub fn register(&self, id: SubscriptionId) -> NotificationReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if let Some(parked) = inner.orphans.remove(&id) {
            inner.orphan_count -= parked.len();
            for value in parked {
                let _ = tx.send(Ok(value));
            }
        }
        inner.senders.insert(id, tx);
        rx
    }

    /// Forward a notification. Closed receivers are pruned.
    pub fn dispatch(&self, id: &SubscriptionId, message: Value) {
        let mut inner = self.lock();
        match inner.senders.get(id) {
            Some(tx) => {
                if tx.send(Ok(message)).is_err() {
                    inner.senders.remove(id);
                }
            }
            None => {
                if inner.orphan_count >= MAX_ORPHANS {
                    tracing::debug!(subscription = %id, "dropping notification for unknown subscription");
                    return;
                }
                inner.orphan_count += 1;
                inner.orphans.entry(id.clone()).or_default().push(message);
            }
        }
    }

    /// Deliver a terminal error to every subscriber and forget them all.
    pub fn fail_all(&self, reason: &str) {
        let mut inner = self.lock();
        for (_, tx) in inner.senders.drain() {
            let _ = tx.send(Err(TransportError::WebSocket(reason.to_string())));
        }
        inner.orphans.clear();
        inner.orphan_count = 0;
    }

    #[cfg(test)]
    fn subscribers(&self) -> usize {
        self.lock().senders.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn early_notification_replayed_on_register() {
        let mgr = SubscriptionManager::new();
        let id = SubscriptionId("0xfeed".into());
        mgr.dispatch(&id, json!({"blockNumber": "0x1"}));

        let mut rx = mgr.register(id.clone());
        mgr.dispatch(&id, json!({"blockNumber": "0x2"}));

        assert_eq!(rx.try_recv().unwrap().unwrap()["blockNumber"], "0x1");
        assert_eq!(rx.try_recv().unwrap().unwrap()["blockNumber"], "0x2");
    }

    #[test]
    fn dropped_receiver_is_pruned() {
        let mgr = SubscriptionManager::new();
        let id = SubscriptionId("0x1".into());
        drop(mgr.register(id.clone()));
        assert_eq!(mgr.subscribers(), 1);
        mgr.dispatch(&id, json!({}));
        assert_eq!(mgr.subscribers(), 0);
    }

    #[test]
    fn fail_all_delivers_error_then_closes() {
        let mgr = SubscriptionManager::new();
        let mut rx = mgr.register(SubscriptionId("0xa".into()));
        mgr.fail_all("connection closed");

        assert!(rx.try_recv().unwrap().is_err());
        assert!(rx.try_recv().is_err());
        assert_eq!(mgr.subscribers(), 0);
    }
}
