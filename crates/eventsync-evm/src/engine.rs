//! Live subscription engine.
//!
//! ```text
//! Disconnected → Subscribing → Listening → Done   (cancelled)
//!                     │            └─────→ Error  (transport failure)
//!                     └──────────────────→ Error  (subscribe failed / degraded)
//! ```
//!
//! One session per engine. [`run`](SubscriptionEngine::run) is
//! [`subscribe`](SubscriptionEngine::subscribe) followed by
//! [`listen`](SubscriptionEngine::listen); the supervisor calls them
//! separately so it can backfill while pushes queue on the open subscription.
//! Logs are dispatched one at a time in arrival order; cancellation is
//! observed between logs, never in the middle of a handler.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use eventsync_core::SyncError;
use eventsync_rpc::{LogSubscription, StreamHandle, TransportError};

use crate::dispatch::{Dispatcher, Source};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Disconnected,
    Subscribing,
    Listening,
    Error,
    Done,
}

pub struct SubscriptionEngine {
    stream: StreamHandle,
    dispatcher: Arc<Dispatcher>,
    addresses: Vec<String>,
    heartbeat: Duration,
    state: EngineState,
    subscription: Option<LogSubscription>,
    reached_listening: bool,
    processed: u64,
}

impl SubscriptionEngine {
    pub fn new(
        stream: StreamHandle,
        dispatcher: Arc<Dispatcher>,
        addresses: Vec<String>,
        heartbeat: Duration,
    ) -> Self {
        Self {
            stream,
            dispatcher,
            addresses,
            heartbeat,
            state: EngineState::Disconnected,
            subscription: None,
            reached_listening: false,
            processed: 0,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Whether this session got as far as [`EngineState::Listening`].
    pub fn reached_listening(&self) -> bool {
        self.reached_listening
    }

    /// Logs dispatched in this session.
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Subscribe and process logs until cancelled (`Ok`) or the transport
    /// fails (`Err`). In degraded mode returns
    /// [`SyncError::StreamingUnsupported`] without subscribing.
    pub async fn run(&mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        self.subscribe().await?;
        self.listen(cancel).await
    }

    /// Open the subscription and enter [`EngineState::Listening`]. Pushes
    /// queue on the subscription until [`listen`](Self::listen) drains them.
    pub async fn subscribe(&mut self) -> Result<(), SyncError> {
        let subscriber = match &self.stream {
            StreamHandle::Live(s) => s.clone(),
            StreamHandle::Degraded { reason } => {
                self.state = EngineState::Error;
                return Err(SyncError::StreamingUnsupported { reason: reason.clone() });
            }
        };

        self.state = EngineState::Subscribing;
        let subscription = match subscriber.subscribe_logs(&self.addresses).await {
            Ok(s) => s,
            Err(e) => {
                self.state = EngineState::Error;
                return Err(SyncError::Subscription(format!("subscribe: {e}")));
            }
        };

        self.state = EngineState::Listening;
        self.reached_listening = true;
        tracing::info!(subscription = subscription.id(), contracts = self.addresses.len(), "listening for logs");
        self.subscription = Some(subscription);
        Ok(())
    }

    /// Dispatch logs from the open subscription until cancelled or the
    /// transport fails.
    pub async fn listen(&mut self, cancel: &CancellationToken) -> Result<(), SyncError> {
        let Some(mut subscription) = self.subscription.take() else {
            self.state = EngineState::Error;
            return Err(SyncError::Subscription("listen called without a subscription".into()));
        };

        let mut heartbeat = interval_at(Instant::now() + self.heartbeat, self.heartbeat);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    self.state = EngineState::Done;
                    tracing::info!(processed = self.processed, "subscription engine stopped");
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    tracing::info!(processed = self.processed, "subscription heartbeat");
                }
                item = subscription.recv() => match item {
                    Some(Ok(log)) => {
                        if let Err(e) = self.dispatcher.dispatch(&log, Source::Live).await {
                            self.state = EngineState::Error;
                            return Err(e);
                        }
                        self.processed += 1;
                    }
                    Some(Err(TransportError::Deserialization(e))) => {
                        tracing::warn!(error = %e, "ignoring subscription push that is not a log");
                    }
                    Some(Err(e)) => {
                        self.state = EngineState::Error;
                        return Err(SyncError::Subscription(e.to_string()));
                    }
                    None => {
                        self.state = EngineState::Error;
                        return Err(SyncError::Subscription("subscription stream closed".into()));
                    }
                },
            }
        }
    }
}
