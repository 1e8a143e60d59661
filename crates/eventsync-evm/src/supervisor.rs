//! Supervisor: keeps the pipeline alive under an explicit restart policy.
//!
//! Each attempt opens the subscription first, then runs a catch-up backfill,
//! then drains the subscription. A log mined while the catch-up reads the
//! head is therefore either in the scanned range or queued on the open
//! subscription; handlers are idempotent, so seeing it twice is harmless.
//!
//! A failed session is followed by the policy's fixed delay and another
//! attempt until the policy's cap is reached; a session that reached
//! `Listening` resets the count. After a transport failure the endpoints are
//! resolved again when an [`EndpointSource`] is attached, so losing the
//! current RPC node fails over to the next candidate. When streaming is
//! unavailable the supervisor switches to backfill on a timer.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use eventsync_core::{PipelineConfig, SyncError};
use eventsync_rpc::{Connector, EndpointResolver, FailoverQuery, ResolvedEndpoint, StreamHandle, TransportError};

use crate::backfill::BackfillCoordinator;
use crate::dispatch::Dispatcher;
use crate::engine::SubscriptionEngine;

/// Why [`Supervisor::run`] returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorExit {
    Cancelled,
    RestartsExhausted { restarts: u32, last_error: String },
}

/// Re-runnable endpoint resolution.
#[async_trait]
pub trait EndpointSource: Send + Sync {
    async fn resolve(&self) -> Result<ResolvedEndpoint, SyncError>;
}

#[async_trait]
impl<C: Connector> EndpointSource for EndpointResolver<C> {
    async fn resolve(&self) -> Result<ResolvedEndpoint, SyncError> {
        EndpointResolver::<C>::resolve(self).await.map_err(|e| match e {
            TransportError::NoReachableEndpoint { attempted } => SyncError::EndpointUnreachable { attempted },
            other => SyncError::Rpc(other.to_string()),
        })
    }
}

/// Where a fresh resolution is applied.
pub(crate) struct Failover {
    pub(crate) source: Arc<dyn EndpointSource>,
    pub(crate) query: Arc<FailoverQuery>,
}

pub struct Supervisor {
    stream: StreamHandle,
    dispatcher: Arc<Dispatcher>,
    backfill: BackfillCoordinator,
    addresses: Vec<String>,
    config: PipelineConfig,
    failover: Option<Failover>,
}

impl Supervisor {
    pub fn new(
        stream: StreamHandle,
        dispatcher: Arc<Dispatcher>,
        backfill: BackfillCoordinator,
        addresses: Vec<String>,
        config: PipelineConfig,
    ) -> Self {
        Self { stream, dispatcher, backfill, addresses, config, failover: None }
    }

    /// Re-resolve through `source` after transport failures and point
    /// `query` (shared with the contract reader and backfill) at the result.
    pub fn with_failover(mut self, source: Arc<dyn EndpointSource>, query: Arc<FailoverQuery>) -> Self {
        self.failover = Some(Failover { source, query });
        self
    }

    pub async fn run(mut self, cancel: CancellationToken) -> SupervisorExit {
        let mut restarts: u32 = 0;
        let mut reresolve = false;

        loop {
            if cancel.is_cancelled() {
                return SupervisorExit::Cancelled;
            }

            let mut listened = false;
            let resolved = if reresolve { self.reresolve().await } else { Ok(()) };
            let err = match resolved {
                Err(e) => e,
                Ok(()) => {
                    let mut engine = SubscriptionEngine::new(
                        self.stream.clone(),
                        self.dispatcher.clone(),
                        self.addresses.clone(),
                        self.config.heartbeat_interval,
                    );
                    let result = self.session(&mut engine, &cancel).await;
                    listened = engine.reached_listening();
                    match result {
                        Ok(()) => return SupervisorExit::Cancelled,
                        Err(SyncError::StreamingUnsupported { reason }) => {
                            tracing::warn!(reason = %reason, "streaming unsupported, polling with backfill");
                            return self.poll(&cancel).await;
                        }
                        Err(e) => e,
                    }
                }
            };

            if listened {
                restarts = 0;
            }
            if !self.config.restart.should_restart(restarts) {
                tracing::error!(restarts, error = %err, "restart limit reached, giving up");
                return SupervisorExit::RestartsExhausted { restarts, last_error: err.to_string() };
            }
            restarts += 1;
            reresolve = self.failover.is_some() && err.is_transport();
            tracing::warn!(
                error = %err,
                restart = restarts,
                reresolve,
                delay_ms = self.config.restart.delay.as_millis() as u64,
                "subscription session ended, restarting"
            );

            tokio::select! {
                _ = cancel.cancelled() => return SupervisorExit::Cancelled,
                _ = tokio::time::sleep(self.config.restart.delay) => {}
            }
        }
    }

    /// Subscribe, catch up, then listen. Catch-up also runs when the
    /// subscribe fails, so history keeps advancing while streaming is down.
    async fn session(&mut self, engine: &mut SubscriptionEngine, cancel: &CancellationToken) -> Result<(), SyncError> {
        let subscribed = engine.subscribe().await;
        if let Err(SyncError::StreamingUnsupported { .. }) = &subscribed {
            return subscribed;
        }
        self.catch_up(cancel).await;
        subscribed?;
        engine.listen(cancel).await
    }

    async fn reresolve(&mut self) -> Result<(), SyncError> {
        let Some(failover) = &self.failover else {
            return Ok(());
        };
        let endpoint = failover.source.resolve().await?;
        tracing::info!(url = %endpoint.url, degraded = endpoint.is_degraded(), "endpoints resolved again");
        failover.query.replace(endpoint.query);
        self.stream = endpoint.stream;
        Ok(())
    }

    async fn catch_up(&mut self, cancel: &CancellationToken) {
        match self.backfill.run_until(cancel).await {
            Ok(report) if report.batches > 0 => {
                tracing::info!(batches = report.batches, logs = report.logs, checkpoint = ?report.checkpoint, "catch-up complete");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "catch-up backfill failed"),
        }
    }

    /// Degraded mode: backfill now, then every poll interval until cancelled.
    async fn poll(&mut self, cancel: &CancellationToken) -> SupervisorExit {
        loop {
            self.catch_up(cancel).await;
            tokio::select! {
                _ = cancel.cancelled() => return SupervisorExit::Cancelled,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
    }
}
