//! Fluent builder that wires the pipeline together.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//! use std::time::Duration;
//! use eventsync_core::NetworkProfile;
//! use eventsync_evm::PipelineBuilder;
//! use eventsync_rpc::EndpointResolver;
//! use eventsync_storage::MemoryStore;
//!
//! let profile = NetworkProfile::default();
//! let (registry, tickets) = profile.contracts()?;
//! let resolver = Arc::new(EndpointResolver::new(profile.rpc_candidates(), profile.ws_url.clone()));
//! let endpoint = resolver.resolve().await?;
//! let store = Arc::new(MemoryStore::new());
//!
//! let pipeline = PipelineBuilder::new()
//!     .contracts(registry, tickets)
//!     .batch_size(500)
//!     .restart_delay(Duration::from_secs(5))
//!     .failover(resolver)
//!     .build(&endpoint, store.clone(), store)?;
//! let exit = pipeline.supervisor().run(Default::default()).await;
//! # let _ = exit;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use eventsync_core::{AuditTrail, EventStore, PipelineConfig, RestartPolicy, SyncError};
use eventsync_rpc::{EthQuery, FailoverQuery, ResolvedEndpoint, StreamHandle};

use crate::backfill::BackfillCoordinator;
use crate::contracts::{ContractReader, EvmContracts};
use crate::dispatch::Dispatcher;
use crate::engine::SubscriptionEngine;
use crate::handlers::Reconciler;
use crate::supervisor::{EndpointSource, Supervisor};
use crate::topics::normalize_address;

/// Fluent builder for a [`Pipeline`].
#[derive(Default)]
pub struct PipelineBuilder {
    config: PipelineConfig,
    registry: Option<String>,
    tickets: Option<String>,
    reader: Option<Arc<dyn ContractReader>>,
    failover: Option<Arc<dyn EndpointSource>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Event-registry and ticket contract addresses (any case).
    pub fn contracts(mut self, registry: impl Into<String>, tickets: impl Into<String>) -> Self {
        self.registry = Some(registry.into());
        self.tickets = Some(tickets.into());
        self
    }

    /// Use a custom contract reader instead of one over the query transport.
    pub fn reader(mut self, reader: Arc<dyn ContractReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Resolve endpoints again through `source` after transport failures.
    pub fn failover(mut self, source: Arc<dyn EndpointSource>) -> Self {
        self.failover = Some(source);
        self
    }

    /// Set the number of blocks per `eth_getLogs` batch.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.config.batch_size = size;
        self
    }

    /// First block to scan when the audit trail holds no checkpoint.
    pub fn start_block(mut self, block: u64) -> Self {
        self.config.start_block = block;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.config.call_timeout = timeout;
        self
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.config.heartbeat_interval = interval;
        self
    }

    /// Backfill period in degraded mode.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn restart_delay(mut self, delay: Duration) -> Self {
        self.config.restart.delay = delay;
        self
    }

    /// Cap supervisor restarts; `None` retries forever.
    pub fn max_restarts(mut self, max: Option<u32>) -> Self {
        self.config.restart.max_attempts = max;
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy) -> Self {
        self.config.restart = policy;
        self
    }

    pub fn build_config(self) -> PipelineConfig {
        self.config
    }

    /// Wire the pipeline over a resolved endpoint.
    pub fn build(
        self,
        endpoint: &ResolvedEndpoint,
        store: Arc<dyn EventStore>,
        audit: Arc<dyn AuditTrail>,
    ) -> Result<Pipeline, SyncError> {
        self.build_with(endpoint.query.clone(), endpoint.stream.clone(), store, audit)
    }

    /// Wire the pipeline over explicit transports.
    pub fn build_with(
        self,
        query: Arc<dyn EthQuery>,
        stream: StreamHandle,
        store: Arc<dyn EventStore>,
        audit: Arc<dyn AuditTrail>,
    ) -> Result<Pipeline, SyncError> {
        self.config.validate()?;
        let registry = normalize_address(
            self.registry.as_deref().ok_or_else(|| SyncError::Config("event registry address not set".into()))?,
        )?;
        let tickets = normalize_address(
            self.tickets.as_deref().ok_or_else(|| SyncError::Config("ticket contract address not set".into()))?,
        )?;

        let query = Arc::new(FailoverQuery::new(query));
        let reader = match self.reader {
            Some(r) => r,
            None => Arc::new(EvmContracts::new(query.clone(), &registry, &tickets, self.config.call_timeout)),
        };
        let reconciler = Reconciler::new(reader, store, audit.clone());
        let dispatcher = Arc::new(Dispatcher::new(reconciler, audit.clone()));

        Ok(Pipeline {
            config: self.config,
            addresses: vec![registry, tickets],
            query,
            stream,
            audit,
            dispatcher,
            failover: self.failover,
        })
    }
}

/// Wired components; hands out engines, coordinators and supervisors that
/// share one dispatcher.
pub struct Pipeline {
    config: PipelineConfig,
    addresses: Vec<String>,
    query: Arc<FailoverQuery>,
    stream: StreamHandle,
    audit: Arc<dyn AuditTrail>,
    dispatcher: Arc<Dispatcher>,
    failover: Option<Arc<dyn EndpointSource>>,
}

impl Pipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Tracked contract addresses, event registry first.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        self.dispatcher.clone()
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.stream, StreamHandle::Degraded { .. })
    }

    pub fn backfill(&self) -> BackfillCoordinator {
        BackfillCoordinator::new(
            self.query.clone(),
            self.dispatcher.clone(),
            self.audit.clone(),
            self.addresses.clone(),
            self.config.batch_size,
            self.config.start_block,
        )
    }

    pub fn engine(&self) -> SubscriptionEngine {
        SubscriptionEngine::new(
            self.stream.clone(),
            self.dispatcher.clone(),
            self.addresses.clone(),
            self.config.heartbeat_interval,
        )
    }

    pub fn supervisor(&self) -> Supervisor {
        let supervisor = Supervisor::new(
            self.stream.clone(),
            self.dispatcher.clone(),
            self.backfill(),
            self.addresses.clone(),
            self.config.clone(),
        );
        match &self.failover {
            Some(source) => supervisor.with_failover(source.clone(), self.query.clone()),
            None => supervisor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = PipelineBuilder::new().build_config();
        assert_eq!(cfg.batch_size, 1000);
        assert_eq!(cfg.poll_interval, Duration::from_secs(30));
        assert_eq!(cfg.restart.max_attempts, None);
    }

    #[test]
    fn builder_custom() {
        let cfg = PipelineBuilder::new()
            .batch_size(250)
            .start_block(19_000_000)
            .restart_delay(Duration::from_millis(10))
            .max_restarts(Some(3))
            .build_config();
        assert_eq!(cfg.batch_size, 250);
        assert_eq!(cfg.start_block, 19_000_000);
        assert_eq!(cfg.restart, RestartPolicy::bounded(Duration::from_millis(10), 3));
    }
}
