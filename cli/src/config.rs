//! Command-line and environment configuration.

use std::time::Duration;

use clap::Args;

use eventsync_core::{NetworkProfile, PipelineConfig, RestartPolicy, SyncError};

/// Network selection and per-field overrides.
#[derive(Debug, Clone, Args)]
pub struct NetworkArgs {
    /// Built-in network profile
    #[arg(long, env = "EVENTSYNC_NETWORK", default_value = NetworkProfile::DEFAULT, global = true)]
    pub network: String,

    /// Override the profile's RPC URL
    #[arg(long, env = "EVENTSYNC_RPC_URL", global = true)]
    pub rpc_url: Option<String>,

    /// Override the profile's WebSocket URL
    #[arg(long, env = "EVENTSYNC_WS_URL", global = true)]
    pub ws_url: Option<String>,

    /// Run without a streaming endpoint (backfill polling only)
    #[arg(long, global = true)]
    pub no_ws: bool,

    /// Override the event-registry contract address
    #[arg(long, env = "EVENTSYNC_EVENT_REGISTRY", global = true)]
    pub event_registry: Option<String>,

    /// Override the ticket contract address
    #[arg(long, env = "EVENTSYNC_TICKET_CONTRACT", global = true)]
    pub ticket_contract: Option<String>,
}

impl NetworkArgs {
    /// Selected profile with overrides applied.
    pub fn profile(&self) -> Result<NetworkProfile, SyncError> {
        let mut profile = NetworkProfile::builtin(&self.network)?;
        if let Some(url) = &self.rpc_url {
            profile.rpc_url = url.clone();
        }
        if let Some(url) = &self.ws_url {
            profile.ws_url = Some(url.clone());
        }
        if self.no_ws {
            profile.ws_url = None;
        }
        if let Some(addr) = &self.event_registry {
            profile.event_registry = Some(addr.clone());
        }
        if let Some(addr) = &self.ticket_contract {
            profile.ticket_contract = Some(addr.clone());
        }
        Ok(profile)
    }
}

/// Pipeline tunables.
#[derive(Debug, Clone, Args)]
pub struct PipelineArgs {
    /// Blocks per eth_getLogs range
    #[arg(long, env = "EVENTSYNC_BATCH_SIZE", default_value_t = 1000)]
    pub batch_size: u64,

    /// First block to scan when no checkpoint exists
    #[arg(long, env = "EVENTSYNC_START_BLOCK", default_value_t = 0)]
    pub start_block: u64,

    /// Per contract-call timeout, seconds
    #[arg(long, default_value_t = 10)]
    pub call_timeout_secs: u64,

    /// Heartbeat interval while listening, seconds
    #[arg(long, default_value_t = 30)]
    pub heartbeat_secs: u64,

    /// Backfill period when streaming is unavailable, seconds
    #[arg(long, env = "EVENTSYNC_SYNC_INTERVAL", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Pause between subscription restarts, seconds
    #[arg(long, default_value_t = 5)]
    pub restart_delay_secs: u64,

    /// Give up after this many consecutive restarts (default: never)
    #[arg(long, env = "EVENTSYNC_MAX_RESTARTS")]
    pub max_restarts: Option<u32>,
}

impl PipelineArgs {
    pub fn config(&self) -> PipelineConfig {
        PipelineConfig {
            batch_size: self.batch_size,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            heartbeat_interval: Duration::from_secs(self.heartbeat_secs),
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            start_block: self.start_block,
            restart: RestartPolicy {
                delay: Duration::from_secs(self.restart_delay_secs),
                max_attempts: self.max_restarts,
            },
        }
    }
}
