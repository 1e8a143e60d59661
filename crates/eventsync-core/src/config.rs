//! Pipeline configuration and the supervisor restart policy.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables shared by the engine, backfill coordinator and supervisor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Maximum span of one `eth_getLogs` range, in blocks.
    pub batch_size: u64,
    /// Timeout applied to each contract read.
    pub call_timeout: Duration,
    /// Observability heartbeat while listening.
    pub heartbeat_interval: Duration,
    /// Backfill period when streaming is unavailable.
    pub poll_interval: Duration,
    /// First block to scan when no checkpoint exists yet.
    pub start_block: u64,
    pub restart: RestartPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            call_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            poll_interval: Duration::from_secs(30),
            start_block: 0,
            restart: RestartPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), crate::SyncError> {
        if self.batch_size == 0 {
            return Err(crate::SyncError::Config("batch_size must be at least 1".into()));
        }
        if self.heartbeat_interval.is_zero() || self.poll_interval.is_zero() {
            return Err(crate::SyncError::Config("intervals must be non-zero".into()));
        }
        Ok(())
    }
}

/// Fixed-delay restart policy for the subscription supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    /// Pause between a failed session and the next attempt.
    pub delay: Duration,
    /// Cap on restarts. `None` = retry forever.
    pub max_attempts: Option<u32>,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self { delay: Duration::from_secs(5), max_attempts: None }
    }
}

impl RestartPolicy {
    pub fn unbounded(delay: Duration) -> Self {
        Self { delay, max_attempts: None }
    }

    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self { delay, max_attempts: Some(max_attempts) }
    }

    /// Returns `true` if another restart is allowed after `restarts` have
    /// already been performed.
    pub fn should_restart(&self, restarts: u32) -> bool {
        match self.max_attempts {
            Some(max) => restarts < max,
            None => true,
        }
    }
}
