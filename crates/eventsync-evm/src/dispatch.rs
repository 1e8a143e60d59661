//! Log dispatch shared by the live engine and the backfill coordinator.

use std::sync::Arc;

use eventsync_core::{
    AuditTrail, EventKind, IngestionLogEntry, IngestionStatus, LogKind, SyncError, RECEIVED_BACKFILL,
    RECEIVED_LIVE,
};
use eventsync_rpc::RawLog;

use crate::handlers::Reconciler;

/// Where a log came from; selects the tag of its `received` marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Live,
    Backfill,
}

impl Source {
    fn received_tag(self) -> &'static str {
        match self {
            Self::Live => RECEIVED_LIVE,
            Self::Backfill => RECEIVED_BACKFILL,
        }
    }
}

/// What happened to one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatched {
    Applied { kind: EventKind, detail: String },
    Failed { kind: EventKind, reason: String },
    /// Unrecognised `topics[0]`; dropped after the received marker.
    Unknown { topic0: String },
    /// Retracted by a reorg; dropped.
    Removed,
}

pub struct Dispatcher {
    reconciler: Reconciler,
    audit: Arc<dyn AuditTrail>,
}

impl Dispatcher {
    pub fn new(reconciler: Reconciler, audit: Arc<dyn AuditTrail>) -> Self {
        Self { reconciler, audit }
    }

    /// Record receipt, classify, and run the matching handler. Every log a
    /// handler sees ends with exactly one `success` or `failed` entry.
    ///
    /// Only audit-trail write failures are returned as errors; handler
    /// failures are recorded and reported through [`Dispatched::Failed`].
    pub async fn dispatch(&self, log: &RawLog, source: Source) -> Result<Dispatched, SyncError> {
        let block = log.block_number_u64();
        self.audit
            .record(IngestionLogEntry::new(source.received_tag(), block, &log.tx_hash, IngestionStatus::Received))
            .await?;

        if log.is_removed() {
            tracing::warn!(block, tx = %log.tx_hash, "dropping log retracted by reorg");
            return Ok(Dispatched::Removed);
        }

        let kind = match LogKind::classify(log.topic0()) {
            LogKind::Known(kind) => kind,
            LogKind::Unknown(topic0) => {
                tracing::debug!(block, topic0 = %topic0, address = %log.address, "unrecognised event signature");
                return Ok(Dispatched::Unknown { topic0 });
            }
        };

        let result = if log.topics.len() < kind.min_topics() {
            Err(SyncError::MalformedLog {
                kind: kind.tag().to_string(),
                reason: format!("expected {} topics, got {}", kind.min_topics(), log.topics.len()),
            })
        } else {
            self.reconciler.handle(kind, log).await
        };

        let entry = IngestionLogEntry::new(kind.tag(), block, &log.tx_hash, IngestionStatus::Success);
        match result {
            Ok(detail) => {
                tracing::info!(kind = %kind, block, tx = %log.tx_hash, detail = %detail, "log reconciled");
                self.audit.record(entry.with_detail(detail.clone())).await?;
                Ok(Dispatched::Applied { kind, detail })
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(kind = %kind, block, tx = %log.tx_hash, error = %reason, "reconciliation failed");
                let entry = IngestionLogEntry { status: IngestionStatus::Failed, ..entry };
                self.audit.record(entry.with_detail(reason.clone())).await?;
                Ok(Dispatched::Failed { kind, reason })
            }
        }
    }
}
