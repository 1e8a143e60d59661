//! Backfill coordinator: batched historical catch-up driven by the audit
//! trail checkpoint.
//!
//! The checkpoint is the highest block with a `success` entry of kind
//! [`CHECKPOINT_KIND`]. A pass scans `checkpoint + 1 ..= head` (or
//! `start_block ..= head` on an empty trail) in batches of at most
//! `batch_size` blocks and writes a checkpoint entry after every batch, so
//! an empty range still advances it. A failed range fetch writes a `failed`
//! entry at the batch end and aborts; the next pass resumes from the last
//! success.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use eventsync_core::{AuditTrail, IngestionLogEntry, IngestionStatus, SyncError, CHECKPOINT_KIND};
use eventsync_rpc::{EthQuery, LogFilter};

use crate::dispatch::{Dispatched, Dispatcher, Source};

/// Summary of one backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Checkpoint found when the pass started.
    pub resumed_from: Option<u64>,
    /// Chain head observed at the start of the pass.
    pub head: u64,
    pub batches: u64,
    pub logs: u64,
    pub failed: u64,
    /// Checkpoint after the pass.
    pub checkpoint: Option<u64>,
    /// Stopped early by cancellation.
    pub interrupted: bool,
}

/// Owns the checkpoint walk. Taking `&mut self` keeps passes sequential.
pub struct BackfillCoordinator {
    query: Arc<dyn EthQuery>,
    dispatcher: Arc<Dispatcher>,
    audit: Arc<dyn AuditTrail>,
    addresses: Vec<String>,
    batch_size: u64,
    start_block: u64,
}

impl BackfillCoordinator {
    pub fn new(
        query: Arc<dyn EthQuery>,
        dispatcher: Arc<Dispatcher>,
        audit: Arc<dyn AuditTrail>,
        addresses: Vec<String>,
        batch_size: u64,
        start_block: u64,
    ) -> Self {
        Self { query, dispatcher, audit, addresses, batch_size: batch_size.max(1), start_block }
    }

    /// One full pass to the current head.
    pub async fn run(&mut self) -> Result<BackfillReport, SyncError> {
        self.run_until(&CancellationToken::new()).await
    }

    /// One pass, checking `cancel` between batches.
    pub async fn run_until(&mut self, cancel: &CancellationToken) -> Result<BackfillReport, SyncError> {
        let checkpoint = self.audit.last_success_block(CHECKPOINT_KIND).await?;
        let head = self.query.block_number().await.map_err(|e| SyncError::Rpc(format!("eth_blockNumber: {e}")))?;

        let mut report = BackfillReport { resumed_from: checkpoint, head, checkpoint, ..Default::default() };
        let mut from = match checkpoint {
            Some(c) if head <= c => {
                tracing::debug!(checkpoint = c, head, "backfill up to date");
                return Ok(report);
            }
            Some(c) => c + 1,
            None => self.start_block,
        };
        if from > head {
            return Ok(report);
        }

        tracing::info!(from, head, "starting backfill");
        while from <= head {
            if cancel.is_cancelled() {
                report.interrupted = true;
                break;
            }
            let to = from.saturating_add(self.batch_size - 1).min(head);
            let filter = LogFilter { addresses: self.addresses.clone(), from_block: from, to_block: to };

            let logs = match self.query.get_logs(&filter).await {
                Ok(logs) => logs,
                Err(e) => {
                    let reason = format!("eth_getLogs {from}..={to}: {e}");
                    tracing::warn!(from, to, error = %e, "backfill batch fetch failed");
                    self.audit
                        .record(
                            IngestionLogEntry::new(CHECKPOINT_KIND, to, "", IngestionStatus::Failed)
                                .with_detail(reason.clone()),
                        )
                        .await?;
                    return Err(SyncError::Rpc(reason));
                }
            };

            for log in &logs {
                if let Dispatched::Failed { .. } = self.dispatcher.dispatch(log, Source::Backfill).await? {
                    report.failed += 1;
                }
            }

            self.audit
                .record(
                    IngestionLogEntry::new(CHECKPOINT_KIND, to, "", IngestionStatus::Success)
                        .with_detail(format!("scanned {from}..={to}, {} logs", logs.len())),
                )
                .await?;
            tracing::info!(from, to, head, logs = logs.len(), "backfill batch complete");

            report.batches += 1;
            report.logs += logs.len() as u64;
            report.checkpoint = Some(to);
            from = to + 1;
        }

        Ok(report)
    }
}
