//! Persisted records and ingestion-log types.
//!
//! Every domain record is keyed by contract address plus its on-chain id so
//! that several deployments of the same contract can share one store.
//! Addresses are stored in EIP-55 checksum form; numeric ids are decimal
//! strings because on-chain values are `uint256`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An event as registered on the event-registry contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub contract_address: String,
    pub event_id: String,
    pub organizer: String,
    pub title: String,
    pub description: String,
    /// Unix seconds.
    pub start_time: i64,
    /// Unix seconds.
    pub end_time: i64,
    pub location: String,
    pub max_participants: u64,
    pub participant_count: u64,
    pub active: bool,
    /// On-chain creation time (unix seconds).
    pub created_at: i64,
    /// When the pipeline last wrote this row.
    pub synced_at: DateTime<Utc>,
}

impl EventRecord {
    /// `"<contract>/<event id>"`, used in logs and error keys.
    pub fn key(&self) -> String {
        format!("{}/{}", self.contract_address, self.event_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub contract_address: String,
    pub event_id: String,
    pub wallet: String,
    pub name: String,
    pub registered_at: i64,
    pub checked_in: bool,
    /// `0` until checked in.
    pub check_in_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorRecord {
    pub contract_address: String,
    pub event_id: String,
    pub wallet: String,
    pub name: String,
    /// Decimal string; contract amounts are wei and overflow `u64`.
    pub amount: String,
    pub sponsored_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub contract_address: String,
    pub token_id: String,
    pub event_id: String,
    pub holder: String,
    /// Denormalised at issuance; not re-joined with the event later.
    pub event_title: String,
    pub location: String,
    pub start_time: i64,
    pub end_time: i64,
    pub used: bool,
    pub issued_at: i64,
}

/// Outcome of one ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Received,
    Success,
    Failed,
}

impl IngestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "received" => Some(Self::Received),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for IngestionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only audit-trail row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionLogEntry {
    /// Event kind tag (`"sponsor_added"`), `"event"` for backfill
    /// checkpoints, or `"event_subscription"` / `"event_backfill"` for
    /// received markers.
    pub kind: String,
    pub block_number: u64,
    /// Empty for checkpoint rows.
    pub tx_hash: String,
    pub status: IngestionStatus,
    pub detail: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IngestionLogEntry {
    pub fn new(
        kind: impl Into<String>,
        block_number: u64,
        tx_hash: impl Into<String>,
        status: IngestionStatus,
    ) -> Self {
        Self {
            kind: kind.into(),
            block_number,
            tx_hash: tx_hash.into(),
            status,
            detail: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Row counts per entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionStats {
    pub events: u64,
    pub participants: u64,
    pub sponsors: u64,
    pub tickets: u64,
    pub ingestion_entries: u64,
}
