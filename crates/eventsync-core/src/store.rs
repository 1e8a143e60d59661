//! Store traits implemented by the storage backends.
//!
//! Creates report [`SyncError::AlreadyExists`] on a key conflict so handlers
//! can fall back to an update; updates report [`SyncError::RecordNotFound`]
//! when the row is missing. Every other failure is [`SyncError::Persistence`].

use async_trait::async_trait;

use crate::error::SyncError;
use crate::types::{
    EventRecord, IngestionLogEntry, IngestionStats, ParticipantRecord, SponsorRecord,
    TicketRecord,
};

/// Domain-record persistence.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, event: &EventRecord) -> Result<(), SyncError>;

    /// Overwrite every field of the event keyed by (contract, event id).
    async fn update_event(&self, event: &EventRecord) -> Result<(), SyncError>;

    async fn get_event(
        &self,
        contract: &str,
        event_id: &str,
    ) -> Result<Option<EventRecord>, SyncError>;

    /// Every stored event, across all contracts.
    async fn list_events(&self) -> Result<Vec<EventRecord>, SyncError>;

    /// Events of `contract` created by `organizer` (case-insensitive).
    async fn events_by_organizer(
        &self,
        contract: &str,
        organizer: &str,
    ) -> Result<Vec<EventRecord>, SyncError>;

    /// Bump the stored participant counter unless it has already reached
    /// `ceiling`, and return the stored value afterwards.
    async fn increment_participant_count(
        &self,
        contract: &str,
        event_id: &str,
        ceiling: u64,
    ) -> Result<u64, SyncError>;

    async fn insert_participant(&self, participant: &ParticipantRecord) -> Result<(), SyncError>;

    async fn update_participant(&self, participant: &ParticipantRecord) -> Result<(), SyncError>;

    async fn get_participant(
        &self,
        contract: &str,
        event_id: &str,
        wallet: &str,
    ) -> Result<Option<ParticipantRecord>, SyncError>;

    async fn participants_by_event(
        &self,
        contract: &str,
        event_id: &str,
    ) -> Result<Vec<ParticipantRecord>, SyncError>;

    /// Sponsors are immutable; a repeated (contract, event, wallet, time)
    /// is a conflict.
    async fn insert_sponsor(&self, sponsor: &SponsorRecord) -> Result<(), SyncError>;

    async fn sponsors_by_event(
        &self,
        contract: &str,
        event_id: &str,
    ) -> Result<Vec<SponsorRecord>, SyncError>;

    async fn insert_ticket(&self, ticket: &TicketRecord) -> Result<(), SyncError>;

    async fn update_ticket(&self, ticket: &TicketRecord) -> Result<(), SyncError>;

    async fn get_ticket(
        &self,
        contract: &str,
        token_id: &str,
    ) -> Result<Option<TicketRecord>, SyncError>;

    /// Flip `used` to true. Returns `false` if it already was.
    async fn mark_ticket_used(&self, contract: &str, token_id: &str) -> Result<bool, SyncError>;

    async fn tickets_by_event(
        &self,
        contract: &str,
        event_id: &str,
    ) -> Result<Vec<TicketRecord>, SyncError>;

    /// Case-insensitive on `holder`.
    async fn tickets_by_holder(
        &self,
        contract: &str,
        holder: &str,
    ) -> Result<Vec<TicketRecord>, SyncError>;

    /// Domain row counts; `ingestion_entries` is left at zero.
    async fn stats(&self) -> Result<IngestionStats, SyncError>;
}

/// Append-only ingestion log.
#[async_trait]
pub trait AuditTrail: Send + Sync {
    async fn record(&self, entry: IngestionLogEntry) -> Result<(), SyncError>;

    /// Highest block with a `success` entry of `kind`.
    async fn last_success_block(&self, kind: &str) -> Result<Option<u64>, SyncError>;

    /// Whether (tx hash, kind) already has a `success` entry.
    async fn has_success(&self, tx_hash: &str, kind: &str) -> Result<bool, SyncError>;

    /// Newest first.
    async fn recent(&self, limit: usize) -> Result<Vec<IngestionLogEntry>, SyncError>;

    async fn entry_count(&self) -> Result<u64, SyncError>;
}
