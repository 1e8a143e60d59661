//! Read-side accessors for collaborators (HTTP layer, CLI).
//!
//! Thin pass-throughs over the store traits, scoped to the active network's
//! contract pair: events, participants and sponsors to the registry, tickets
//! to the ticket contract. One seeding write is included for manual testing.

use std::sync::Arc;

use chrono::Utc;

use crate::error::SyncError;
use crate::store::{AuditTrail, EventStore};
use crate::types::{
    EventRecord, IngestionLogEntry, IngestionStats, ParticipantRecord, SponsorRecord,
    TicketRecord,
};

/// Event id used by [`QueryService::create_test_event`].
pub const TEST_EVENT_ID: &str = "1";

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn EventStore>,
    audit: Arc<dyn AuditTrail>,
    event_registry: String,
    ticket_contract: String,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn EventStore>,
        audit: Arc<dyn AuditTrail>,
        event_registry: impl Into<String>,
        ticket_contract: impl Into<String>,
    ) -> Self {
        Self {
            store,
            audit,
            event_registry: event_registry.into(),
            ticket_contract: ticket_contract.into(),
        }
    }

    pub async fn events(&self) -> Result<Vec<EventRecord>, SyncError> {
        let mut events = self.store.list_events().await?;
        events.retain(|e| e.contract_address == self.event_registry);
        Ok(events)
    }

    pub async fn event(&self, event_id: &str) -> Result<Option<EventRecord>, SyncError> {
        self.store.get_event(&self.event_registry, event_id).await
    }

    pub async fn events_by_organizer(&self, organizer: &str) -> Result<Vec<EventRecord>, SyncError> {
        self.store.events_by_organizer(&self.event_registry, organizer).await
    }

    pub async fn participants(&self, event_id: &str) -> Result<Vec<ParticipantRecord>, SyncError> {
        self.store.participants_by_event(&self.event_registry, event_id).await
    }

    pub async fn sponsors(&self, event_id: &str) -> Result<Vec<SponsorRecord>, SyncError> {
        self.store.sponsors_by_event(&self.event_registry, event_id).await
    }

    pub async fn tickets(&self, event_id: &str) -> Result<Vec<TicketRecord>, SyncError> {
        self.store.tickets_by_event(&self.ticket_contract, event_id).await
    }

    pub async fn ticket(&self, token_id: &str) -> Result<Option<TicketRecord>, SyncError> {
        self.store.get_ticket(&self.ticket_contract, token_id).await
    }

    pub async fn tickets_by_holder(&self, holder: &str) -> Result<Vec<TicketRecord>, SyncError> {
        self.store.tickets_by_holder(&self.ticket_contract, holder).await
    }

    pub async fn stats(&self) -> Result<IngestionStats, SyncError> {
        let mut stats = self.store.stats().await?;
        stats.ingestion_entries = self.audit.entry_count().await?;
        Ok(stats)
    }

    pub async fn recent_ingestion(&self, limit: usize) -> Result<Vec<IngestionLogEntry>, SyncError> {
        self.audit.recent(limit).await
    }

    /// Insert a fixed sample event under the active registry address.
    ///
    /// Fails with [`SyncError::AlreadyExists`] if it was seeded before.
    pub async fn create_test_event(&self) -> Result<EventRecord, SyncError> {
        let now = Utc::now();
        let event = EventRecord {
            contract_address: self.event_registry.clone(),
            event_id: TEST_EVENT_ID.into(),
            organizer: "0xad6F55f669eaf666b7628d7Bd482Eb000e24D687".into(),
            title: "Test Hackathon".into(),
            description: "This is a test hackathon event".into(),
            start_time: 1_700_000_000,
            end_time: 1_700_100_000,
            location: "Shanghai".into(),
            max_participants: 100,
            participant_count: 0,
            active: true,
            created_at: now.timestamp(),
            synced_at: now,
        };
        self.store.insert_event(&event).await?;
        Ok(event)
    }
}
