//! In-memory storage backend.
//!
//! Holds every record and the ingestion log in RAM. Useful for tests and
//! short-lived runs that don't need persistence.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use eventsync_core::error::SyncError;
use eventsync_core::store::{AuditTrail, EventStore};
use eventsync_core::types::{
    EventRecord, IngestionLogEntry, IngestionStats, IngestionStatus, ParticipantRecord,
    SponsorRecord, TicketRecord,
};

type EventKey = (String, String);
type ParticipantKey = (String, String, String);

/// In-memory event store and audit trail. All data is lost on drop.
#[derive(Default)]
pub struct MemoryStore {
    events: Mutex<BTreeMap<EventKey, EventRecord>>,
    participants: Mutex<BTreeMap<ParticipantKey, ParticipantRecord>>,
    sponsors: Mutex<Vec<SponsorRecord>>,
    tickets: Mutex<BTreeMap<EventKey, TicketRecord>>,
    log: Mutex<Vec<IngestionLogEntry>>,
}

/// Recover the guard from a poisoned lock; the maps stay consistent
/// because every mutation is a single insert or field write.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Decimal ids sort numerically when shorter strings come first.
fn id_order(a: &str, b: &str) -> std::cmp::Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn event_key(contract: &str, id: &str) -> EventKey {
    (contract.to_string(), id.to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the full ingestion log, oldest first.
    pub fn ingestion_log(&self) -> Vec<IngestionLogEntry> {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn insert_event(&self, event: &EventRecord) -> Result<(), SyncError> {
        let mut events = lock(&self.events);
        let key = event_key(&event.contract_address, &event.event_id);
        if events.contains_key(&key) {
            return Err(SyncError::AlreadyExists { entity: "event", key: event.key() });
        }
        events.insert(key, event.clone());
        Ok(())
    }

    async fn update_event(&self, event: &EventRecord) -> Result<(), SyncError> {
        let mut events = lock(&self.events);
        match events.get_mut(&event_key(&event.contract_address, &event.event_id)) {
            Some(slot) => {
                *slot = event.clone();
                Ok(())
            }
            None => Err(SyncError::RecordNotFound { entity: "event", key: event.key() }),
        }
    }

    async fn get_event(&self, contract: &str, event_id: &str) -> Result<Option<EventRecord>, SyncError> {
        Ok(lock(&self.events).get(&event_key(contract, event_id)).cloned())
    }

    async fn list_events(&self) -> Result<Vec<EventRecord>, SyncError> {
        let mut out: Vec<_> = lock(&self.events).values().cloned().collect();
        out.sort_by(|a, b| {
            a.contract_address
                .cmp(&b.contract_address)
                .then_with(|| id_order(&a.event_id, &b.event_id))
        });
        Ok(out)
    }

    async fn events_by_organizer(&self, contract: &str, organizer: &str) -> Result<Vec<EventRecord>, SyncError> {
        Ok(self
            .list_events()
            .await?
            .into_iter()
            .filter(|e| e.contract_address == contract && e.organizer.eq_ignore_ascii_case(organizer))
            .collect())
    }

    async fn increment_participant_count(
        &self,
        contract: &str,
        event_id: &str,
        ceiling: u64,
    ) -> Result<u64, SyncError> {
        let mut events = lock(&self.events);
        let event = events.get_mut(&event_key(contract, event_id)).ok_or_else(|| {
            SyncError::RecordNotFound { entity: "event", key: format!("{contract}/{event_id}") }
        })?;
        if event.participant_count < ceiling {
            event.participant_count += 1;
            event.synced_at = Utc::now();
        }
        Ok(event.participant_count)
    }

    async fn insert_participant(&self, p: &ParticipantRecord) -> Result<(), SyncError> {
        let mut participants = lock(&self.participants);
        let key = (p.contract_address.clone(), p.event_id.clone(), p.wallet.clone());
        if participants.contains_key(&key) {
            return Err(SyncError::AlreadyExists {
                entity: "participant",
                key: format!("{}/{}", p.event_id, p.wallet),
            });
        }
        participants.insert(key, p.clone());
        Ok(())
    }

    async fn update_participant(&self, p: &ParticipantRecord) -> Result<(), SyncError> {
        let mut participants = lock(&self.participants);
        let key = (p.contract_address.clone(), p.event_id.clone(), p.wallet.clone());
        match participants.get_mut(&key) {
            Some(slot) => {
                *slot = p.clone();
                Ok(())
            }
            None => Err(SyncError::RecordNotFound {
                entity: "participant",
                key: format!("{}/{}", p.event_id, p.wallet),
            }),
        }
    }

    async fn get_participant(
        &self,
        contract: &str,
        event_id: &str,
        wallet: &str,
    ) -> Result<Option<ParticipantRecord>, SyncError> {
        let key = (contract.to_string(), event_id.to_string(), wallet.to_string());
        Ok(lock(&self.participants).get(&key).cloned())
    }

    async fn participants_by_event(&self, contract: &str, event_id: &str) -> Result<Vec<ParticipantRecord>, SyncError> {
        let mut out: Vec<_> = lock(&self.participants)
            .values()
            .filter(|p| p.contract_address == contract && p.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.registered_at);
        Ok(out)
    }

    async fn insert_sponsor(&self, s: &SponsorRecord) -> Result<(), SyncError> {
        let mut sponsors = lock(&self.sponsors);
        let duplicate = sponsors.iter().any(|x| {
            x.contract_address == s.contract_address
                && x.event_id == s.event_id
                && x.wallet == s.wallet
                && x.sponsored_at == s.sponsored_at
        });
        if duplicate {
            return Err(SyncError::AlreadyExists {
                entity: "sponsor",
                key: format!("{}/{}@{}", s.event_id, s.wallet, s.sponsored_at),
            });
        }
        sponsors.push(s.clone());
        Ok(())
    }

    async fn sponsors_by_event(&self, contract: &str, event_id: &str) -> Result<Vec<SponsorRecord>, SyncError> {
        let mut out: Vec<_> = lock(&self.sponsors)
            .iter()
            .filter(|s| s.contract_address == contract && s.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.sponsored_at);
        Ok(out)
    }

    async fn insert_ticket(&self, t: &TicketRecord) -> Result<(), SyncError> {
        let mut tickets = lock(&self.tickets);
        let key = event_key(&t.contract_address, &t.token_id);
        if tickets.contains_key(&key) {
            return Err(SyncError::AlreadyExists { entity: "ticket", key: t.token_id.clone() });
        }
        tickets.insert(key, t.clone());
        Ok(())
    }

    async fn update_ticket(&self, t: &TicketRecord) -> Result<(), SyncError> {
        let mut tickets = lock(&self.tickets);
        match tickets.get_mut(&event_key(&t.contract_address, &t.token_id)) {
            Some(slot) => {
                *slot = t.clone();
                Ok(())
            }
            None => Err(SyncError::RecordNotFound { entity: "ticket", key: t.token_id.clone() }),
        }
    }

    async fn get_ticket(&self, contract: &str, token_id: &str) -> Result<Option<TicketRecord>, SyncError> {
        Ok(lock(&self.tickets).get(&event_key(contract, token_id)).cloned())
    }

    async fn mark_ticket_used(&self, contract: &str, token_id: &str) -> Result<bool, SyncError> {
        let mut tickets = lock(&self.tickets);
        let ticket = tickets
            .get_mut(&event_key(contract, token_id))
            .ok_or_else(|| SyncError::RecordNotFound { entity: "ticket", key: token_id.to_string() })?;
        if ticket.used {
            return Ok(false);
        }
        ticket.used = true;
        Ok(true)
    }

    async fn tickets_by_event(&self, contract: &str, event_id: &str) -> Result<Vec<TicketRecord>, SyncError> {
        let mut out: Vec<_> = lock(&self.tickets)
            .values()
            .filter(|t| t.contract_address == contract && t.event_id == event_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| id_order(&a.token_id, &b.token_id));
        Ok(out)
    }

    async fn tickets_by_holder(&self, contract: &str, holder: &str) -> Result<Vec<TicketRecord>, SyncError> {
        let mut out: Vec<_> = lock(&self.tickets)
            .values()
            .filter(|t| t.contract_address == contract && t.holder.eq_ignore_ascii_case(holder))
            .cloned()
            .collect();
        out.sort_by(|a, b| id_order(&a.token_id, &b.token_id));
        Ok(out)
    }

    async fn stats(&self) -> Result<IngestionStats, SyncError> {
        Ok(IngestionStats {
            events: lock(&self.events).len() as u64,
            participants: lock(&self.participants).len() as u64,
            sponsors: lock(&self.sponsors).len() as u64,
            tickets: lock(&self.tickets).len() as u64,
            ingestion_entries: 0,
        })
    }
}

#[async_trait]
impl AuditTrail for MemoryStore {
    async fn record(&self, entry: IngestionLogEntry) -> Result<(), SyncError> {
        lock(&self.log).push(entry);
        Ok(())
    }

    async fn last_success_block(&self, kind: &str) -> Result<Option<u64>, SyncError> {
        Ok(lock(&self.log)
            .iter()
            .filter(|e| e.kind == kind && e.status == IngestionStatus::Success)
            .map(|e| e.block_number)
            .max())
    }

    async fn has_success(&self, tx_hash: &str, kind: &str) -> Result<bool, SyncError> {
        Ok(lock(&self.log)
            .iter()
            .any(|e| e.kind == kind && e.tx_hash == tx_hash && e.status == IngestionStatus::Success))
    }

    async fn recent(&self, limit: usize) -> Result<Vec<IngestionLogEntry>, SyncError> {
        Ok(lock(&self.log).iter().rev().take(limit).cloned().collect())
    }

    async fn entry_count(&self) -> Result<u64, SyncError> {
        Ok(lock(&self.log).len() as u64)
    }
}
