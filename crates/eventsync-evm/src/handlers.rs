//! Reconciliation handlers, one per event kind.
//!
//! Every handler takes only the indexed keys from the log and reads the
//! canonical record back from the contract; string fields are never indexed
//! and so never trusted from the log itself. A handler returns the detail
//! text for its `success` audit entry, or the error that becomes the
//! `failed` entry. The [`Dispatcher`](crate::Dispatcher) writes that entry.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use chrono::Utc;

use eventsync_core::{
    AuditTrail, EventKind, EventRecord, EventStore, ParticipantRecord, SponsorRecord, SyncError,
    TicketRecord,
};
use eventsync_rpc::RawLog;

use crate::contracts::{ContractReader, ParticipantDetails};
use crate::topics::{self, checksum, to_i64, to_u64};

pub struct Reconciler {
    reader: Arc<dyn ContractReader>,
    store: Arc<dyn EventStore>,
    audit: Arc<dyn AuditTrail>,
}

/// Indexed keys pulled out of a log's topics.
struct Keys<'a> {
    kind: EventKind,
    log: &'a RawLog,
}

impl<'a> Keys<'a> {
    fn malformed(&self, reason: String) -> SyncError {
        SyncError::MalformedLog { kind: self.kind.tag().to_string(), reason }
    }

    fn uint(&self, i: usize) -> Result<U256, SyncError> {
        let topic = self.log.topics.get(i).ok_or_else(|| self.malformed(format!("missing topic {i}")))?;
        topics::topic_uint(topic).map_err(|e| self.malformed(format!("topic {i}: {e}")))
    }

    fn address(&self, i: usize) -> Result<Address, SyncError> {
        let topic = self.log.topics.get(i).ok_or_else(|| self.malformed(format!("missing topic {i}")))?;
        topics::topic_address(topic).map_err(|e| self.malformed(format!("topic {i}: {e}")))
    }

    /// Emitting contract in checksum form; records are keyed by it.
    fn contract(&self) -> Result<String, SyncError> {
        self.log
            .address
            .parse::<Address>()
            .map(|a| checksum(&a))
            .map_err(|e| self.malformed(format!("emitter {:?}: {e}", self.log.address)))
    }
}

impl Reconciler {
    pub fn new(
        reader: Arc<dyn ContractReader>,
        store: Arc<dyn EventStore>,
        audit: Arc<dyn AuditTrail>,
    ) -> Self {
        Self { reader, store, audit }
    }

    /// Run the handler for `kind`. Topic count has already been checked.
    pub async fn handle(&self, kind: EventKind, log: &RawLog) -> Result<String, SyncError> {
        let keys = Keys { kind, log };
        match kind {
            EventKind::EventCreated => self.event_created(&keys).await,
            EventKind::ParticipantRegistered => self.participant_registered(&keys).await,
            EventKind::ParticipantCheckedIn => self.participant_checked_in(&keys).await,
            EventKind::SponsorAdded => self.sponsor_added(&keys).await,
            EventKind::TicketIssued => self.ticket_issued(&keys).await,
            EventKind::TicketUsed => self.ticket_used(&keys).await,
        }
    }

    async fn event_created(&self, keys: &Keys<'_>) -> Result<String, SyncError> {
        let contract = keys.contract()?;
        let event_id = keys.uint(1)?;
        let d = self.reader.event_details(event_id).await?;

        let record = EventRecord {
            contract_address: contract,
            event_id: event_id.to_string(),
            organizer: checksum(&d.organizer),
            title: d.title,
            description: d.description,
            start_time: to_i64(d.start_time),
            end_time: to_i64(d.end_time),
            location: d.location,
            max_participants: to_u64(d.max_participants),
            participant_count: to_u64(d.participant_count),
            active: d.active,
            created_at: to_i64(d.created_at),
            synced_at: Utc::now(),
        };

        match self.store.insert_event(&record).await {
            Ok(()) => Ok(format!("saved event {event_id}")),
            Err(e) if e.is_conflict() => {
                self.store.update_event(&record).await?;
                Ok(format!("updated event {event_id}"))
            }
            Err(e) => Err(e),
        }
    }

    async fn participant_registered(&self, keys: &Keys<'_>) -> Result<String, SyncError> {
        let contract = keys.contract()?;
        let event_id = keys.uint(1)?;
        let wallet = keys.address(2)?;
        let p = self.canonical_participant(event_id, wallet).await?;
        let record = participant_record(&contract, event_id, p);

        match self.store.insert_participant(&record).await {
            Ok(()) => {}
            Err(e) if e.is_conflict() => {
                self.store.update_participant(&record).await?;
                return Ok(format!("refreshed participant {} of event {event_id}", record.wallet));
            }
            Err(e) => return Err(e),
        }

        // The stored event may already carry this registration if it was
        // saved after the fact (backfill), so the contract's count caps it.
        let id = event_id.to_string();
        let counted = match self.reader.participant_count(event_id).await {
            Ok(ceiling) => self.store.increment_participant_count(&contract, &id, ceiling).await,
            Err(e) => Err(e),
        };
        match counted {
            Ok(count) => Ok(format!("registered {} for event {event_id} ({count} participants)", record.wallet)),
            Err(e) => {
                tracing::warn!(event_id = %id, error = %e, "participant stored but event counter not updated");
                Ok(format!("registered {} for event {event_id}; counter not updated: {e}", record.wallet))
            }
        }
    }

    async fn participant_checked_in(&self, keys: &Keys<'_>) -> Result<String, SyncError> {
        let contract = keys.contract()?;
        let event_id = keys.uint(1)?;
        let wallet = keys.address(2)?;
        let id = event_id.to_string();
        let wallet_str = checksum(&wallet);

        let mut stored = self
            .store
            .get_participant(&contract, &id, &wallet_str)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound { entity: "participant", key: format!("{id}/{wallet_str}") })?;

        let p = self.canonical_participant(event_id, wallet).await?;
        stored.name = p.name;
        stored.checked_in = true;
        stored.check_in_time = match to_i64(p.check_in_time) {
            0 => Utc::now().timestamp(),
            t => t,
        };
        self.store.update_participant(&stored).await?;
        Ok(format!("checked in {wallet_str} at event {event_id}"))
    }

    async fn sponsor_added(&self, keys: &Keys<'_>) -> Result<String, SyncError> {
        let contract = keys.contract()?;
        let event_id = keys.uint(1)?;
        let wallet = keys.address(2)?;
        let amount = topics::data_uint(&keys.log.data, 0);

        let s = self
            .reader
            .find_sponsor(event_id, wallet, amount)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound {
                entity: "sponsor",
                key: format!("{event_id}/{}", checksum(&wallet)),
            })?;

        let record = SponsorRecord {
            contract_address: contract,
            event_id: event_id.to_string(),
            wallet: checksum(&s.wallet),
            name: s.name,
            amount: s.amount.to_string(),
            sponsored_at: to_i64(s.sponsored_at),
        };
        match self.store.insert_sponsor(&record).await {
            Ok(()) => Ok(format!("sponsor {} added {} to event {event_id}", record.wallet, record.amount)),
            Err(e) if e.is_conflict() => Ok(format!("sponsor {} already stored", record.wallet)),
            Err(e) => Err(e),
        }
    }

    async fn ticket_issued(&self, keys: &Keys<'_>) -> Result<String, SyncError> {
        let contract = keys.contract()?;
        let token_id = keys.uint(1)?;
        let t = self.reader.ticket(token_id).await?;

        let record = TicketRecord {
            contract_address: contract,
            token_id: token_id.to_string(),
            event_id: t.event_id.to_string(),
            holder: checksum(&t.holder),
            event_title: t.event_title,
            location: t.location,
            start_time: to_i64(t.start_time),
            end_time: to_i64(t.end_time),
            used: t.used,
            issued_at: to_i64(t.issued_at),
        };
        match self.store.insert_ticket(&record).await {
            Ok(()) => Ok(format!("issued ticket {token_id} to {}", record.holder)),
            Err(e) if e.is_conflict() => {
                self.store.update_ticket(&record).await?;
                Ok(format!("updated ticket {token_id}"))
            }
            Err(e) => Err(e),
        }
    }

    async fn ticket_used(&self, keys: &Keys<'_>) -> Result<String, SyncError> {
        let tag = EventKind::TicketUsed.tag();
        if self.audit.has_success(&keys.log.tx_hash, tag).await? {
            tracing::debug!(tx = %keys.log.tx_hash, "duplicate ticket_used delivery");
            return Ok("no-op: duplicate delivery".into());
        }

        let contract = keys.contract()?;
        let token_id = keys.uint(1)?;
        if self.store.mark_ticket_used(&contract, &token_id.to_string()).await? {
            Ok(format!("ticket {token_id} marked used"))
        } else {
            Ok(format!("no-op: ticket {token_id} already used"))
        }
    }

    async fn canonical_participant(&self, event_id: U256, wallet: Address) -> Result<ParticipantDetails, SyncError> {
        self.reader
            .find_participant(event_id, wallet)
            .await?
            .ok_or_else(|| SyncError::RecordNotFound {
                entity: "participant",
                key: format!("{event_id}/{}", checksum(&wallet)),
            })
    }
}

fn participant_record(contract: &str, event_id: U256, p: ParticipantDetails) -> ParticipantRecord {
    ParticipantRecord {
        contract_address: contract.to_string(),
        event_id: event_id.to_string(),
        wallet: checksum(&p.wallet),
        name: p.name,
        registered_at: to_i64(p.registered_at),
        checked_in: p.checked_in,
        check_in_time: to_i64(p.check_in_time),
    }
}
