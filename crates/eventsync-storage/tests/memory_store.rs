use std::sync::Arc;

use chrono::Utc;

use eventsync_core::query::{QueryService, TEST_EVENT_ID};
use eventsync_core::{
    AuditTrail, EventRecord, EventStore, IngestionLogEntry, IngestionStatus, ParticipantRecord,
    SponsorRecord, SyncError, TicketRecord,
};
use eventsync_storage::MemoryStore;

const REGISTRY: &str = "0x062F04385CC31a88c4A1996d07b747B914e09E27";
const TICKETS: &str = "0xF15742734183129cb6f42d2606851952a9b7A4AA";
const ALICE: &str = "0x1111111111111111111111111111111111111111";

fn event(id: &str, organizer: &str) -> EventRecord {
    EventRecord {
        contract_address: REGISTRY.into(),
        event_id: id.into(),
        organizer: organizer.into(),
        title: format!("Event {id}"),
        description: String::new(),
        start_time: 1_700_000_000,
        end_time: 1_700_100_000,
        location: "Lisbon".into(),
        max_participants: 10,
        participant_count: 0,
        active: true,
        created_at: 1_699_000_000,
        synced_at: Utc::now(),
    }
}

fn ticket(token: &str, holder: &str) -> TicketRecord {
    TicketRecord {
        contract_address: TICKETS.into(),
        token_id: token.into(),
        event_id: "1".into(),
        holder: holder.into(),
        event_title: "Event 1".into(),
        location: "Lisbon".into(),
        start_time: 1_700_000_000,
        end_time: 1_700_100_000,
        used: false,
        issued_at: 1_700_000_500,
    }
}

#[tokio::test]
async fn update_requires_existing_row() {
    let store = MemoryStore::new();
    let err = store.update_event(&event("1", ALICE)).await.unwrap_err();
    assert!(matches!(err, SyncError::RecordNotFound { entity: "event", .. }));

    store.insert_event(&event("1", ALICE)).await.unwrap();
    let mut changed = event("1", ALICE);
    changed.title = "Renamed".into();
    store.update_event(&changed).await.unwrap();
    assert_eq!(store.get_event(REGISTRY, "1").await.unwrap().unwrap().title, "Renamed");
}

#[tokio::test]
async fn same_id_on_other_contract_is_distinct() {
    let store = MemoryStore::new();
    store.insert_event(&event("1", ALICE)).await.unwrap();
    let mut other = event("1", ALICE);
    other.contract_address = "0x2222222222222222222222222222222222222222".into();
    store.insert_event(&other).await.unwrap();
    assert_eq!(store.list_events().await.unwrap().len(), 2);
}

#[tokio::test]
async fn organizer_lookup_ignores_case() {
    let store = MemoryStore::new();
    store.insert_event(&event("1", "0xAbCdEf0000000000000000000000000000000001")).await.unwrap();
    let found = store
        .events_by_organizer(REGISTRY, "0xabcdef0000000000000000000000000000000001")
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
}

#[tokio::test]
async fn participant_counter_capped_by_contract_count() {
    let store = MemoryStore::new();
    let mut e = event("1", ALICE);
    e.participant_count = 3;
    store.insert_event(&e).await.unwrap();

    assert_eq!(store.increment_participant_count(REGISTRY, "1", 3).await.unwrap(), 3);
    assert_eq!(store.increment_participant_count(REGISTRY, "1", 4).await.unwrap(), 4);
    assert!(matches!(
        store.increment_participant_count(REGISTRY, "2", 4).await,
        Err(SyncError::RecordNotFound { entity: "event", .. })
    ));
}

#[tokio::test]
async fn ticket_used_flips_once() {
    let store = MemoryStore::new();
    store.insert_ticket(&ticket("5", ALICE)).await.unwrap();
    assert!(store.mark_ticket_used(TICKETS, "5").await.unwrap());
    assert!(!store.mark_ticket_used(TICKETS, "5").await.unwrap());
    assert!(matches!(
        store.mark_ticket_used(TICKETS, "6").await,
        Err(SyncError::RecordNotFound { entity: "ticket", .. })
    ));
}

#[tokio::test]
async fn participant_and_sponsor_conflicts() {
    let store = MemoryStore::new();
    let p = ParticipantRecord {
        contract_address: REGISTRY.into(),
        event_id: "1".into(),
        wallet: ALICE.into(),
        name: "alice".into(),
        registered_at: 1,
        checked_in: false,
        check_in_time: 0,
    };
    store.insert_participant(&p).await.unwrap();
    assert!(store.insert_participant(&p).await.unwrap_err().is_conflict());

    let s = SponsorRecord {
        contract_address: REGISTRY.into(),
        event_id: "1".into(),
        wallet: ALICE.into(),
        name: "alice".into(),
        amount: "1000000000000000000".into(),
        sponsored_at: 7,
    };
    store.insert_sponsor(&s).await.unwrap();
    assert!(store.insert_sponsor(&s).await.unwrap_err().is_conflict());
    let later = SponsorRecord { sponsored_at: 8, ..s };
    store.insert_sponsor(&later).await.unwrap();
    assert_eq!(store.sponsors_by_event(REGISTRY, "1").await.unwrap().len(), 2);
}

#[tokio::test]
async fn checkpoint_is_max_success_of_kind() {
    let store = MemoryStore::new();
    store.record(IngestionLogEntry::new("event", 1999, "", IngestionStatus::Success)).await.unwrap();
    store.record(IngestionLogEntry::new("event", 2999, "", IngestionStatus::Failed)).await.unwrap();
    store.record(IngestionLogEntry::new("ticket_used", 5000, "0xaa", IngestionStatus::Success)).await.unwrap();
    store.record(IngestionLogEntry::new("event", 999, "", IngestionStatus::Success)).await.unwrap();

    assert_eq!(store.last_success_block("event").await.unwrap(), Some(1999));
    assert!(store.has_success("0xaa", "ticket_used").await.unwrap());
    assert!(!store.has_success("0xaa", "ticket_issued").await.unwrap());
    assert_eq!(store.recent(2).await.unwrap()[0].block_number, 999);
}

#[tokio::test]
async fn query_service_stats_and_seed() {
    let store = Arc::new(MemoryStore::new());
    let query = QueryService::new(store.clone(), store.clone(), REGISTRY, TICKETS);

    let seeded = query.create_test_event().await.unwrap();
    assert_eq!(seeded.event_id, TEST_EVENT_ID);
    assert_eq!(seeded.title, "Test Hackathon");
    assert!(query.create_test_event().await.unwrap_err().is_conflict());

    store.insert_ticket(&ticket("1", ALICE)).await.unwrap();
    store.record(IngestionLogEntry::new("ticket_issued", 1, "0x01", IngestionStatus::Success)).await.unwrap();

    let stats = query.stats().await.unwrap();
    assert_eq!((stats.events, stats.tickets, stats.ingestion_entries), (1, 1, 1));
    assert_eq!(query.tickets_by_holder(&ALICE.to_uppercase().replace("0X", "0x")).await.unwrap().len(), 1);
    assert!(query.event(TEST_EVENT_ID).await.unwrap().is_some());
    assert_eq!(query.ticket("1").await.unwrap().unwrap().holder, ALICE);
}

#[tokio::test]
async fn query_service_ignores_other_contracts() {
    let store = Arc::new(MemoryStore::new());
    let other = "0x2222222222222222222222222222222222222222";
    let query = QueryService::new(store.clone(), store.clone(), REGISTRY, TICKETS);

    store.insert_event(&event("1", ALICE)).await.unwrap();
    let mut foreign = event("2", ALICE);
    foreign.contract_address = other.into();
    store.insert_event(&foreign).await.unwrap();

    store.insert_ticket(&ticket("1", ALICE)).await.unwrap();
    let mut foreign_ticket = ticket("9", ALICE);
    foreign_ticket.contract_address = other.into();
    store.insert_ticket(&foreign_ticket).await.unwrap();

    assert_eq!(store.list_events().await.unwrap().len(), 2);
    let events = query.events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id, "1");
    assert_eq!(query.events_by_organizer(ALICE).await.unwrap().len(), 1);
    assert_eq!(query.tickets("1").await.unwrap().len(), 1);
    let held = query.tickets_by_holder(ALICE).await.unwrap();
    assert_eq!(held.iter().map(|t| t.token_id.as_str()).collect::<Vec<_>>(), ["1"]);
}
