mod support;

use alloy_primitives::{Address, U256};

use eventsync_core::{AuditTrail, EventStore, IngestionStatus, RECEIVED_LIVE};
use eventsync_evm::topics::checksum;
use eventsync_evm::{Dispatched, Source};

use support::*;

fn successes(store: &eventsync_storage::MemoryStore, kind: &str) -> Vec<String> {
    store
        .ingestion_log()
        .into_iter()
        .filter(|e| e.kind == kind && e.status == IngestionStatus::Success)
        .map(|e| e.detail.unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn event_created_twice_is_one_record() {
    let chain = FakeChain::new();
    chain.add_event(1, "ETH Lisbon");
    let (pipeline, store) = pipeline(&chain, degraded());
    let dispatcher = pipeline.dispatcher();
    let log = event_created(1, 10, "0x01");

    dispatcher.dispatch(&log, Source::Live).await.unwrap();
    dispatcher.dispatch(&log, Source::Live).await.unwrap();

    let events = store.list_events().await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "ETH Lisbon");
    assert_eq!(events[0].contract_address, REGISTRY);
    assert_eq!(events[0].organizer, checksum(&Address::repeat_byte(0x0e)));
    assert_eq!(successes(&store, "event_created"), vec!["saved event 1", "updated event 1"]);
    assert_eq!(
        store.ingestion_log().iter().filter(|e| e.kind == RECEIVED_LIVE).count(),
        2,
        "every delivery leaves a received marker"
    );
}

#[tokio::test]
async fn sponsor_added_end_to_end() {
    let chain = FakeChain::new();
    let sponsor = Address::repeat_byte(0xaa);
    let amount = U256::from(1_000_000_000_000_000_000u64);
    chain.add_sponsor(7, Address::repeat_byte(0xbb), "Other", U256::from(5u64), 1_700_000_001);
    chain.add_sponsor(7, sponsor, "Acme", amount, 1_700_000_002);
    let (pipeline, store) = pipeline(&chain, degraded());

    let outcome = pipeline
        .dispatcher()
        .dispatch(&sponsor_added(7, sponsor, amount, 42, "0xabc"), Source::Live)
        .await
        .unwrap();
    assert!(matches!(outcome, Dispatched::Applied { .. }));

    let sponsors = store.sponsors_by_event(REGISTRY, "7").await.unwrap();
    assert_eq!(sponsors.len(), 1);
    assert_eq!(sponsors[0].event_id, "7");
    assert_eq!(sponsors[0].wallet, checksum(&sponsor));
    assert_eq!(sponsors[0].amount, "1000000000000000000");
    assert_eq!(sponsors[0].name, "Acme");
    assert_eq!(successes(&store, "sponsor_added").len(), 1);
    assert!(store.has_success("0xabc", "sponsor_added").await.unwrap());
}

#[tokio::test]
async fn ticket_used_duplicate_delivery_is_noop() {
    let chain = FakeChain::new();
    let holder = Address::repeat_byte(0x11);
    chain.add_ticket(5, 1, holder);
    let (pipeline, store) = pipeline(&chain, degraded());
    let dispatcher = pipeline.dispatcher();

    dispatcher.dispatch(&ticket_issued(5, holder, 10, "0x10"), Source::Live).await.unwrap();
    assert!(!store.get_ticket(TICKETS, "5").await.unwrap().unwrap().used);

    let used = ticket_used(5, 11, "0x11");
    dispatcher.dispatch(&used, Source::Live).await.unwrap();
    dispatcher.dispatch(&used, Source::Live).await.unwrap();
    // Same token, different transaction: found already used.
    dispatcher.dispatch(&ticket_used(5, 12, "0x12"), Source::Live).await.unwrap();

    let ticket = store.get_ticket(TICKETS, "5").await.unwrap().unwrap();
    assert!(ticket.used);
    assert_eq!(ticket.holder, checksum(&holder));
    assert_eq!(
        successes(&store, "ticket_used"),
        vec!["ticket 5 marked used", "no-op: duplicate delivery", "no-op: ticket 5 already used"]
    );
}

#[tokio::test]
async fn check_in_before_registration_fails() {
    let chain = FakeChain::new();
    let wallet = Address::repeat_byte(0x22);
    chain.add_event(1, "ETH Lisbon");
    chain.add_participant(1, wallet, "alice");
    chain.check_in(1, wallet, 1_700_000_200);
    let (pipeline, store) = pipeline(&chain, degraded());

    let outcome = pipeline
        .dispatcher()
        .dispatch(&checked_in(1, wallet, 20, "0x20"), Source::Live)
        .await
        .unwrap();
    match outcome {
        Dispatched::Failed { reason, .. } => assert!(reason.contains("participant not found"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(store.participants_by_event(REGISTRY, "1").await.unwrap().is_empty());
    let failed: Vec<_> = store
        .ingestion_log()
        .into_iter()
        .filter(|e| e.kind == "participant_checked_in")
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].status, IngestionStatus::Failed);
}

#[tokio::test]
async fn registration_then_check_in() {
    let chain = FakeChain::new();
    let wallet = Address::repeat_byte(0x22);
    chain.add_event(1, "ETH Lisbon");
    chain.add_participant(1, wallet, "alice");
    let (pipeline, store) = pipeline(&chain, degraded());
    let dispatcher = pipeline.dispatcher();

    dispatcher.dispatch(&event_created(1, 1, "0x01"), Source::Live).await.unwrap();
    dispatcher.dispatch(&registered(1, wallet, 2, "0x02"), Source::Live).await.unwrap();
    // Redelivery refreshes the row without counting twice.
    dispatcher.dispatch(&registered(1, wallet, 2, "0x02"), Source::Live).await.unwrap();
    assert_eq!(store.get_event(REGISTRY, "1").await.unwrap().unwrap().participant_count, 1);

    chain.check_in(1, wallet, 1_700_000_200);
    dispatcher.dispatch(&checked_in(1, wallet, 3, "0x03"), Source::Live).await.unwrap();

    let p = store.get_participant(REGISTRY, "1", &checksum(&wallet)).await.unwrap().unwrap();
    assert!(p.checked_in);
    assert_eq!(p.check_in_time, 1_700_000_200);
    assert_eq!(p.name, "alice");
}

#[tokio::test]
async fn unknown_and_short_logs() {
    let chain = FakeChain::new();
    let (pipeline, store) = pipeline(&chain, degraded());
    let dispatcher = pipeline.dispatcher();

    let transfer = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef".to_string();
    let unknown = raw_log(REGISTRY, vec![transfer.clone()], "0x".into(), 5, "0x05");
    assert_eq!(
        dispatcher.dispatch(&unknown, Source::Live).await.unwrap(),
        Dispatched::Unknown { topic0: transfer }
    );

    let mut short = event_created(1, 6, "0x06");
    short.topics.truncate(1);
    let outcome = dispatcher.dispatch(&short, Source::Live).await.unwrap();
    assert!(matches!(outcome, Dispatched::Failed { .. }));

    let mut retracted = event_created(1, 7, "0x07");
    retracted.removed = Some(true);
    assert_eq!(dispatcher.dispatch(&retracted, Source::Live).await.unwrap(), Dispatched::Removed);

    let log = store.ingestion_log();
    assert_eq!(log.iter().filter(|e| e.kind == RECEIVED_LIVE).count(), 3);
    let short_entry = log.iter().find(|e| e.kind == "event_created").unwrap();
    assert_eq!(short_entry.status, IngestionStatus::Failed);
    assert!(short_entry.detail.as_deref().unwrap().contains("expected 2 topics"));
    assert!(store.list_events().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreadable_contract_state_is_a_failed_entry() {
    let chain = FakeChain::new();
    let (pipeline, store) = pipeline(&chain, degraded());

    // No event 9 on chain: getEvent reverts.
    let outcome = pipeline.dispatcher().dispatch(&event_created(9, 1, "0x09"), Source::Live).await.unwrap();
    match outcome {
        Dispatched::Failed { reason, .. } => assert!(reason.contains("getEvent"), "{reason}"),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(store.list_events().await.unwrap().is_empty());
}
