//! In-process fake chain for pipeline tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use tokio::sync::mpsc;

use eventsync_core::kind::selector;
use eventsync_core::{EventKind, SyncError};
use eventsync_evm::contracts::sig;
use eventsync_evm::{EventDetails, ParticipantDetails, PipelineBuilder, SponsorDetails, TicketDetails};
use eventsync_evm::{EndpointSource, Pipeline};
use eventsync_rpc::subscriptions::NotificationSender;
use eventsync_rpc::{
    EthQuery, LogFilter, LogSubscriber, LogSubscription, RawLog, ResolvedEndpoint, StreamHandle, TransportError,
};
use eventsync_storage::MemoryStore;

pub const REGISTRY: &str = "0x062F04385CC31a88c4A1996d07b747B914e09E27";
pub const TICKETS: &str = "0xF15742734183129cb6f42d2606851952a9b7A4AA";

#[derive(Default)]
struct State {
    head: u64,
    logs: Vec<RawLog>,
    events: HashMap<U256, EventDetails>,
    /// `None` entries answer with bytes that cannot be decoded.
    participants: HashMap<U256, Vec<Option<ParticipantDetails>>>,
    sponsors: HashMap<U256, Vec<SponsorDetails>>,
    tickets: HashMap<U256, TicketDetails>,
    /// `eth_getLogs` fails for any range containing this block.
    poisoned_block: Option<u64>,
    ranges: Vec<(u64, u64)>,
}

#[derive(Default)]
pub struct FakeChain {
    state: Mutex<State>,
}

impl FakeChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    pub fn push_log(&self, log: RawLog) {
        self.state().logs.push(log);
    }

    pub fn poison_block(&self, block: Option<u64>) {
        self.state().poisoned_block = block;
    }

    /// Every `(from, to)` range requested so far.
    pub fn ranges(&self) -> Vec<(u64, u64)> {
        self.state().ranges.clone()
    }

    /// `participantCount` is answered from the participant list, as the
    /// registry does, so it grows with [`add_participant`](Self::add_participant).
    pub fn add_event(&self, id: u64, title: &str) {
        let details = EventDetails {
            id: U256::from(id),
            organizer: Address::repeat_byte(0x0e),
            title: title.into(),
            description: format!("{title} description"),
            start_time: U256::from(1_700_000_000u64),
            end_time: U256::from(1_700_100_000u64),
            location: "Lisbon".into(),
            max_participants: U256::from(100u64),
            participant_count: U256::ZERO,
            active: true,
            created_at: U256::from(1_699_000_000u64),
        };
        self.state().events.insert(U256::from(id), details);
    }

    pub fn add_participant(&self, event_id: u64, wallet: Address, name: &str) {
        let p = ParticipantDetails {
            wallet,
            name: name.into(),
            registered_at: U256::from(1_700_000_100u64),
            checked_in: false,
            check_in_time: U256::ZERO,
        };
        self.state().participants.entry(U256::from(event_id)).or_default().push(Some(p));
    }

    pub fn add_broken_participant(&self, event_id: u64) {
        self.state().participants.entry(U256::from(event_id)).or_default().push(None);
    }

    pub fn check_in(&self, event_id: u64, wallet: Address, at: u64) {
        let mut state = self.state();
        for p in state.participants.entry(U256::from(event_id)).or_default().iter_mut().flatten() {
            if p.wallet == wallet {
                p.checked_in = true;
                p.check_in_time = U256::from(at);
            }
        }
    }

    pub fn add_sponsor(&self, event_id: u64, wallet: Address, name: &str, amount: U256, at: u64) {
        let s = SponsorDetails { wallet, name: name.into(), amount, sponsored_at: U256::from(at) };
        self.state().sponsors.entry(U256::from(event_id)).or_default().push(s);
    }

    pub fn add_ticket(&self, token_id: u64, event_id: u64, holder: Address) {
        let t = TicketDetails {
            token_id: U256::from(token_id),
            event_id: U256::from(event_id),
            holder,
            event_title: "ETH Lisbon".into(),
            location: "Lisbon".into(),
            start_time: U256::from(1_700_000_000u64),
            end_time: U256::from(1_700_100_000u64),
            used: false,
            issued_at: U256::from(1_700_000_500u64),
        };
        self.state().tickets.insert(U256::from(token_id), t);
    }

    fn answer(&self, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        let revert = || TransportError::Other("execution reverted".into());
        if data.len() < 4 {
            return Err(revert());
        }
        let (sel, rest) = data.split_at(4);
        let uint = |v: U256| DynSolValue::Uint(v, 256);
        let args = |n: usize| -> Result<Vec<U256>, TransportError> {
            let ty = DynSolType::Tuple(vec![DynSolType::Uint(256); n]);
            let decoded = ty.abi_decode_params(rest).map_err(|e| TransportError::Other(e.to_string()))?;
            let DynSolValue::Tuple(values) = decoded else { return Err(revert()) };
            Ok(values.iter().filter_map(|v| v.as_uint().map(|(u, _)| u)).collect())
        };
        let state = self.state();

        let out = if sel == selector(sig::GET_EVENT) {
            let id = args(1)?[0];
            let e = state.events.get(&id).ok_or_else(revert)?;
            let registered = state.participants.get(&id).map_or(0, Vec::len);
            DynSolValue::Tuple(vec![DynSolValue::Tuple(vec![
                uint(e.id),
                DynSolValue::Address(e.organizer),
                DynSolValue::String(e.title.clone()),
                DynSolValue::String(e.description.clone()),
                uint(e.start_time),
                uint(e.end_time),
                DynSolValue::String(e.location.clone()),
                uint(e.max_participants),
                uint(U256::from(registered)),
                DynSolValue::Bool(e.active),
                uint(e.created_at),
            ])])
        } else if sel == selector(sig::GET_PARTICIPANT_COUNT) {
            let id = args(1)?[0];
            let n = state.participants.get(&id).map_or(0, Vec::len);
            DynSolValue::Tuple(vec![uint(U256::from(n))])
        } else if sel == selector(sig::EVENT_PARTICIPANTS) {
            let a = args(2)?;
            let entry = state
                .participants
                .get(&a[0])
                .and_then(|list| list.get(usize::try_from(a[1]).ok()?))
                .ok_or_else(revert)?;
            let Some(p) = entry else {
                return Ok(vec![0xde, 0xad, 0xbe, 0xef, 0x00]);
            };
            DynSolValue::Tuple(vec![
                DynSolValue::Address(p.wallet),
                DynSolValue::String(p.name.clone()),
                uint(p.registered_at),
                DynSolValue::Bool(p.checked_in),
                uint(p.check_in_time),
            ])
        } else if sel == selector(sig::GET_SPONSOR_COUNT) {
            let id = args(1)?[0];
            let n = state.sponsors.get(&id).map_or(0, Vec::len);
            DynSolValue::Tuple(vec![uint(U256::from(n))])
        } else if sel == selector(sig::EVENT_SPONSORS) {
            let a = args(2)?;
            let s = state
                .sponsors
                .get(&a[0])
                .and_then(|list| list.get(usize::try_from(a[1]).ok()?))
                .ok_or_else(revert)?;
            DynSolValue::Tuple(vec![
                DynSolValue::Address(s.wallet),
                DynSolValue::String(s.name.clone()),
                uint(s.amount),
                uint(s.sponsored_at),
            ])
        } else if sel == selector(sig::GET_TICKET) {
            let id = args(1)?[0];
            let t = state.tickets.get(&id).ok_or_else(revert)?;
            DynSolValue::Tuple(vec![DynSolValue::Tuple(vec![
                uint(t.token_id),
                uint(t.event_id),
                DynSolValue::Address(t.holder),
                DynSolValue::String(t.event_title.clone()),
                DynSolValue::String(t.location.clone()),
                uint(t.start_time),
                uint(t.end_time),
                DynSolValue::Bool(t.used),
                uint(t.issued_at),
            ])])
        } else {
            return Err(revert());
        };
        Ok(out.abi_encode_params())
    }
}

#[async_trait]
impl EthQuery for FakeChain {
    async fn chain_id(&self) -> Result<u64, TransportError> {
        Ok(10143)
    }

    async fn block_number(&self) -> Result<u64, TransportError> {
        Ok(self.state().head)
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, TransportError> {
        let mut state = self.state();
        state.ranges.push((filter.from_block, filter.to_block));
        let range = filter.from_block..=filter.to_block;
        if state.poisoned_block.is_some_and(|b| range.contains(&b)) {
            return Err(TransportError::Http("block range too large".into()));
        }
        Ok(state
            .logs
            .iter()
            .filter(|l| range.contains(&l.block_number_u64()))
            .filter(|l| filter.addresses.iter().any(|a| a.eq_ignore_ascii_case(&l.address)))
            .cloned()
            .collect())
    }

    async fn call(&self, _to: &str, data: &[u8]) -> Result<Vec<u8>, TransportError> {
        self.answer(data)
    }
}

/// Hands out one subscription fed by the returned sender; later subscribes fail.
pub struct ChannelSubscriber {
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<serde_json::Value, TransportError>>>>,
}

impl ChannelSubscriber {
    pub fn new() -> (Arc<Self>, NotificationSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { rx: Mutex::new(Some(rx)) }), tx)
    }
}

#[async_trait]
impl LogSubscriber for ChannelSubscriber {
    async fn subscribe_logs(&self, _: &[String]) -> Result<LogSubscription, TransportError> {
        let rx = self.rx.lock().unwrap().take();
        rx.map(|rx| LogSubscription::new("0xfeed", rx))
            .ok_or_else(|| TransportError::WebSocket("connection closed".into()))
    }
}

/// Refuses every subscribe and counts the attempts.
#[derive(Default)]
pub struct FailingSubscriber {
    pub attempts: AtomicU32,
}

#[async_trait]
impl LogSubscriber for FailingSubscriber {
    async fn subscribe_logs(&self, _: &[String]) -> Result<LogSubscription, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(TransportError::WebSocket("handshake refused".into()))
    }
}

/// Mines `log` on the chain while the subscribe is in flight. The log is
/// never pushed to the subscription, so only a range scan can find it.
pub struct RacingSubscriber {
    chain: Arc<FakeChain>,
    log: RawLog,
    tx: NotificationSender,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<serde_json::Value, TransportError>>>>,
}

impl RacingSubscriber {
    pub fn new(chain: Arc<FakeChain>, log: RawLog) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self { chain, log, tx, rx: Mutex::new(Some(rx)) })
    }
}

#[async_trait]
impl LogSubscriber for RacingSubscriber {
    async fn subscribe_logs(&self, _: &[String]) -> Result<LogSubscription, TransportError> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::WebSocket("connection closed".into()))?;
        self.chain.push_log(self.log.clone());
        self.chain.set_head(self.log.block_number_u64());
        Ok(LogSubscription::new("0xrace", rx))
    }
}

/// Endpoint source for failover tests: answers with `next` (or an
/// unreachable error when `None`) and counts resolutions.
pub struct StaticSource {
    next: Option<ResolvedEndpoint>,
    pub calls: AtomicU32,
}

impl StaticSource {
    pub fn new(next: Option<ResolvedEndpoint>) -> Arc<Self> {
        Arc::new(Self { next, calls: AtomicU32::new(0) })
    }
}

#[async_trait]
impl EndpointSource for StaticSource {
    async fn resolve(&self) -> Result<ResolvedEndpoint, SyncError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.next.clone().ok_or(SyncError::EndpointUnreachable { attempted: 2 })
    }
}

pub fn endpoint(chain: &Arc<FakeChain>, stream: StreamHandle) -> ResolvedEndpoint {
    ResolvedEndpoint { url: "https://standby".into(), chain_id: 10143, query: chain.clone(), stream }
}

pub fn uint_topic(n: u64) -> String {
    format!("0x{n:064x}")
}

pub fn address_topic(a: Address) -> String {
    format!("0x{}{}", "00".repeat(12), hex::encode(a.as_slice()))
}

pub fn raw_log(address: &str, topics: Vec<String>, data: String, block: u64, tx: &str) -> RawLog {
    RawLog {
        address: address.to_lowercase(),
        topics,
        data,
        block_number: format!("0x{block:x}"),
        block_hash: format!("0x{block:064x}"),
        tx_hash: tx.into(),
        log_index: "0x0".into(),
        removed: None,
    }
}

pub fn event_created(id: u64, block: u64, tx: &str) -> RawLog {
    let topics = vec![EventKind::EventCreated.topic(), uint_topic(id), address_topic(Address::repeat_byte(0x0e))];
    raw_log(REGISTRY, topics, "0x".into(), block, tx)
}

pub fn registered(event_id: u64, wallet: Address, block: u64, tx: &str) -> RawLog {
    let topics = vec![EventKind::ParticipantRegistered.topic(), uint_topic(event_id), address_topic(wallet)];
    raw_log(REGISTRY, topics, "0x".into(), block, tx)
}

pub fn checked_in(event_id: u64, wallet: Address, block: u64, tx: &str) -> RawLog {
    let topics = vec![EventKind::ParticipantCheckedIn.topic(), uint_topic(event_id), address_topic(wallet)];
    raw_log(REGISTRY, topics, "0x".into(), block, tx)
}

pub fn sponsor_added(event_id: u64, wallet: Address, amount: U256, block: u64, tx: &str) -> RawLog {
    let topics = vec![EventKind::SponsorAdded.topic(), uint_topic(event_id), address_topic(wallet)];
    let data = format!("0x{}", hex::encode(amount.to_be_bytes::<32>()));
    raw_log(REGISTRY, topics, data, block, tx)
}

pub fn ticket_issued(token_id: u64, holder: Address, block: u64, tx: &str) -> RawLog {
    let topics = vec![EventKind::TicketIssued.topic(), uint_topic(token_id), address_topic(holder)];
    raw_log(TICKETS, topics, "0x".into(), block, tx)
}

pub fn ticket_used(token_id: u64, block: u64, tx: &str) -> RawLog {
    let topics = vec![EventKind::TicketUsed.topic(), uint_topic(token_id)];
    raw_log(TICKETS, topics, "0x".into(), block, tx)
}

/// Pipeline over the fake chain and a fresh memory store.
pub fn pipeline(chain: &Arc<FakeChain>, stream: StreamHandle) -> (Pipeline, Arc<MemoryStore>) {
    pipeline_with(chain, stream, PipelineBuilder::new())
}

pub fn pipeline_with(
    chain: &Arc<FakeChain>,
    stream: StreamHandle,
    builder: PipelineBuilder,
) -> (Pipeline, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let pipeline = builder
        .contracts(REGISTRY, TICKETS)
        .call_timeout(Duration::from_secs(2))
        .build_with(chain.clone(), stream, store.clone(), store.clone())
        .unwrap();
    (pipeline, store)
}

pub fn degraded() -> StreamHandle {
    StreamHandle::Degraded { reason: "no streaming endpoint configured".into() }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
