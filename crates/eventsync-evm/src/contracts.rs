//! Contract Query Interface: typed reads against the event registry and the
//! ticket contract.
//!
//! Calls are built and decoded with alloy's dynamic ABI. Each read is a
//! single attempt bounded by the configured timeout; retrying is the
//! caller's business. The list reads enumerate by count then index, and a
//! failing index is logged and skipped so one bad entry never hides the
//! rest of the list.

use std::sync::Arc;
use std::time::Duration;

use alloy_core::dyn_abi::{DynSolType, DynSolValue};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use eventsync_core::kind::selector;
use eventsync_core::SyncError;
use eventsync_rpc::EthQuery;

/// Contract read signatures.
pub mod sig {
    pub const GET_EVENT: &str = "getEvent(uint256)";
    pub const GET_PARTICIPANT_COUNT: &str = "getParticipantCount(uint256)";
    pub const EVENT_PARTICIPANTS: &str = "eventParticipants(uint256,uint256)";
    pub const GET_SPONSOR_COUNT: &str = "getSponsorCount(uint256)";
    pub const EVENT_SPONSORS: &str = "eventSponsors(uint256,uint256)";
    pub const GET_TICKET: &str = "getTicket(uint256)";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetails {
    pub id: U256,
    pub organizer: Address,
    pub title: String,
    pub description: String,
    pub start_time: U256,
    pub end_time: U256,
    pub location: String,
    pub max_participants: U256,
    pub participant_count: U256,
    pub active: bool,
    pub created_at: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantDetails {
    pub wallet: Address,
    pub name: String,
    pub registered_at: U256,
    pub checked_in: bool,
    pub check_in_time: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SponsorDetails {
    pub wallet: Address,
    pub name: String,
    pub amount: U256,
    pub sponsored_at: U256,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketDetails {
    pub token_id: U256,
    pub event_id: U256,
    pub holder: Address,
    pub event_title: String,
    pub location: String,
    pub start_time: U256,
    pub end_time: U256,
    pub used: bool,
    pub issued_at: U256,
}

/// Read-back surface the reconciliation handlers depend on.
///
/// The contract offers no single-participant or single-sponsor lookup, so
/// [`find_participant`](Self::find_participant) and
/// [`find_sponsor`](Self::find_sponsor) scan the full list. Keeping the scan
/// here means a contract that grows a direct lookup only changes this trait's
/// implementation.
#[async_trait]
pub trait ContractReader: Send + Sync {
    async fn event_details(&self, event_id: U256) -> Result<EventDetails, SyncError>;

    /// The registry's own participant count for the event.
    async fn participant_count(&self, event_id: U256) -> Result<u64, SyncError>;

    async fn event_participants(&self, event_id: U256) -> Result<Vec<ParticipantDetails>, SyncError>;

    async fn event_sponsors(&self, event_id: U256) -> Result<Vec<SponsorDetails>, SyncError>;

    async fn ticket(&self, token_id: U256) -> Result<TicketDetails, SyncError>;

    async fn find_participant(
        &self,
        event_id: U256,
        wallet: Address,
    ) -> Result<Option<ParticipantDetails>, SyncError> {
        Ok(self
            .event_participants(event_id)
            .await?
            .into_iter()
            .find(|p| p.wallet == wallet))
    }

    /// Most recent entry for `wallet`, preferring one whose amount equals
    /// `amount` when given.
    async fn find_sponsor(
        &self,
        event_id: U256,
        wallet: Address,
        amount: Option<U256>,
    ) -> Result<Option<SponsorDetails>, SyncError> {
        let mine: Vec<_> = self
            .event_sponsors(event_id)
            .await?
            .into_iter()
            .filter(|s| s.wallet == wallet)
            .collect();
        let exact = amount.and_then(|a| mine.iter().rev().find(|s| s.amount == a).cloned());
        Ok(exact.or_else(|| mine.last().cloned()))
    }
}

/// [`ContractReader`] over an [`EthQuery`].
pub struct EvmContracts {
    query: Arc<dyn EthQuery>,
    registry: String,
    tickets: String,
    timeout: Duration,
}

impl EvmContracts {
    pub fn new(
        query: Arc<dyn EthQuery>,
        registry: impl Into<String>,
        tickets: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self { query, registry: registry.into(), tickets: tickets.into(), timeout }
    }

    async fn call(
        &self,
        to: &str,
        signature: &'static str,
        args: &[U256],
        returns: DynSolType,
    ) -> Result<Vec<DynSolValue>, SyncError> {
        let fail = |reason: String| SyncError::ContractCall { method: method_name(signature).to_string(), reason };

        let mut data = selector(signature).to_vec();
        let params = DynSolValue::Tuple(args.iter().map(|a| DynSolValue::Uint(*a, 256)).collect());
        data.extend(params.abi_encode_params());

        let output = tokio::time::timeout(self.timeout, self.query.call(to, &data))
            .await
            .map_err(|_| fail(format!("timed out after {:?}", self.timeout)))?
            .map_err(|e| fail(e.to_string()))?;
        if output.is_empty() {
            return Err(fail("empty return data".into()));
        }

        match returns.abi_decode_params(&output).map_err(|e| fail(format!("decode: {e}")))? {
            DynSolValue::Tuple(values) => Ok(values),
            other => Ok(vec![other]),
        }
    }

    async fn count(&self, signature: &'static str, event_id: U256) -> Result<u64, SyncError> {
        let values = self.call(&self.registry, signature, &[event_id], outputs(vec![DynSolType::Uint(256)])).await?;
        let fields = Fields::new(signature, &values);
        let count = fields.uint(0)?;
        u64::try_from(count).map_err(|_| SyncError::ContractCall {
            method: method_name(signature).to_string(),
            reason: format!("implausible count {count}"),
        })
    }
}

/// `"getEvent(uint256)"` → `"getEvent"`
fn method_name(signature: &str) -> &str {
    signature.split('(').next().unwrap_or(signature)
}

fn outputs(types: Vec<DynSolType>) -> DynSolType {
    DynSolType::Tuple(types)
}

/// `(id, organizer, title, description, startTime, endTime, location,
/// maxParticipants, participantCount, active, createdAt)`
fn event_struct() -> DynSolType {
    DynSolType::Tuple(vec![
        DynSolType::Uint(256),
        DynSolType::Address,
        DynSolType::String,
        DynSolType::String,
        DynSolType::Uint(256),
        DynSolType::Uint(256),
        DynSolType::String,
        DynSolType::Uint(256),
        DynSolType::Uint(256),
        DynSolType::Bool,
        DynSolType::Uint(256),
    ])
}

/// `(tokenId, eventId, holder, eventTitle, location, startTime, endTime,
/// used, issuedAt)`
fn ticket_struct() -> DynSolType {
    DynSolType::Tuple(vec![
        DynSolType::Uint(256),
        DynSolType::Uint(256),
        DynSolType::Address,
        DynSolType::String,
        DynSolType::String,
        DynSolType::Uint(256),
        DynSolType::Uint(256),
        DynSolType::Bool,
        DynSolType::Uint(256),
    ])
}

/// Positional accessor over decoded return values.
struct Fields<'a> {
    method: &'static str,
    values: &'a [DynSolValue],
}

impl<'a> Fields<'a> {
    fn new(method: &'static str, values: &'a [DynSolValue]) -> Self {
        Self { method, values }
    }

    /// Unwrap a single struct return into its members.
    fn single_struct(method: &'static str, values: &'a [DynSolValue]) -> Result<Self, SyncError> {
        match values {
            [DynSolValue::Tuple(inner)] => Ok(Self::new(method, inner)),
            _ => Err(SyncError::ContractCall {
                method: method_name(method).to_string(),
                reason: format!("expected one struct, got {} values", values.len()),
            }),
        }
    }

    fn get(&self, i: usize) -> Result<&DynSolValue, SyncError> {
        self.values.get(i).ok_or_else(|| self.mismatch(i, "missing"))
    }

    fn mismatch(&self, i: usize, what: &str) -> SyncError {
        SyncError::ContractCall {
            method: method_name(self.method).to_string(),
            reason: format!("return field {i}: {what}"),
        }
    }

    fn uint(&self, i: usize) -> Result<U256, SyncError> {
        self.get(i)?.as_uint().map(|(v, _)| v).ok_or_else(|| self.mismatch(i, "expected uint"))
    }

    fn address(&self, i: usize) -> Result<Address, SyncError> {
        self.get(i)?.as_address().ok_or_else(|| self.mismatch(i, "expected address"))
    }

    fn string(&self, i: usize) -> Result<String, SyncError> {
        self.get(i)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.mismatch(i, "expected string"))
    }

    fn boolean(&self, i: usize) -> Result<bool, SyncError> {
        self.get(i)?.as_bool().ok_or_else(|| self.mismatch(i, "expected bool"))
    }
}

#[async_trait]
impl ContractReader for EvmContracts {
    async fn event_details(&self, event_id: U256) -> Result<EventDetails, SyncError> {
        let values = self.call(&self.registry, sig::GET_EVENT, &[event_id], outputs(vec![event_struct()])).await?;
        let f = Fields::single_struct(sig::GET_EVENT, &values)?;
        Ok(EventDetails {
            id: f.uint(0)?,
            organizer: f.address(1)?,
            title: f.string(2)?,
            description: f.string(3)?,
            start_time: f.uint(4)?,
            end_time: f.uint(5)?,
            location: f.string(6)?,
            max_participants: f.uint(7)?,
            participant_count: f.uint(8)?,
            active: f.boolean(9)?,
            created_at: f.uint(10)?,
        })
    }

    async fn participant_count(&self, event_id: U256) -> Result<u64, SyncError> {
        self.count(sig::GET_PARTICIPANT_COUNT, event_id).await
    }

    async fn event_participants(&self, event_id: U256) -> Result<Vec<ParticipantDetails>, SyncError> {
        let count = self.participant_count(event_id).await?;
        let returns = || {
            outputs(vec![
                DynSolType::Address,
                DynSolType::String,
                DynSolType::Uint(256),
                DynSolType::Bool,
                DynSolType::Uint(256),
            ])
        };

        let mut out = Vec::with_capacity(count.min(256) as usize);
        for index in 0..count {
            let read = async {
                let values = self
                    .call(&self.registry, sig::EVENT_PARTICIPANTS, &[event_id, U256::from(index)], returns())
                    .await?;
                let f = Fields::new(sig::EVENT_PARTICIPANTS, &values);
                Ok::<_, SyncError>(ParticipantDetails {
                    wallet: f.address(0)?,
                    name: f.string(1)?,
                    registered_at: f.uint(2)?,
                    checked_in: f.boolean(3)?,
                    check_in_time: f.uint(4)?,
                })
            };
            match read.await {
                Ok(p) => out.push(p),
                Err(e) => tracing::warn!(%event_id, index, error = %e, "skipping unreadable participant"),
            }
        }
        Ok(out)
    }

    async fn event_sponsors(&self, event_id: U256) -> Result<Vec<SponsorDetails>, SyncError> {
        let count = self.count(sig::GET_SPONSOR_COUNT, event_id).await?;
        let returns = || {
            outputs(vec![DynSolType::Address, DynSolType::String, DynSolType::Uint(256), DynSolType::Uint(256)])
        };

        let mut out = Vec::with_capacity(count.min(256) as usize);
        for index in 0..count {
            let read = async {
                let values = self
                    .call(&self.registry, sig::EVENT_SPONSORS, &[event_id, U256::from(index)], returns())
                    .await?;
                let f = Fields::new(sig::EVENT_SPONSORS, &values);
                Ok::<_, SyncError>(SponsorDetails {
                    wallet: f.address(0)?,
                    name: f.string(1)?,
                    amount: f.uint(2)?,
                    sponsored_at: f.uint(3)?,
                })
            };
            match read.await {
                Ok(s) => out.push(s),
                Err(e) => tracing::warn!(%event_id, index, error = %e, "skipping unreadable sponsor"),
            }
        }
        Ok(out)
    }

    async fn ticket(&self, token_id: U256) -> Result<TicketDetails, SyncError> {
        let values = self.call(&self.tickets, sig::GET_TICKET, &[token_id], outputs(vec![ticket_struct()])).await?;
        let f = Fields::single_struct(sig::GET_TICKET, &values)?;
        Ok(TicketDetails {
            token_id: f.uint(0)?,
            event_id: f.uint(1)?,
            holder: f.address(2)?,
            event_title: f.string(3)?,
            location: f.string(4)?,
            start_time: f.uint(5)?,
            end_time: f.uint(6)?,
            used: f.boolean(7)?,
            issued_at: f.uint(8)?,
        })
    }
}
