//! eventsync-evm — contract read-back, reconciliation and the live/backfill
//! ingestion loops.
//!
//! # Architecture
//!
//! ```text
//! Supervisor
//!   ├── BackfillCoordinator ─┐  (catch-up, degraded polling)
//!   └── SubscriptionEngine ──┴→ Dispatcher → Reconciler → ContractReader
//!                                   │                        EventStore
//!                                   └──────────────────────→ AuditTrail
//! ```

pub mod backfill;
pub mod builder;
pub mod contracts;
pub mod dispatch;
pub mod engine;
pub mod handlers;
pub mod supervisor;
pub mod topics;

pub use backfill::{BackfillCoordinator, BackfillReport};
pub use builder::{Pipeline, PipelineBuilder};
pub use contracts::{
    ContractReader, EventDetails, EvmContracts, ParticipantDetails, SponsorDetails, TicketDetails,
};
pub use dispatch::{Dispatched, Dispatcher, Source};
pub use engine::{EngineState, SubscriptionEngine};
pub use handlers::Reconciler;
pub use supervisor::{EndpointSource, Supervisor, SupervisorExit};
