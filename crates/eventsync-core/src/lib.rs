//! eventsync-core — foundation for the event-registry ingestion pipeline.
//!
//! # Architecture
//!
//! ```text
//! EndpointResolver → SubscriptionEngine ─┐
//!                    BackfillCoordinator ┴→ Dispatcher → Reconciler
//!                                                          ├── ContractReader (read-back)
//!                                                          ├── EventStore     (domain records)
//!                                                          └── AuditTrail     (ingestion log / checkpoint)
//! ```
//!
//! This crate holds the chain-agnostic pieces: persisted records, the event
//! taxonomy and its topic hashes, the error taxonomy, the store traits the
//! storage backends implement, and pipeline configuration.

pub mod config;
pub mod error;
pub mod kind;
pub mod network;
pub mod query;
pub mod store;
pub mod types;

pub use config::{PipelineConfig, RestartPolicy};
pub use error::SyncError;
pub use kind::{EventKind, LogKind, CHECKPOINT_KIND};
pub use network::NetworkProfile;
pub use query::QueryService;
pub use store::{AuditTrail, EventStore};
pub use types::{
    EventRecord, IngestionLogEntry, IngestionStats, IngestionStatus, ParticipantRecord,
    SponsorRecord, TicketRecord,
};

/// Audit kind tag for `received` markers written by the live engine.
pub const RECEIVED_LIVE: &str = "event_subscription";
/// Audit kind tag for `received` markers written during backfill.
pub const RECEIVED_BACKFILL: &str = "event_backfill";
