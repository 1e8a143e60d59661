//! eventsync-storage — storage backends for the ingestion pipeline.
//!
//! Both backends implement [`EventStore`](eventsync_core::EventStore) and
//! [`AuditTrail`](eventsync_core::AuditTrail):
//! - [`memory`]: in-memory (tests, no persistence)
//! - [`sqlite`]: SQLite via `sqlx` (feature `sqlite`)

pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use memory::MemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
