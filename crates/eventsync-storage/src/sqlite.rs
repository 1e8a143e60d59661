//! SQLite storage backend.
//!
//! Persists domain records and the ingestion log to a single SQLite file
//! through `sqlx`. Uniqueness keys are enforced by the schema, and a unique
//! violation is reported as [`SyncError::AlreadyExists`] so handlers can
//! take their update path.
//!
//! # Usage
//! ```rust,no_run
//! use eventsync_storage::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), eventsync_core::SyncError> {
//! let store = SqliteStore::open("./eventsync.db").await?;
//! let scratch = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use eventsync_core::error::SyncError;
use eventsync_core::store::{AuditTrail, EventStore};
use eventsync_core::types::{
    EventRecord, IngestionLogEntry, IngestionStats, IngestionStatus, ParticipantRecord,
    SponsorRecord, TicketRecord,
};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS events (
        contract_address  TEXT    NOT NULL,
        event_id          TEXT    NOT NULL,
        organizer         TEXT    NOT NULL,
        title             TEXT    NOT NULL,
        description       TEXT    NOT NULL,
        start_time        INTEGER NOT NULL,
        end_time          INTEGER NOT NULL,
        location          TEXT    NOT NULL,
        max_participants  INTEGER NOT NULL,
        participant_count INTEGER NOT NULL,
        active            INTEGER NOT NULL,
        created_at        INTEGER NOT NULL,
        synced_at         TEXT    NOT NULL,
        PRIMARY KEY (contract_address, event_id)
    );",
    "CREATE TABLE IF NOT EXISTS participants (
        contract_address TEXT    NOT NULL,
        event_id         TEXT    NOT NULL,
        wallet           TEXT    NOT NULL,
        name             TEXT    NOT NULL,
        registered_at    INTEGER NOT NULL,
        checked_in       INTEGER NOT NULL,
        check_in_time    INTEGER NOT NULL,
        PRIMARY KEY (contract_address, event_id, wallet)
    );",
    "CREATE TABLE IF NOT EXISTS sponsors (
        contract_address TEXT    NOT NULL,
        event_id         TEXT    NOT NULL,
        wallet           TEXT    NOT NULL,
        name             TEXT    NOT NULL,
        amount           TEXT    NOT NULL,
        sponsored_at     INTEGER NOT NULL,
        UNIQUE (contract_address, event_id, wallet, sponsored_at)
    );",
    "CREATE TABLE IF NOT EXISTS tickets (
        contract_address TEXT    NOT NULL,
        token_id         TEXT    NOT NULL,
        event_id         TEXT    NOT NULL,
        holder           TEXT    NOT NULL,
        event_title      TEXT    NOT NULL,
        location         TEXT    NOT NULL,
        start_time       INTEGER NOT NULL,
        end_time         INTEGER NOT NULL,
        used             INTEGER NOT NULL,
        issued_at        INTEGER NOT NULL,
        PRIMARY KEY (contract_address, token_id)
    );",
    "CREATE TABLE IF NOT EXISTS ingestion_log (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        kind         TEXT    NOT NULL,
        block_number INTEGER NOT NULL,
        tx_hash      TEXT    NOT NULL,
        status       TEXT    NOT NULL,
        detail       TEXT,
        created_at   TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_log_kind_status ON ingestion_log (kind, status);",
    "CREATE INDEX IF NOT EXISTS idx_log_tx ON ingestion_log (tx_hash);",
    "CREATE INDEX IF NOT EXISTS idx_tickets_holder ON tickets (lower(holder));",
];

fn storage(e: sqlx::Error) -> SyncError {
    SyncError::Persistence(e.to_string())
}

/// Map a unique violation to `AlreadyExists`, anything else to `Persistence`.
fn on_insert(entity: &'static str, key: String) -> impl FnOnce(sqlx::Error) -> SyncError {
    move |e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            SyncError::AlreadyExists { entity, key }
        }
        _ => storage(e),
    }
}

/// SQLite integers are signed; values past `i64::MAX` are stored as `i64::MAX`.
fn to_sql_int(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn get_u64(row: &SqliteRow, col: &str) -> Result<u64, SyncError> {
    let v: i64 = row.try_get(col).map_err(storage)?;
    Ok(v.max(0) as u64)
}

fn event_from_row(row: &SqliteRow) -> Result<EventRecord, SyncError> {
    Ok(EventRecord {
        contract_address: row.try_get("contract_address").map_err(storage)?,
        event_id: row.try_get("event_id").map_err(storage)?,
        organizer: row.try_get("organizer").map_err(storage)?,
        title: row.try_get("title").map_err(storage)?,
        description: row.try_get("description").map_err(storage)?,
        start_time: row.try_get("start_time").map_err(storage)?,
        end_time: row.try_get("end_time").map_err(storage)?,
        location: row.try_get("location").map_err(storage)?,
        max_participants: get_u64(row, "max_participants")?,
        participant_count: get_u64(row, "participant_count")?,
        active: row.try_get("active").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        synced_at: row.try_get::<DateTime<Utc>, _>("synced_at").map_err(storage)?,
    })
}

fn participant_from_row(row: &SqliteRow) -> Result<ParticipantRecord, SyncError> {
    Ok(ParticipantRecord {
        contract_address: row.try_get("contract_address").map_err(storage)?,
        event_id: row.try_get("event_id").map_err(storage)?,
        wallet: row.try_get("wallet").map_err(storage)?,
        name: row.try_get("name").map_err(storage)?,
        registered_at: row.try_get("registered_at").map_err(storage)?,
        checked_in: row.try_get("checked_in").map_err(storage)?,
        check_in_time: row.try_get("check_in_time").map_err(storage)?,
    })
}

fn sponsor_from_row(row: &SqliteRow) -> Result<SponsorRecord, SyncError> {
    Ok(SponsorRecord {
        contract_address: row.try_get("contract_address").map_err(storage)?,
        event_id: row.try_get("event_id").map_err(storage)?,
        wallet: row.try_get("wallet").map_err(storage)?,
        name: row.try_get("name").map_err(storage)?,
        amount: row.try_get("amount").map_err(storage)?,
        sponsored_at: row.try_get("sponsored_at").map_err(storage)?,
    })
}

fn ticket_from_row(row: &SqliteRow) -> Result<TicketRecord, SyncError> {
    Ok(TicketRecord {
        contract_address: row.try_get("contract_address").map_err(storage)?,
        token_id: row.try_get("token_id").map_err(storage)?,
        event_id: row.try_get("event_id").map_err(storage)?,
        holder: row.try_get("holder").map_err(storage)?,
        event_title: row.try_get("event_title").map_err(storage)?,
        location: row.try_get("location").map_err(storage)?,
        start_time: row.try_get("start_time").map_err(storage)?,
        end_time: row.try_get("end_time").map_err(storage)?,
        used: row.try_get("used").map_err(storage)?,
        issued_at: row.try_get("issued_at").map_err(storage)?,
    })
}

fn log_entry_from_row(row: &SqliteRow) -> Result<IngestionLogEntry, SyncError> {
    let status: String = row.try_get("status").map_err(storage)?;
    Ok(IngestionLogEntry {
        kind: row.try_get("kind").map_err(storage)?,
        block_number: get_u64(row, "block_number")?,
        tx_hash: row.try_get("tx_hash").map_err(storage)?,
        status: IngestionStatus::parse(&status)
            .ok_or_else(|| SyncError::Persistence(format!("unknown ingestion status '{status}'")))?,
        detail: row.try_get("detail").map_err(storage)?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at").map_err(storage)?,
    })
}

fn collect<T>(rows: Vec<SqliteRow>, f: fn(&SqliteRow) -> Result<T, SyncError>) -> Result<Vec<T>, SyncError> {
    rows.iter().map(f).collect()
}

/// SQLite-backed event store and audit trail.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a database. Accepts a plain path (`"./eventsync.db"`)
    /// or a full URL (`"sqlite:./eventsync.db"`).
    pub async fn open(path: &str) -> Result<Self, SyncError> {
        let url = if path.starts_with("sqlite:") { path.to_string() } else { format!("sqlite:{path}") };
        let options = SqliteConnectOptions::from_str(&url)
            .map_err(storage)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        let pool = SqlitePoolOptions::new().connect_with(options).await.map_err(storage)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// In-memory database on a single pooled connection, so every query
    /// sees the same schema and rows.
    pub async fn in_memory() -> Result<Self, SyncError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(storage)?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), SyncError> {
        for stmt in SCHEMA {
            sqlx::query(stmt).execute(&self.pool).await.map_err(storage)?;
        }
        Ok(())
    }

    async fn count(&self, table: &str) -> Result<u64, SyncError> {
        let row = sqlx::query(&format!("SELECT COUNT(*) AS cnt FROM {table}"))
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        get_u64(&row, "cnt")
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert_event(&self, e: &EventRecord) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO events (contract_address, event_id, organizer, title, description,
                start_time, end_time, location, max_participants, participant_count,
                active, created_at, synced_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&e.contract_address)
        .bind(&e.event_id)
        .bind(&e.organizer)
        .bind(&e.title)
        .bind(&e.description)
        .bind(e.start_time)
        .bind(e.end_time)
        .bind(&e.location)
        .bind(to_sql_int(e.max_participants))
        .bind(to_sql_int(e.participant_count))
        .bind(e.active)
        .bind(e.created_at)
        .bind(e.synced_at)
        .execute(&self.pool)
        .await
        .map_err(on_insert("event", e.key()))?;
        debug!(event = %e.key(), "event stored");
        Ok(())
    }

    async fn update_event(&self, e: &EventRecord) -> Result<(), SyncError> {
        let res = sqlx::query(
            "UPDATE events SET organizer = ?, title = ?, description = ?, start_time = ?,
                end_time = ?, location = ?, max_participants = ?, participant_count = ?,
                active = ?, created_at = ?, synced_at = ?
             WHERE contract_address = ? AND event_id = ?",
        )
        .bind(&e.organizer)
        .bind(&e.title)
        .bind(&e.description)
        .bind(e.start_time)
        .bind(e.end_time)
        .bind(&e.location)
        .bind(to_sql_int(e.max_participants))
        .bind(to_sql_int(e.participant_count))
        .bind(e.active)
        .bind(e.created_at)
        .bind(e.synced_at)
        .bind(&e.contract_address)
        .bind(&e.event_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if res.rows_affected() == 0 {
            return Err(SyncError::RecordNotFound { entity: "event", key: e.key() });
        }
        Ok(())
    }

    async fn get_event(&self, contract: &str, event_id: &str) -> Result<Option<EventRecord>, SyncError> {
        let row = sqlx::query("SELECT * FROM events WHERE contract_address = ? AND event_id = ?")
            .bind(contract)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn list_events(&self) -> Result<Vec<EventRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM events ORDER BY contract_address, length(event_id), event_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        collect(rows, event_from_row)
    }

    async fn events_by_organizer(&self, contract: &str, organizer: &str) -> Result<Vec<EventRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM events WHERE contract_address = ? AND lower(organizer) = lower(?)
             ORDER BY length(event_id), event_id",
        )
        .bind(contract)
        .bind(organizer)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        collect(rows, event_from_row)
    }

    async fn increment_participant_count(
        &self,
        contract: &str,
        event_id: &str,
        ceiling: u64,
    ) -> Result<u64, SyncError> {
        sqlx::query(
            "UPDATE events SET participant_count = participant_count + 1, synced_at = ?
             WHERE contract_address = ? AND event_id = ? AND participant_count < ?",
        )
        .bind(Utc::now())
        .bind(contract)
        .bind(event_id)
        .bind(to_sql_int(ceiling))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        let row = sqlx::query("SELECT participant_count FROM events WHERE contract_address = ? AND event_id = ?")
            .bind(contract)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        match row {
            Some(r) => get_u64(&r, "participant_count"),
            None => Err(SyncError::RecordNotFound {
                entity: "event",
                key: format!("{contract}/{event_id}"),
            }),
        }
    }

    async fn insert_participant(&self, p: &ParticipantRecord) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO participants (contract_address, event_id, wallet, name,
                registered_at, checked_in, check_in_time)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&p.contract_address)
        .bind(&p.event_id)
        .bind(&p.wallet)
        .bind(&p.name)
        .bind(p.registered_at)
        .bind(p.checked_in)
        .bind(p.check_in_time)
        .execute(&self.pool)
        .await
        .map_err(on_insert("participant", format!("{}/{}", p.event_id, p.wallet)))?;
        Ok(())
    }

    async fn update_participant(&self, p: &ParticipantRecord) -> Result<(), SyncError> {
        let res = sqlx::query(
            "UPDATE participants SET name = ?, registered_at = ?, checked_in = ?, check_in_time = ?
             WHERE contract_address = ? AND event_id = ? AND wallet = ?",
        )
        .bind(&p.name)
        .bind(p.registered_at)
        .bind(p.checked_in)
        .bind(p.check_in_time)
        .bind(&p.contract_address)
        .bind(&p.event_id)
        .bind(&p.wallet)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if res.rows_affected() == 0 {
            return Err(SyncError::RecordNotFound {
                entity: "participant",
                key: format!("{}/{}", p.event_id, p.wallet),
            });
        }
        Ok(())
    }

    async fn get_participant(
        &self,
        contract: &str,
        event_id: &str,
        wallet: &str,
    ) -> Result<Option<ParticipantRecord>, SyncError> {
        let row = sqlx::query(
            "SELECT * FROM participants WHERE contract_address = ? AND event_id = ? AND wallet = ?",
        )
        .bind(contract)
        .bind(event_id)
        .bind(wallet)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        row.as_ref().map(participant_from_row).transpose()
    }

    async fn participants_by_event(&self, contract: &str, event_id: &str) -> Result<Vec<ParticipantRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM participants WHERE contract_address = ? AND event_id = ?
             ORDER BY registered_at",
        )
        .bind(contract)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        collect(rows, participant_from_row)
    }

    async fn insert_sponsor(&self, s: &SponsorRecord) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO sponsors (contract_address, event_id, wallet, name, amount, sponsored_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&s.contract_address)
        .bind(&s.event_id)
        .bind(&s.wallet)
        .bind(&s.name)
        .bind(&s.amount)
        .bind(s.sponsored_at)
        .execute(&self.pool)
        .await
        .map_err(on_insert("sponsor", format!("{}/{}@{}", s.event_id, s.wallet, s.sponsored_at)))?;
        Ok(())
    }

    async fn sponsors_by_event(&self, contract: &str, event_id: &str) -> Result<Vec<SponsorRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM sponsors WHERE contract_address = ? AND event_id = ? ORDER BY sponsored_at",
        )
        .bind(contract)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        collect(rows, sponsor_from_row)
    }

    async fn insert_ticket(&self, t: &TicketRecord) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO tickets (contract_address, token_id, event_id, holder, event_title,
                location, start_time, end_time, used, issued_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&t.contract_address)
        .bind(&t.token_id)
        .bind(&t.event_id)
        .bind(&t.holder)
        .bind(&t.event_title)
        .bind(&t.location)
        .bind(t.start_time)
        .bind(t.end_time)
        .bind(t.used)
        .bind(t.issued_at)
        .execute(&self.pool)
        .await
        .map_err(on_insert("ticket", t.token_id.clone()))?;
        Ok(())
    }

    async fn update_ticket(&self, t: &TicketRecord) -> Result<(), SyncError> {
        let res = sqlx::query(
            "UPDATE tickets SET event_id = ?, holder = ?, event_title = ?, location = ?,
                start_time = ?, end_time = ?, used = ?, issued_at = ?
             WHERE contract_address = ? AND token_id = ?",
        )
        .bind(&t.event_id)
        .bind(&t.holder)
        .bind(&t.event_title)
        .bind(&t.location)
        .bind(t.start_time)
        .bind(t.end_time)
        .bind(t.used)
        .bind(t.issued_at)
        .bind(&t.contract_address)
        .bind(&t.token_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if res.rows_affected() == 0 {
            return Err(SyncError::RecordNotFound { entity: "ticket", key: t.token_id.clone() });
        }
        Ok(())
    }

    async fn get_ticket(&self, contract: &str, token_id: &str) -> Result<Option<TicketRecord>, SyncError> {
        let row = sqlx::query("SELECT * FROM tickets WHERE contract_address = ? AND token_id = ?")
            .bind(contract)
            .bind(token_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(ticket_from_row).transpose()
    }

    async fn mark_ticket_used(&self, contract: &str, token_id: &str) -> Result<bool, SyncError> {
        let res = sqlx::query(
            "UPDATE tickets SET used = 1 WHERE contract_address = ? AND token_id = ? AND used = 0",
        )
        .bind(contract)
        .bind(token_id)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if res.rows_affected() == 1 {
            return Ok(true);
        }
        match self.get_ticket(contract, token_id).await? {
            Some(_) => Ok(false),
            None => Err(SyncError::RecordNotFound { entity: "ticket", key: token_id.to_string() }),
        }
    }

    async fn tickets_by_event(&self, contract: &str, event_id: &str) -> Result<Vec<TicketRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM tickets WHERE contract_address = ? AND event_id = ?
             ORDER BY length(token_id), token_id",
        )
        .bind(contract)
        .bind(event_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        collect(rows, ticket_from_row)
    }

    async fn tickets_by_holder(&self, contract: &str, holder: &str) -> Result<Vec<TicketRecord>, SyncError> {
        let rows = sqlx::query(
            "SELECT * FROM tickets WHERE contract_address = ? AND lower(holder) = lower(?)
             ORDER BY length(token_id), token_id",
        )
        .bind(contract)
        .bind(holder)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        collect(rows, ticket_from_row)
    }

    async fn stats(&self) -> Result<IngestionStats, SyncError> {
        Ok(IngestionStats {
            events: self.count("events").await?,
            participants: self.count("participants").await?,
            sponsors: self.count("sponsors").await?,
            tickets: self.count("tickets").await?,
            ingestion_entries: 0,
        })
    }
}

#[async_trait]
impl AuditTrail for SqliteStore {
    async fn record(&self, entry: IngestionLogEntry) -> Result<(), SyncError> {
        sqlx::query(
            "INSERT INTO ingestion_log (kind, block_number, tx_hash, status, detail, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.kind)
        .bind(to_sql_int(entry.block_number))
        .bind(&entry.tx_hash)
        .bind(entry.status.as_str())
        .bind(&entry.detail)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn last_success_block(&self, kind: &str) -> Result<Option<u64>, SyncError> {
        let row = sqlx::query(
            "SELECT MAX(block_number) AS latest FROM ingestion_log WHERE kind = ? AND status = 'success'",
        )
        .bind(kind)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        let latest: Option<i64> = row.try_get("latest").map_err(storage)?;
        Ok(latest.map(|b| b.max(0) as u64))
    }

    async fn has_success(&self, tx_hash: &str, kind: &str) -> Result<bool, SyncError> {
        let row = sqlx::query(
            "SELECT 1 FROM ingestion_log WHERE tx_hash = ? AND kind = ? AND status = 'success' LIMIT 1",
        )
        .bind(tx_hash)
        .bind(kind)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;
        Ok(row.is_some())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<IngestionLogEntry>, SyncError> {
        let rows = sqlx::query("SELECT * FROM ingestion_log ORDER BY id DESC LIMIT ?")
            .bind(limit.min(i64::MAX as usize) as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage)?;
        collect(rows, log_entry_from_row)
    }

    async fn entry_count(&self) -> Result<u64, SyncError> {
        self.count("ingestion_log").await
    }
}
