//! Durable event store.
//!
//! Append-only SQLite table shared with the governor charm, which reads the
//! events back after being woken by the broker's action. The file may be
//! locked by the governor while it reads; that surfaces as
//! `Error::StoreLocked` and the caller retries later.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OpenFlags, params};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::DomainEvent;

/// Something that can be opened for appending events.
pub trait EventStore {
    type Writer: EventWriter;

    /// Open the store. Fails with `StoreLocked` if another writer holds it.
    fn open(&self) -> Result<Self::Writer>;
}

/// An open store session.
pub trait EventWriter {
    /// Durably append one event. Returns only after the write is committed.
    fn write(&mut self, event: &DomainEvent) -> Result<()>;

    fn close(self) -> Result<()>
    where
        Self: Sized;
}

/// An event as read back from the store.
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_name: String,
    pub event_data: Value,
}

impl StoredEvent {
    /// Decode into a `DomainEvent`. Fails for rows written by other producers.
    pub fn event(&self) -> Result<DomainEvent> {
        let value = serde_json::json!({
            "event_name": self.event_name,
            "event_data": self.event_data,
        });
        Ok(serde_json::from_value(value)?)
    }
}

/// SQLite-backed event store at a fixed path.
#[derive(Debug, Clone)]
pub struct SqliteEventStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteEventStore {
    /// Store at `path`. Lock contention is reported immediately.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: Duration::ZERO,
        }
    }

    /// Wait up to `timeout` for a competing lock before reporting `StoreLocked`.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored event in insertion order.
    ///
    /// Opens the file read-only; a missing store is an error, not a new file.
    pub fn read_all(&self) -> Result<Vec<StoredEvent>> {
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(self.busy_timeout)?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, event_name, event_data FROM events ORDER BY id ASC",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredEvent {
                    id: row.get(0)?,
                    timestamp: row
                        .get::<_, String>(1)?
                        .parse()
                        .map_err(|e: chrono::ParseError| conversion_failure(1, e))?,
                    event_name: row.get(2)?,
                    event_data: serde_json::from_str(&row.get::<_, String>(3)?)
                        .map_err(|e| conversion_failure(3, e))?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS events (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                event_name  TEXT NOT NULL,
                event_data  TEXT NOT NULL
            );
            ",
        )?;
        Ok(conn)
    }
}

impl EventStore for SqliteEventStore {
    type Writer = SqliteEventWriter;

    fn open(&self) -> Result<SqliteEventWriter> {
        Ok(SqliteEventWriter {
            conn: self.connect()?,
        })
    }
}

/// Open connection to a `SqliteEventStore`.
pub struct SqliteEventWriter {
    conn: Connection,
}

impl EventWriter for SqliteEventWriter {
    fn write(&mut self, event: &DomainEvent) -> Result<()> {
        self.conn.execute(
            "INSERT INTO events (timestamp, event_name, event_data) VALUES (?1, ?2, ?3)",
            params![
                Utc::now().to_rfc3339(),
                event.name(),
                serde_json::to_string(&event.payload()?)?,
            ],
        )?;
        Ok(())
    }

    fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::from(e))
    }
}

fn conversion_failure(
    column: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}
