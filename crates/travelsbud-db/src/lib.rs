pub mod document;
pub mod error;
pub mod live;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod query;
pub mod transaction;

pub use document::{
    Document, Fields, array_remove, array_union, fields, format_timestamp, server_timestamp,
};
pub use error::StoreError;
pub use live::watch;
pub use query::{Direction, Filter, Query};
pub use transaction::Transaction;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::broadcast;
use tracing::info;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Capacity of the change feed. Watchers that fall further behind re-query.
const CHANGE_FEED_CAPACITY: usize = 1024;

/// A committed write touched `collection`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub collection: String,
}

/// SQLite-backed document store with a change feed for live queries.
pub struct Database {
    conn: Mutex<Connection>,
    /// Last issued server timestamp, in microseconds since the epoch.
    last_timestamp_micros: AtomicI64,
    changes: broadcast::Sender<Change>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let db = Self::from_connection(conn)?;
        info!("Database opened at {}", path.display());
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Ok(Self {
            conn: Mutex::new(conn),
            last_timestamp_micros: AtomicI64::new(0),
            changes,
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        f(&conn)
    }

    /// Subscribe to the feed of committed writes.
    pub fn changes(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Run `f` atomically. Nothing `f` wrote is visible if it returns an error.
    /// Transactions are serialized against each other and against every
    /// single-document write.
    pub fn run_transaction<F, T, E>(&self, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
        E: From<StoreError>,
    {
        let (value, touched) = {
            let mut conn = self
                .conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            let now = self.next_server_timestamp();
            let mut tx = Transaction::begin(&mut conn, now)?;
            let value = f(&mut tx)?;
            let touched = tx.commit()?;
            (value, touched)
        };

        for collection in touched {
            // No receivers is fine: nobody is watching.
            let _ = self.changes.send(Change { collection });
        }
        Ok(value)
    }

    /// Strictly increasing across the store, so commit order and timestamp
    /// order agree.
    fn next_server_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now().timestamp_micros();
        let previous = self
            .last_timestamp_micros
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        let issued = now.max(previous + 1);
        DateTime::from_timestamp_micros(issued).unwrap_or_else(Utc::now)
    }
}
