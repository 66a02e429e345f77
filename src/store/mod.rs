//! Durable SQLite-backed persistence for alerts, blocks, devices, trusted
//! IPs, and the ambient log table. Writes are transactional and serialized
//! through a single writer connection; readers use a separate read-only
//! connection so they are never blocked behind a writer, and never observe
//! uncommitted rows because every mutation runs inside an explicit
//! transaction before it becomes visible to readers.

mod alerts;
mod backup;
mod blocks;
mod devices;
mod logs;
mod trusted;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OpenFlags};

use crate::error::Result;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alerts (
    id TEXT PRIMARY KEY,
    ts TEXT NOT NULL,
    src_ip TEXT NOT NULL,
    label TEXT NOT NULL,
    severity TEXT NOT NULL,
    kind TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alerts_ts ON alerts(ts, id);

CREATE TABLE IF NOT EXISTS blocks (
    id TEXT PRIMARY KEY,
    ts TEXT NOT NULL,
    ip TEXT NOT NULL,
    action TEXT NOT NULL,
    reason TEXT NOT NULL,
    expires_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_blocks_ip ON blocks(ip, ts);

CREATE TABLE IF NOT EXISTS devices (
    ip TEXT PRIMARY KEY,
    name TEXT,
    open_ports TEXT NOT NULL DEFAULT '',
    risk TEXT NOT NULL DEFAULT 'unknown'
);

CREATE TABLE IF NOT EXISTS trusted (
    ip TEXT PRIMARY KEY,
    note TEXT NOT NULL DEFAULT ''
);

CREATE TABLE IF NOT EXISTS logs (
    id TEXT PRIMARY KEY,
    ts TEXT NOT NULL,
    level TEXT NOT NULL,
    source TEXT NOT NULL,
    message TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_logs_ts ON logs(ts);
";

/// Two connections to the same database: `writer` is the only one that ever
/// begins a transaction, `reader` is opened read-only so concurrent readers
/// are never serialized behind a writer (or each other, beyond the Rust-level
/// lock needed because `Connection` itself is `!Sync`). WAL mode on the
/// writer is what makes that split actually concurrent rather than just
/// structurally separate.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let writer = Connection::open(path)?;
        writer.pragma_update(None, "journal_mode", "WAL").ok();
        writer.execute_batch(SCHEMA)?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self { writer: Mutex::new(writer), reader: Mutex::new(reader) })
    }

    /// A private `:memory:` database is per-connection, so an ordinary
    /// `Connection::open_in_memory` would give the reader its own empty
    /// database. A shared-cache URI keeps both connections pointed at the
    /// same backing store instead.
    pub fn open_in_memory() -> Result<Self> {
        let uri = format!("file:vigilnet-mem-{}?mode=memory&cache=shared", new_id());

        let writer = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_URI,
        )?;
        writer.execute_batch(SCHEMA)?;

        let reader = Connection::open_with_flags(
            &uri,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
        )?;
        Ok(Self { writer: Mutex::new(writer), reader: Mutex::new(reader) })
    }

    /// Runs `f` inside a transaction, committing on success and rolling back
    /// (implicitly, via `Transaction::drop`) on error.
    fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction) -> Result<T>,
    {
        let mut conn = self.writer.lock().unwrap();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// `PRAGMA integrity_check` for the store's lifetime guarantee that it
    /// always reports `"ok"`.
    pub fn integrity_check(&self) -> Result<String> {
        let conn = self.reader.lock().unwrap();
        let result: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result)
    }

    /// Drops and recreates every table. Used by admin-style resets; not
    /// exposed to any external surface by this crate.
    pub fn wipe_all(&self) -> Result<()> {
        self.with_transaction(|tx| {
            tx.execute_batch(
                "DELETE FROM alerts; DELETE FROM blocks; DELETE FROM devices; DELETE FROM trusted; DELETE FROM logs;",
            )?;
            Ok(())
        })
    }

    /// Removes rows older than `retain_seconds` from `table`'s `ts` column.
    /// Used for periodic housekeeping of the `logs` table, mirroring the
    /// history-table pruning this store's design is descended from.
    pub fn prune_older_than(&self, table: &str, cutoff_ts: &str) -> Result<usize> {
        let allowed = ["alerts", "blocks", "logs"];
        if !allowed.contains(&table) {
            return Err(crate::error::IdsError::Storage(format!("cannot prune unknown table {table}")));
        }
        self.with_transaction(|tx| {
            let sql = format!("DELETE FROM {table} WHERE ts < ?1");
            let n = tx.execute(&sql, rusqlite::params![cutoff_ts])?;
            Ok(n)
        })
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
