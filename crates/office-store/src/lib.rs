//! SQLite persistence for occupancy entries, closure history and panel
//! bindings, so state survives bot restarts.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, TransactionBehavior, params};

use office_core::store::sort_entries;
use office_core::{
    HistoryEntry, OccupancyEntry, OccupancyStore, PanelBinding, StoreError, StoreResult,
};

/// Default number of pooled connections.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Default bound on waiting for a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(20);

const MEMORY_URL: &str = ":memory:";

/// SQLite-backed store with a small round-robin connection pool.
pub struct SqliteStore {
    conns: Vec<Mutex<Connection>>,
    next: AtomicUsize,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Open from a `DATABASE_URL`-style string: a path, `sqlite://path`, or `:memory:`.
    pub fn connect(url: &str, pool_size: usize, busy_timeout: Duration) -> StoreResult<Self> {
        let path = url.strip_prefix("sqlite://").unwrap_or(url);
        if path == MEMORY_URL {
            return Self::open_in_memory();
        }
        Self::open(Path::new(path), pool_size, busy_timeout)
    }

    /// Open (or create) a database file with `pool_size` connections and run migrations.
    pub fn open(path: &Path, pool_size: usize, busy_timeout: Duration) -> StoreResult<Self> {
        let pool_size = pool_size.max(1);
        let mut conns = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = Connection::open(path).map_err(|e| map_err(e, busy_timeout))?;
            conn.busy_timeout(busy_timeout)
                .map_err(|e| map_err(e, busy_timeout))?;
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))
                .map_err(|e| map_err(e, busy_timeout))?;
            conns.push(Mutex::new(conn));
        }
        let store = Self {
            conns,
            next: AtomicUsize::new(0),
            busy_timeout,
        };
        store.migrate()?;
        tracing::info!(path = %path.display(), pool_size, "store opened");
        Ok(store)
    }

    /// Single-connection in-memory database. Useful for testing.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| map_err(e, DEFAULT_BUSY_TIMEOUT))?;
        let store = Self {
            conns: vec![Mutex::new(conn)],
            next: AtomicUsize::new(0),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        };
        store.migrate()?;
        Ok(store)
    }

    pub fn pool_size(&self) -> usize {
        self.conns.len()
    }

    /// Create the schema if it does not already exist.
    fn migrate(&self) -> StoreResult<()> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS active_entries (
                    user_id        TEXT PRIMARY KEY,
                    display_name   TEXT NOT NULL,
                    start          INTEGER NOT NULL,
                    planned_start  INTEGER,
                    expected_end   INTEGER,
                    note           TEXT
                );
                CREATE TABLE IF NOT EXISTS panels (
                    channel_id     TEXT PRIMARY KEY,
                    message_id     TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS history (
                    id             INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id        TEXT NOT NULL,
                    display_name   TEXT NOT NULL,
                    start          INTEGER NOT NULL,
                    ended_at       INTEGER NOT NULL,
                    note           TEXT
                );",
            )
            .map_err(|e| self.err(e))?;
        tracing::debug!("store schema ready");
        Ok(())
    }

    /// Next pooled connection, round-robin.
    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.conns.len();
        self.conns[idx]
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))
    }

    fn err(&self, e: rusqlite::Error) -> StoreError {
        map_err(e, self.busy_timeout)
    }

    /// Move the user's entry to history if `ended_at` yields an end for the
    /// row as currently stored. The read and the move share one IMMEDIATE
    /// transaction.
    fn close_entry(
        &self,
        user_id: &str,
        ended_at: impl FnOnce(&OccupancyEntry) -> Option<DateTime<Utc>>,
    ) -> StoreResult<Option<HistoryEntry>> {
        let mut conn = self.conn()?;
        // IMMEDIATE takes the write lock up front so two concurrent closes serialize;
        // the loser sees no row and reports nothing to close.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| self.err(e))?;

        let entry = tx
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM active_entries WHERE user_id = ?1"),
                params![user_id],
                entry_from_row,
            )
            .optional()
            .map_err(|e| self.err(e))?;
        let Some((entry, end)) = entry.and_then(|entry| ended_at(&entry).map(|end| (entry, end)))
        else {
            return Ok(None);
        };

        let closed = entry.close(end);
        tx.execute(
            "INSERT INTO history (user_id, display_name, start, ended_at, note)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                closed.user_id,
                closed.display_name,
                closed.start.timestamp(),
                closed.ended_at.timestamp(),
                closed.note,
            ],
        )
        .map_err(|e| self.err(e))?;
        tx.execute(
            "DELETE FROM active_entries WHERE user_id = ?1",
            params![user_id],
        )
        .map_err(|e| self.err(e))?;
        tx.commit().map_err(|e| self.err(e))?;
        Ok(Some(closed))
    }
}

fn map_err(e: rusqlite::Error, busy_timeout: Duration) -> StoreError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            StoreError::Timeout(busy_timeout)
        }
        _ => match e {
            rusqlite::Error::IntegralValueOutOfRange(_, value) => StoreError::Corrupt {
                key: "timestamp".to_string(),
                detail: format!("{value} is not a valid epoch second"),
            },
            other => StoreError::Unavailable(other.to_string()),
        },
    }
}

fn to_ts(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn to_opt_ts(idx: usize, secs: Option<i64>) -> rusqlite::Result<Option<DateTime<Utc>>> {
    secs.map(|s| to_ts(idx, s)).transpose()
}

const ENTRY_COLUMNS: &str = "user_id, display_name, start, planned_start, expected_end, note";

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<OccupancyEntry> {
    Ok(OccupancyEntry {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        start: to_ts(2, row.get(2)?)?,
        planned_start: to_opt_ts(3, row.get(3)?)?,
        expected_end: to_opt_ts(4, row.get(4)?)?,
        note: row.get(5)?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<HistoryEntry> {
    Ok(HistoryEntry {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        start: to_ts(2, row.get(2)?)?,
        ended_at: to_ts(3, row.get(3)?)?,
        note: row.get(4)?,
    })
}

impl OccupancyStore for SqliteStore {
    fn entry(&self, user_id: &str) -> StoreResult<Option<OccupancyEntry>> {
        self.conn()?
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM active_entries WHERE user_id = ?1"),
                params![user_id],
                entry_from_row,
            )
            .optional()
            .map_err(|e| self.err(e))
    }

    fn entries(&self) -> StoreResult<Vec<OccupancyEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM active_entries ORDER BY start, user_id"
            ))
            .map_err(|e| self.err(e))?;
        let rows = stmt
            .query_map([], entry_from_row)
            .map_err(|e| self.err(e))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| self.err(e))?);
        }
        // SQLite's text collation can differ from Rust's ordering on ties.
        sort_entries(&mut result);
        Ok(result)
    }

    fn insert_entry(&self, entry: &OccupancyEntry) -> StoreResult<bool> {
        let changed = self
            .conn()?
            .execute(
                &format!(
                    "INSERT INTO active_entries ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(user_id) DO NOTHING"
                ),
                params![
                    entry.user_id,
                    entry.display_name,
                    entry.start.timestamp(),
                    entry.planned_start.map(|t| t.timestamp()),
                    entry.expected_end.map(|t| t.timestamp()),
                    entry.note,
                ],
            )
            .map_err(|e| self.err(e))?;
        Ok(changed == 1)
    }

    fn upsert_entry(&self, entry: &OccupancyEntry) -> StoreResult<()> {
        self.conn()?
            .execute(
                &format!(
                    "INSERT INTO active_entries ({ENTRY_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(user_id) DO UPDATE SET
                        display_name  = excluded.display_name,
                        start         = excluded.start,
                        planned_start = excluded.planned_start,
                        expected_end  = excluded.expected_end,
                        note          = excluded.note"
                ),
                params![
                    entry.user_id,
                    entry.display_name,
                    entry.start.timestamp(),
                    entry.planned_start.map(|t| t.timestamp()),
                    entry.expected_end.map(|t| t.timestamp()),
                    entry.note,
                ],
            )
            .map_err(|e| self.err(e))?;
        Ok(())
    }

    fn activate_entry(&self, user_id: &str, now: DateTime<Utc>) -> StoreResult<bool> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE active_entries SET planned_start = NULL
                 WHERE user_id = ?1 AND planned_start IS NOT NULL AND planned_start <= ?2",
                params![user_id, now.timestamp()],
            )
            .map_err(|e| self.err(e))?;
        Ok(changed == 1)
    }

    fn archive_entry(
        &self,
        user_id: &str,
        ended_at: DateTime<Utc>,
    ) -> StoreResult<Option<HistoryEntry>> {
        self.close_entry(user_id, |_| Some(ended_at))
    }

    fn expire_entry(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<HistoryEntry>> {
        self.close_entry(user_id, |entry| entry.expected_end.filter(|end| *end <= now))
    }

    fn recent_history(&self, limit: usize) -> StoreResult<Vec<HistoryEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT user_id, display_name, start, ended_at, note
                 FROM history ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| self.err(e))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![limit], history_from_row)
            .map_err(|e| self.err(e))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| self.err(e))?);
        }
        Ok(result)
    }

    fn history_len(&self) -> StoreResult<usize> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
            .map_err(|e| self.err(e))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn bind_panel(&self, binding: &PanelBinding) -> StoreResult<()> {
        self.conn()?
            .execute(
                "INSERT INTO panels (channel_id, message_id) VALUES (?1, ?2)
                 ON CONFLICT(channel_id) DO UPDATE SET message_id = excluded.message_id",
                params![binding.channel_id, binding.message_id],
            )
            .map_err(|e| self.err(e))?;
        Ok(())
    }

    fn unbind_panel(&self, channel_id: &str) -> StoreResult<bool> {
        let changed = self
            .conn()?
            .execute(
                "DELETE FROM panels WHERE channel_id = ?1",
                params![channel_id],
            )
            .map_err(|e| self.err(e))?;
        Ok(changed == 1)
    }

    fn panel(&self, channel_id: &str) -> StoreResult<Option<PanelBinding>> {
        self.conn()?
            .query_row(
                "SELECT channel_id, message_id FROM panels WHERE channel_id = ?1",
                params![channel_id],
                |row| {
                    Ok(PanelBinding {
                        channel_id: row.get(0)?,
                        message_id: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(|e| self.err(e))
    }

    fn panels(&self) -> StoreResult<Vec<PanelBinding>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT channel_id, message_id FROM panels ORDER BY channel_id")
            .map_err(|e| self.err(e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(PanelBinding {
                    channel_id: row.get(0)?,
                    message_id: row.get(1)?,
                })
            })
            .map_err(|e| self.err(e))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| self.err(e))?);
        }
        Ok(result)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use office_core::{ConflictPolicy, Engine, ReferenceZone, RegisterRequest};

    fn ts(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).expect("valid timestamp")
    }

    fn make_entry(user_id: &str, start: i64) -> OccupancyEntry {
        OccupancyEntry {
            user_id: user_id.to_string(),
            display_name: format!("user-{user_id}"),
            start: ts(start),
            planned_start: None,
            expected_end: None,
            note: None,
        }
    }

    #[test]
    fn open_in_memory_creates_tables() {
        let store = SqliteStore::open_in_memory().expect("should open in-memory db");
        let conn = store.conn().unwrap();
        for table in ["active_entries", "panels", "history"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })
                .expect("table should exist");
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn entry_roundtrip_preserves_optional_fields() {
        let store = SqliteStore::open_in_memory().unwrap();
        let original = OccupancyEntry {
            user_id: "1001".to_string(),
            display_name: "hana".to_string(),
            start: ts(1_772_326_800),
            planned_start: Some(ts(1_772_326_800)),
            expected_end: Some(ts(1_772_355_600)),
            note: Some("desk 3".to_string()),
        };
        assert!(store.insert_entry(&original).unwrap());
        assert_eq!(store.entry("1001").unwrap(), Some(original));

        let bare = make_entry("1002", 5);
        store.insert_entry(&bare).unwrap();
        assert_eq!(store.entry("1002").unwrap(), Some(bare));
    }

    #[test]
    fn insert_does_not_overwrite() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.insert_entry(&make_entry("a", 10)).unwrap());
        assert!(!store.insert_entry(&make_entry("a", 20)).unwrap());
        assert_eq!(store.entry("a").unwrap().unwrap().start, ts(10));
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = make_entry("a", 10);
        e.note = Some("first".to_string());
        store.upsert_entry(&e).unwrap();

        let replacement = make_entry("a", 20);
        store.upsert_entry(&replacement).unwrap();

        let loaded = store.entries().unwrap();
        assert_eq!(loaded.len(), 1, "upsert should not create duplicate rows");
        assert_eq!(loaded[0], replacement);
    }

    #[test]
    fn entries_ordered_by_start() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_entry(&make_entry("late", 300)).unwrap();
        store.insert_entry(&make_entry("early", 100)).unwrap();
        store.insert_entry(&make_entry("middle", 200)).unwrap();
        let ids: Vec<_> = store
            .entries()
            .unwrap()
            .into_iter()
            .map(|e| e.user_id)
            .collect();
        assert_eq!(ids, vec!["early", "middle", "late"]);
    }

    #[test]
    fn activate_clears_planned_start_once() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = make_entry("a", 100);
        e.planned_start = Some(ts(100));
        store.insert_entry(&e).unwrap();

        // Not yet due.
        assert!(!store.activate_entry("a", ts(99)).unwrap());
        assert_eq!(store.entry("a").unwrap().unwrap().planned_start, Some(ts(100)));

        assert!(store.activate_entry("a", ts(100)).unwrap());
        assert!(store.entry("a").unwrap().unwrap().planned_start.is_none());
        assert!(!store.activate_entry("a", ts(200)).unwrap());
    }

    #[test]
    fn expire_uses_stored_end_and_skips_future_end() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = make_entry("a", 100);
        e.expected_end = Some(ts(500));
        store.insert_entry(&e).unwrap();

        assert!(store.expire_entry("a", ts(499)).unwrap().is_none());
        assert!(store.entry("a").unwrap().is_some());

        // A fresh registration replaced the row with a later end.
        e.start = ts(600);
        e.expected_end = Some(ts(900));
        store.upsert_entry(&e).unwrap();
        assert!(store.expire_entry("a", ts(700)).unwrap().is_none());
        assert_eq!(store.history_len().unwrap(), 0);

        let closed = store.expire_entry("a", ts(1000)).unwrap().unwrap();
        assert_eq!(closed.start, ts(600));
        assert_eq!(closed.ended_at, ts(900));
        assert!(store.entry("a").unwrap().is_none());
    }

    #[test]
    fn archive_is_atomic_and_idempotent() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut e = make_entry("a", 100);
        e.note = Some("focus".to_string());
        store.insert_entry(&e).unwrap();

        let closed = store.archive_entry("a", ts(900)).unwrap().unwrap();
        assert_eq!(closed.start, ts(100));
        assert_eq!(closed.ended_at, ts(900));
        assert_eq!(closed.note.as_deref(), Some("focus"));
        assert!(store.entry("a").unwrap().is_none());

        // A second close finds nothing and writes nothing.
        assert!(store.archive_entry("a", ts(950)).unwrap().is_none());
        assert_eq!(store.history_len().unwrap(), 1);
        assert_eq!(store.recent_history(10).unwrap(), vec![closed]);
    }

    #[test]
    fn recent_history_newest_first_with_limit() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (i, user) in ["a", "b", "c"].iter().enumerate() {
            store.insert_entry(&make_entry(user, 10)).unwrap();
            store
                .archive_entry(user, ts(100 + i64::try_from(i).unwrap()))
                .unwrap();
        }
        let recent: Vec<_> = store
            .recent_history(2)
            .unwrap()
            .into_iter()
            .map(|h| h.user_id)
            .collect();
        assert_eq!(recent, vec!["c", "b"]);
    }

    #[test]
    fn panel_binding_lifecycle() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert!(store.panel("chan").unwrap().is_none());

        store
            .bind_panel(&PanelBinding {
                channel_id: "chan".to_string(),
                message_id: "m1".to_string(),
            })
            .unwrap();
        store
            .bind_panel(&PanelBinding {
                channel_id: "chan".to_string(),
                message_id: "m2".to_string(),
            })
            .unwrap();
        assert_eq!(store.panels().unwrap().len(), 1);
        assert_eq!(store.panel("chan").unwrap().unwrap().message_id, "m2");

        assert!(store.unbind_panel("chan").unwrap());
        assert!(!store.unbind_panel("chan").unwrap());
        assert!(store.panels().unwrap().is_empty());
    }

    #[test]
    fn file_backed_pool_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("office.db");

        {
            let store = SqliteStore::open(&path, 3, Duration::from_secs(1)).unwrap();
            assert_eq!(store.pool_size(), 3);
            store.insert_entry(&make_entry("a", 10)).unwrap();
            // Reads rotate across connections and all see the same data.
            for _ in 0..3 {
                assert_eq!(store.entries().unwrap().len(), 1);
            }
        }

        let url = format!("sqlite://{}", path.display());
        let reopened = SqliteStore::connect(&url, 1, Duration::from_secs(1)).unwrap();
        assert_eq!(reopened.entry("a").unwrap().unwrap().start, ts(10));
    }

    #[test]
    fn memory_url_opens_in_memory() {
        let store = SqliteStore::connect(":memory:", 8, Duration::from_secs(1)).unwrap();
        assert_eq!(store.pool_size(), 1);
    }

    #[test]
    fn engine_tick_over_sqlite() {
        let store = SqliteStore::open_in_memory().unwrap();
        let engine = Engine::new(ReferenceZone::default(), ConflictPolicy::Reject);
        let now = DateTime::parse_from_rfc3339("2026-03-01T09:00:00+09:00")
            .unwrap()
            .with_timezone(&Utc);
        let req = RegisterRequest {
            user_id: "a".to_string(),
            display_name: "hana".to_string(),
            expected_end: Some("09:30".to_string()),
            ..Default::default()
        };
        engine.register(&store, &req, now).unwrap();

        let later = now + chrono::TimeDelta::minutes(45);
        let report = engine.reconcile(&store, later).unwrap();
        assert_eq!(report.ended.len(), 1);
        assert_eq!(
            report.ended[0].ended_at,
            DateTime::parse_from_rfc3339("2026-03-01T09:30:00+09:00")
                .unwrap()
                .with_timezone(&Utc)
        );
        assert!(store.entries().unwrap().is_empty());
        assert_eq!(store.history_len().unwrap(), 1);
    }
}
