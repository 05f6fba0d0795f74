//! SQLite-backed durable store.
//!
//! Provides persistent storage for:
//! - Aggregated sensor records (until folded by the daily rollover)
//! - Daily summaries and earned badges
//! - Fixed daily-maximum forecast values per city
//! - Key-value store for small pieces of state (the live prevention tally)
//!
//! Instants are stored as RFC 3339 UTC strings with millisecond precision so
//! lexical order matches chronological order. Summary dates are `YYYY-MM-DD`.

use std::ops::Range;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use crate::daily::{Badge, BadgeKind, DailySummary};
use crate::error::{CoreError, DatabaseError};
use crate::forecast::FixedValue;
use crate::gauge::GaugeLevels;
use crate::sensor::AggregatedRecord;

use super::data_dir;

const PREVENT_TALLY_KEY: &str = "prevent_tally";

/// Store handle shared between the ingestion pipeline, the rollover timer and
/// the forecast refresher. Holding the lock is the critical section that keeps
/// ingestion writes and rollover folds from interleaving.
pub type SharedDb = Arc<Mutex<Database>>;

/// Live prevention count for one local day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreventTally {
    pub day: NaiveDate,
    pub count: u32,
}

/// Ids bound per `DELETE ... IN (..)` statement.
const DELETE_BATCH: usize = 500;

/// SQLite database for the UVHero data model.
pub struct Database {
    conn: Connection,
}

impl Database {
    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `~/.config/uvhero/uvhero.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("uvhero.db");
        Self::open_at(&path)
    }

    /// Open (or create) a database file at an explicit path.
    pub fn open_at(path: &std::path::Path) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(|source| DatabaseError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, CoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    /// Wrap into the shared handle used by long-running components.
    pub fn into_shared(self) -> SharedDb {
        Arc::new(Mutex::new(self))
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                max_outer   REAL NOT NULL,
                max_inner   REAL NOT NULL
            );

            CREATE TABLE IF NOT EXISTS summaries (
                date            TEXT PRIMARY KEY,
                fatigue         INTEGER NOT NULL,
                sunburn         INTEGER NOT NULL,
                energy          INTEGER NOT NULL,
                sleepiness      INTEGER NOT NULL,
                prevent_count   INTEGER NOT NULL DEFAULT 0,
                prevent_success INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS badges (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL UNIQUE,
                date_earned TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fixed_values (
                city     TEXT PRIMARY KEY,
                value    REAL NOT NULL,
                fixed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_timestamp ON records(timestamp);",
        )?;
        Ok(())
    }

    /// Run `f` as one transactional unit.
    ///
    /// Every store call made through `self` inside `f` joins the transaction.
    /// If `f` returns an error the transaction is rolled back when it is
    /// dropped, so no partial write survives.
    pub fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Self) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let tx = self.conn.unchecked_transaction()?;
        let out = f(self)?;
        tx.commit()?;
        Ok(out)
    }

    // ── Records ──────────────────────────────────────────────────────

    /// Append a committed bucket.
    pub fn append_record(
        &self,
        timestamp: DateTime<Utc>,
        max_outer: f64,
        max_inner: f64,
    ) -> Result<AggregatedRecord, DatabaseError> {
        self.conn.execute(
            "INSERT INTO records (timestamp, max_outer, max_inner) VALUES (?1, ?2, ?3)",
            params![encode_instant(timestamp), max_outer, max_inner],
        )?;
        Ok(AggregatedRecord {
            id: self.conn.last_insert_rowid(),
            timestamp,
            max_outer,
            max_inner,
        })
    }

    /// Records with `range.start <= timestamp < range.end`, oldest first.
    pub fn query_records(
        &self,
        range: Range<DateTime<Utc>>,
    ) -> Result<Vec<AggregatedRecord>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, timestamp, max_outer, max_inner
             FROM records
             WHERE timestamp >= ?1 AND timestamp < ?2
             ORDER BY timestamp ASC, id ASC",
        )?;
        let rows = stmt.query_map(
            params![encode_instant(range.start), encode_instant(range.end)],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            },
        )?;

        let mut records = Vec::new();
        for row in rows {
            let (id, timestamp, max_outer, max_inner) = row?;
            records.push(AggregatedRecord {
                id,
                timestamp: decode_instant("records", &timestamp)?,
                max_outer,
                max_inner,
            });
        }
        Ok(records)
    }

    pub fn count_records(&self) -> Result<u64, DatabaseError> {
        let count = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get::<_, u64>(0))?;
        Ok(count)
    }

    /// Delete the given records by id. Returns the number removed.
    ///
    /// Ids are bound in batches of `DELETE_BATCH` so a day of any size
    /// stays under SQLite's bound-parameter limit. Call inside
    /// [`Database::with_transaction`] to make the whole delete atomic.
    pub fn delete_records(&self, records: &[AggregatedRecord]) -> Result<usize, DatabaseError> {
        let mut removed = 0;
        for batch in records.chunks(DELETE_BATCH) {
            let placeholders = vec!["?"; batch.len()].join(",");
            let sql = format!("DELETE FROM records WHERE id IN ({placeholders})");
            let mut stmt = self.conn.prepare_cached(&sql)?;
            removed += stmt.execute(params_from_iter(batch.iter().map(|r| r.id)))?;
        }
        Ok(removed)
    }

    // ── Summaries ────────────────────────────────────────────────────

    /// Insert a summary. Fails if one already exists for the same date.
    pub fn create_summary(&self, summary: &DailySummary) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO summaries
                (date, fatigue, sunburn, energy, sleepiness, prevent_count, prevent_success)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                summary.date.to_string(),
                summary.levels.fatigue,
                summary.levels.sunburn,
                summary.levels.energy,
                summary.levels.sleepiness,
                summary.prevent_count,
                summary.prevent_success,
            ],
        )?;
        Ok(())
    }

    /// All summaries, newest date first.
    pub fn query_summaries_desc(&self) -> Result<Vec<DailySummary>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, fatigue, sunburn, energy, sleepiness, prevent_count, prevent_success
             FROM summaries
             ORDER BY date DESC",
        )?;
        let rows = stmt.query_map([], summary_row)?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?.into_summary()?);
        }
        Ok(summaries)
    }

    pub fn summary_for(&self, date: NaiveDate) -> Result<Option<DailySummary>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT date, fatigue, sunburn, energy, sleepiness, prevent_count, prevent_success
             FROM summaries
             WHERE date = ?1",
        )?;
        let result = stmt.query_row(params![date.to_string()], summary_row);
        match result {
            Ok(row) => Ok(Some(row.into_summary()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn delete_summaries(&self, summaries: &[DailySummary]) -> Result<usize, DatabaseError> {
        let mut removed = 0;
        for summary in summaries {
            removed += self.conn.execute(
                "DELETE FROM summaries WHERE date = ?1",
                params![summary.date.to_string()],
            )?;
        }
        Ok(removed)
    }

    /// Keep the `keep` most recent summaries by date and delete the rest.
    /// Returns the deleted summaries.
    pub fn enforce_summary_retention(
        &self,
        keep: usize,
    ) -> Result<Vec<DailySummary>, DatabaseError> {
        let summaries = self.query_summaries_desc()?;
        if summaries.len() <= keep {
            return Ok(Vec::new());
        }
        let stale: Vec<DailySummary> = summaries.into_iter().skip(keep).collect();
        self.delete_summaries(&stale)?;
        Ok(stale)
    }

    /// Overwrite the prevention fields of an existing summary.
    /// Returns false when there is no summary for `date`.
    pub fn update_summary_prevention(
        &self,
        date: NaiveDate,
        prevent_count: u32,
        prevent_success: bool,
    ) -> Result<bool, DatabaseError> {
        let changed = self.conn.execute(
            "UPDATE summaries SET prevent_count = ?2, prevent_success = ?3 WHERE date = ?1",
            params![date.to_string(), prevent_count, prevent_success],
        )?;
        Ok(changed > 0)
    }

    // ── Badges ───────────────────────────────────────────────────────

    /// Badges, optionally filtered by name.
    pub fn query_badges(&self, name: Option<BadgeKind>) -> Result<Vec<Badge>, DatabaseError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, date_earned FROM badges
             WHERE ?1 IS NULL OR name = ?1
             ORDER BY date_earned ASC",
        )?;
        let rows = stmt.query_map(params![name.map(|n| n.as_str())], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut badges = Vec::new();
        for row in rows {
            let (id, name, date_earned) = row?;
            let name = name.parse::<BadgeKind>().map_err(|message| DatabaseError::CorruptRow {
                table: "badges".into(),
                message,
            })?;
            badges.push(Badge {
                id,
                name,
                date_earned: decode_instant("badges", &date_earned)?,
            });
        }
        Ok(badges)
    }

    pub fn insert_badge(&self, badge: &Badge) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT INTO badges (id, name, date_earned) VALUES (?1, ?2, ?3)",
            params![
                badge.id,
                badge.name.as_str(),
                encode_instant(badge.date_earned)
            ],
        )?;
        Ok(())
    }

    pub fn delete_badges(&self, badges: &[Badge]) -> Result<usize, DatabaseError> {
        let mut removed = 0;
        for badge in badges {
            removed += self
                .conn
                .execute("DELETE FROM badges WHERE id = ?1", params![badge.id])?;
        }
        Ok(removed)
    }

    // ── Fixed forecast values ────────────────────────────────────────

    pub fn load_fixed_values(&self) -> Result<Vec<FixedValue>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare("SELECT city, value, fixed_at FROM fixed_values ORDER BY city")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut values = Vec::new();
        for row in rows {
            let (city, value, fixed_at) = row?;
            values.push(FixedValue {
                city,
                value,
                fixed_at: decode_instant("fixed_values", &fixed_at)?,
            });
        }
        Ok(values)
    }

    pub fn upsert_fixed_value(&self, fixed: &FixedValue) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO fixed_values (city, value, fixed_at) VALUES (?1, ?2, ?3)",
            params![fixed.city, fixed.value, encode_instant(fixed.fixed_at)],
        )?;
        Ok(())
    }

    pub fn delete_fixed_value(&self, city: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("DELETE FROM fixed_values WHERE city = ?1", params![city])?;
        Ok(())
    }

    // ── Prevention tally ─────────────────────────────────────────────

    /// Today's live prevention count. A tally kept for another day reads as 0.
    pub fn prevent_tally(&self, day: NaiveDate) -> Result<u32, CoreError> {
        let Some(raw) = self.kv_get(PREVENT_TALLY_KEY)? else {
            return Ok(0);
        };
        let tally: PreventTally = serde_json::from_str(&raw)?;
        Ok(if tally.day == day { tally.count } else { 0 })
    }

    /// Add one to the tally for `day`, starting fresh if the stored tally
    /// belongs to another day. Returns the new count.
    pub fn increment_prevent_tally(&self, day: NaiveDate) -> Result<u32, CoreError> {
        let count = self.prevent_tally(day)? + 1;
        let raw = serde_json::to_string(&PreventTally { day, count })?;
        self.kv_set(PREVENT_TALLY_KEY, &raw)?;
        Ok(count)
    }

    // ── KV ───────────────────────────────────────────────────────────

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, DatabaseError> {
        let mut stmt = self.conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
        let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
        match result {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), DatabaseError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

struct SummaryRow {
    date: String,
    fatigue: u8,
    sunburn: u8,
    energy: u8,
    sleepiness: u8,
    prevent_count: u32,
    prevent_success: bool,
}

fn summary_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        date: row.get(0)?,
        fatigue: row.get(1)?,
        sunburn: row.get(2)?,
        energy: row.get(3)?,
        sleepiness: row.get(4)?,
        prevent_count: row.get(5)?,
        prevent_success: row.get(6)?,
    })
}

impl SummaryRow {
    fn into_summary(self) -> Result<DailySummary, DatabaseError> {
        let date = self
            .date
            .parse::<NaiveDate>()
            .map_err(|e| DatabaseError::CorruptRow {
                table: "summaries".into(),
                message: format!("bad date '{}': {e}", self.date),
            })?;
        Ok(DailySummary {
            date,
            levels: GaugeLevels {
                fatigue: self.fatigue,
                sunburn: self.sunburn,
                energy: self.energy,
                sleepiness: self.sleepiness,
            },
            prevent_count: self.prevent_count,
            prevent_success: self.prevent_success,
        })
    }
}

fn encode_instant(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn decode_instant(table: &str, raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::CorruptRow {
            table: table.into(),
            message: format!("bad timestamp '{raw}': {e}"),
        })
}
