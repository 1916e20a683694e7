//! SQLite-backed session store.
//!
//! Provides persistent storage for:
//! - The active-session mirror used for crash recovery
//! - Completed study sessions
//! - Per-user streak records

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use super::data_dir;
use super::records::{
    ActiveSessionPatch, ActiveSessionRecord, CompletedSessionRecord, NewActiveSession,
    NewCompletedSession, SessionTotals, StreakRecord,
};
use super::traits::{SessionStore, StreakTracker};
use crate::error::{CoreError, StoreError, StoreResult};

const ACTIVE_COLUMNS: &str = "id, user_id, start_time, run_start_time, initial_time, \"current_time\", \
     is_running, is_break, is_pomodoro, pomodoro_cycle, stored_study_time, break_time, topic_id, \
     last_updated";

const COMPLETED_COLUMNS: &str =
    "id, user_id, start_time, end_time, total_seconds, break_seconds, interrupted, topic_id";

/// SQLite database for session storage.
///
/// The connection sits behind a mutex so one handle can serve the engine
/// and the ticker task.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `~/.config/studytrack/studytrack.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the data directory is unavailable or the database
    /// cannot be opened or migrated.
    pub fn open() -> Result<Self, CoreError> {
        let path = data_dir()?.join("studytrack.db");
        Ok(Self::open_at(path)?)
    }

    pub fn open_at(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Most recent completed sessions first.
    pub fn recent_sessions(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<CompletedSessionRecord>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COMPLETED_COLUMNS} FROM study_sessions
             WHERE user_id = ?1
             ORDER BY end_time DESC, id DESC
             LIMIT ?2"
        ))?;
        let rows = stmt
            .query_map(params![user_id, limit as i64], completed_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    pub fn completed_totals(&self, user_id: &str) -> StoreResult<SessionTotals> {
        let conn = self.conn.lock()?;
        let totals = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(interrupted), 0),
                    COALESCE(SUM(total_seconds), 0),
                    COALESCE(SUM(break_seconds), 0)
             FROM study_sessions
             WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(SessionTotals {
                    sessions: row.get(0)?,
                    interrupted: row.get(1)?,
                    study_seconds: row.get(2)?,
                    break_seconds: row.get(3)?,
                })
            },
        )?;
        Ok(totals)
    }
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS active_sessions (
            id                TEXT PRIMARY KEY,
            user_id           TEXT NOT NULL,
            start_time        TEXT NOT NULL,
            run_start_time    TEXT NOT NULL,
            initial_time      INTEGER NOT NULL,
            \"current_time\"  INTEGER NOT NULL,
            is_running        INTEGER NOT NULL,
            is_break          INTEGER NOT NULL DEFAULT 0,
            is_pomodoro       INTEGER NOT NULL DEFAULT 0,
            pomodoro_cycle    INTEGER NOT NULL DEFAULT 0,
            stored_study_time INTEGER,
            break_time        INTEGER NOT NULL DEFAULT 0,
            topic_id          TEXT,
            last_updated      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS study_sessions (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id       TEXT NOT NULL,
            start_time    TEXT NOT NULL,
            end_time      TEXT NOT NULL,
            total_seconds INTEGER NOT NULL,
            break_seconds INTEGER NOT NULL DEFAULT 0,
            interrupted   INTEGER NOT NULL DEFAULT 0,
            topic_id      TEXT
        );

        CREATE TABLE IF NOT EXISTS user_streaks (
            user_id         TEXT PRIMARY KEY,
            current_streak  INTEGER NOT NULL,
            longest_streak  INTEGER NOT NULL,
            last_study_date TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_active_sessions_user ON active_sessions(user_id, last_updated);
        CREATE INDEX IF NOT EXISTS idx_study_sessions_user_end ON study_sessions(user_id, end_time);",
    )
}

fn ts(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt(format!("timestamp '{raw}': {e}")))
}

fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| StoreError::Corrupt(format!("date '{raw}': {e}")))
}

/// Raw rows are decoded in two steps so timestamp errors surface as
/// `StoreError::Corrupt` rather than a generic SQLite conversion error.
fn active_from_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<ActiveSessionRecord>> {
    let start: String = row.get(2)?;
    let run_start: String = row.get(3)?;
    let updated: String = row.get(13)?;
    let id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let initial_time: u64 = row.get(4)?;
    let current_time: u64 = row.get(5)?;
    let is_running: bool = row.get(6)?;
    let is_break: bool = row.get(7)?;
    let is_pomodoro: bool = row.get(8)?;
    let pomodoro_cycle: u32 = row.get(9)?;
    let stored_study_time: Option<u64> = row.get(10)?;
    let break_time: u64 = row.get(11)?;
    let topic_id: Option<String> = row.get(12)?;

    Ok((|| {
        Ok(ActiveSessionRecord {
            id,
            fields: NewActiveSession {
                user_id,
                start_time: parse_ts(&start)?,
                run_start_time: parse_ts(&run_start)?,
                initial_time,
                current_time,
                is_running,
                is_break,
                is_pomodoro,
                pomodoro_cycle,
                stored_study_time,
                break_time,
                topic_id,
                last_updated: parse_ts(&updated)?,
            },
        })
    })())
}

fn completed_from_row(row: &Row<'_>) -> rusqlite::Result<StoreResult<CompletedSessionRecord>> {
    let id: i64 = row.get(0)?;
    let user_id: String = row.get(1)?;
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    let total_seconds: u64 = row.get(4)?;
    let break_seconds: u64 = row.get(5)?;
    let interrupted: bool = row.get(6)?;
    let topic_id: Option<String> = row.get(7)?;

    Ok((|| {
        Ok(CompletedSessionRecord {
            id,
            fields: NewCompletedSession {
                user_id,
                start_time: parse_ts(&start)?,
                end_time: parse_ts(&end)?,
                total_seconds,
                break_seconds,
                interrupted,
                topic_id,
            },
        })
    })())
}

#[async_trait]
impl SessionStore for Database {
    async fn list_active(&self, user_id: &str) -> StoreResult<Vec<ActiveSessionRecord>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ACTIVE_COLUMNS} FROM active_sessions
             WHERE user_id = ?1
             ORDER BY last_updated DESC"
        ))?;
        let rows = stmt
            .query_map(params![user_id], active_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().collect()
    }

    async fn create_active(&self, record: NewActiveSession) -> StoreResult<ActiveSessionRecord> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO active_sessions ({ACTIVE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
            ),
            params![
                id,
                record.user_id,
                ts(&record.start_time),
                ts(&record.run_start_time),
                record.initial_time,
                record.current_time,
                record.is_running,
                record.is_break,
                record.is_pomodoro,
                record.pomodoro_cycle,
                record.stored_study_time,
                record.break_time,
                record.topic_id,
                ts(&record.last_updated),
            ],
        )?;
        Ok(ActiveSessionRecord { id, fields: record })
    }

    async fn update_active(&self, id: &str, patch: &ActiveSessionPatch) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        let changed = conn.execute(
            "UPDATE active_sessions SET
                \"current_time\" = COALESCE(?2, \"current_time\"),
                is_running = COALESCE(?3, is_running),
                break_time = COALESCE(?4, break_time),
                last_updated = ?5
             WHERE id = ?1",
            params![
                id,
                patch.current_time,
                patch.is_running,
                patch.break_time,
                ts(&patch.last_updated),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_active(&self, id: &str) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        conn.execute("DELETE FROM active_sessions WHERE id = ?1", params![id])?;
        Ok(())
    }

    async fn delete_active_for_user(&self, user_id: &str) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "DELETE FROM active_sessions WHERE user_id = ?1",
            params![user_id],
        )?;
        Ok(())
    }

    async fn create_completed(
        &self,
        record: NewCompletedSession,
    ) -> StoreResult<CompletedSessionRecord> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO study_sessions
                (user_id, start_time, end_time, total_seconds, break_seconds, interrupted, topic_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.user_id,
                ts(&record.start_time),
                ts(&record.end_time),
                record.total_seconds,
                record.break_seconds,
                record.interrupted,
                record.topic_id,
            ],
        )?;
        Ok(CompletedSessionRecord {
            id: conn.last_insert_rowid(),
            fields: record,
        })
    }
}

#[async_trait]
impl StreakTracker for Database {
    async fn get(&self, user_id: &str) -> StoreResult<Option<StreakRecord>> {
        let conn = self.conn.lock()?;
        let raw = conn
            .query_row(
                "SELECT current_streak, longest_streak, last_study_date
                 FROM user_streaks WHERE user_id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;
        raw.map(|(current, longest, last)| {
            Ok(StreakRecord {
                current_streak: current,
                longest_streak: longest,
                last_study_date: parse_date(&last)?,
            })
        })
        .transpose()
    }

    async fn create(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            "INSERT INTO user_streaks (user_id, current_streak, longest_streak, last_study_date)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                user_id,
                record.current_streak,
                record.longest_streak,
                record.last_study_date.format("%Y-%m-%d").to_string(),
            ],
        )?;
        Ok(())
    }

    async fn update(&self, user_id: &str, record: &StreakRecord) -> StoreResult<()> {
        let conn = self.conn.lock()?;
        let changed = conn.execute(
            "UPDATE user_streaks
             SET current_streak = ?2, longest_streak = ?3, last_study_date = ?4
             WHERE user_id = ?1",
            params![
                user_id,
                record.current_streak,
                record.longest_streak,
                record.last_study_date.format("%Y-%m-%d").to_string(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(user_id.to_string()));
        }
        Ok(())
    }
}
