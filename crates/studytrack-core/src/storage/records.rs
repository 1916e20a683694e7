//! Row shapes exchanged with the session store and streak tracker.
//!
//! Field names follow the backend tables (`active_sessions`,
//! `study_sessions`, `user_streaks`) so the same types serialize straight
//! into REST bodies.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// The single in-progress session mirrored remotely for crash recovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionRecord {
    pub id: String,
    #[serde(flatten)]
    pub fields: NewActiveSession,
}

/// Insert payload for `active_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActiveSession {
    pub user_id: String,
    /// Start of the current sub-session.
    pub start_time: DateTime<Utc>,
    /// Start of the whole run; survives break resumes and Pomodoro steps.
    pub run_start_time: DateTime<Utc>,
    pub initial_time: u64,
    pub current_time: u64,
    pub is_running: bool,
    pub is_break: bool,
    pub is_pomodoro: bool,
    #[serde(default)]
    pub pomodoro_cycle: u32,
    #[serde(default)]
    pub stored_study_time: Option<u64>,
    #[serde(default)]
    pub break_time: u64,
    #[serde(default)]
    pub topic_id: Option<String>,
    pub last_updated: DateTime<Utc>,
}

/// Partial update for an active row. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveSessionPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_running: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_time: Option<u64>,
    pub last_updated: DateTime<Utc>,
}

impl ActiveSessionPatch {
    pub fn at(last_updated: DateTime<Utc>) -> Self {
        Self {
            last_updated,
            ..Default::default()
        }
    }

    pub fn current_time(mut self, secs: u64) -> Self {
        self.current_time = Some(secs);
        self
    }

    pub fn running(mut self, running: bool) -> Self {
        self.is_running = Some(running);
        self
    }

    pub fn break_time(mut self, secs: u64) -> Self {
        self.break_time = Some(secs);
        self
    }

    pub fn apply(&self, record: &mut NewActiveSession) {
        if let Some(t) = self.current_time {
            record.current_time = t;
        }
        if let Some(r) = self.is_running {
            record.is_running = r;
        }
        if let Some(b) = self.break_time {
            record.break_time = b;
        }
        record.last_updated = self.last_updated;
    }
}

/// Write-once summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSessionRecord {
    pub id: i64,
    #[serde(flatten)]
    pub fields: NewCompletedSession,
}

/// Insert payload for `study_sessions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCompletedSession {
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Study seconds, break time excluded.
    pub total_seconds: u64,
    pub break_seconds: u64,
    pub interrupted: bool,
    #[serde(default)]
    pub topic_id: Option<String>,
}

/// Per-user consecutive-day streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreakRecord {
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_study_date: NaiveDate,
}

/// Totals over a user's completed sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub sessions: u64,
    pub interrupted: u64,
    pub study_seconds: u64,
    pub break_seconds: u64,
}
