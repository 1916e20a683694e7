use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::CompletedSessionRecord;
use crate::streak::StreakChange;
use crate::timer::{CycleStep, SessionSnapshot};

/// Every state change of the session engine produces an Event.
/// The CLI prints them; the ticker forwards them to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    SessionStarted {
        session_id: String,
        duration_secs: u64,
        is_break: bool,
        at: DateTime<Utc>,
    },
    TimerPaused {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    TimeAdded {
        added_secs: u64,
        remaining_secs: u64,
        at: DateTime<Utc>,
    },
    BreakStarted {
        duration_secs: u64,
        stored_study_secs: u64,
        at: DateTime<Utc>,
    },
    /// A break finished; `resumed_secs` is the study time restored, if any.
    BreakEnded {
        break_secs: u64,
        resumed_secs: Option<u64>,
        at: DateTime<Utc>,
    },
    PomodoroStarted {
        cycles: u32,
        at: DateTime<Utc>,
    },
    PomodoroAdvanced {
        cycle_index: u32,
        step: CycleStep,
        duration_secs: u64,
        at: DateTime<Utc>,
    },
    /// The run ended and its summary was handed to the store.
    /// `record` is `None` when the write failed.
    SessionCompleted {
        interrupted: bool,
        total_secs: u64,
        break_secs: u64,
        record: Option<CompletedSessionRecord>,
        streak: Option<StreakChange>,
        at: DateTime<Utc>,
    },
    SessionRecovered {
        snapshot: SessionSnapshot,
        discarded: usize,
        at: DateTime<Utc>,
    },
    StateSnapshot {
        snapshot: SessionSnapshot,
        at: DateTime<Utc>,
    },
}
