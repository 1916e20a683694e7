//! Session state model.
//!
//! One tagged [`SessionPhase`] replaces the loose `is_break` /
//! `is_pomodoro` / `pomodoro_cycle` flags, so a break can never be a
//! Pomodoro step at the same time.
//!
//! ```text
//! Idle -> Studying <-> OnBreak -> Idle
//!   \--> Pomodoro(0) -> Pomodoro(1) -> ... -> Pomodoro(2n-1) -> Idle
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pomodoro::{PomodoroSettings, PomodoroStatus};

/// The one live countdown of a sub-session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Countdown {
    /// Id of the mirrored active-session row.
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub initial_secs: u64,
    pub remaining_secs: u64,
    pub running: bool,
}

/// Bookkeeping carried across the sub-sessions of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLedger {
    pub started_at: DateTime<Utc>,
    pub break_secs: u64,
}

impl RunLedger {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            break_secs: 0,
        }
    }
}

/// A topic attached to the session. The engine only forwards its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicRef {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
}

impl TopicRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            field: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Studying {
        countdown: Countdown,
    },
    OnBreak {
        countdown: Countdown,
        /// Study seconds to restore when the break ends.
        resume_to: Option<u64>,
    },
    Pomodoro {
        countdown: Countdown,
        cycle: u32,
        settings: PomodoroSettings,
    },
}

impl SessionPhase {
    pub fn countdown(&self) -> Option<&Countdown> {
        match self {
            SessionPhase::Idle => None,
            SessionPhase::Studying { countdown }
            | SessionPhase::OnBreak { countdown, .. }
            | SessionPhase::Pomodoro { countdown, .. } => Some(countdown),
        }
    }

    pub fn countdown_mut(&mut self) -> Option<&mut Countdown> {
        match self {
            SessionPhase::Idle => None,
            SessionPhase::Studying { countdown }
            | SessionPhase::OnBreak { countdown, .. }
            | SessionPhase::Pomodoro { countdown, .. } => Some(countdown),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Studying { .. } => "studying",
            SessionPhase::OnBreak { .. } => "on a break",
            SessionPhase::Pomodoro { .. } => "running a pomodoro",
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, SessionPhase::OnBreak { .. })
    }

    pub fn is_pomodoro(&self) -> bool {
        matches!(self, SessionPhase::Pomodoro { .. })
    }
}

/// Flat, serializable view of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: String,
    pub remaining_time: u64,
    pub accumulated_time: u64,
    pub is_running: bool,
    pub session_start_time: Option<DateTime<Utc>>,
    pub is_break: bool,
    pub stored_study_time: Option<u64>,
    pub is_pomodoro: bool,
    pub pomodoro_cycle: u32,
    pub pomodoro: Option<PomodoroStatus>,
    pub active_session_id: Option<String>,
    pub topic_id: Option<String>,
    pub break_secs: u64,
}
