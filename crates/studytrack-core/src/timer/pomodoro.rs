//! Pomodoro cycle arithmetic.
//!
//! A run is the alternating sequence study, break, study, break, ... of
//! length `2 * cycles`. Even indices are study, odd indices are breaks, and
//! every `long_break_interval`-th break is a long one.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Durations are seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroSettings {
    #[serde(default = "default_study_duration")]
    pub study_duration: u64,
    #[serde(default = "default_short_break_duration")]
    pub short_break_duration: u64,
    #[serde(default = "default_long_break_duration")]
    pub long_break_duration: u64,
    #[serde(default = "default_cycles")]
    pub cycles: u32,
    #[serde(default = "default_long_break_interval")]
    pub long_break_interval: u32,
}

fn default_study_duration() -> u64 {
    25 * 60
}
fn default_short_break_duration() -> u64 {
    5 * 60
}
fn default_long_break_duration() -> u64 {
    15 * 60
}
fn default_cycles() -> u32 {
    4
}
fn default_long_break_interval() -> u32 {
    4
}

impl Default for PomodoroSettings {
    fn default() -> Self {
        Self {
            study_duration: default_study_duration(),
            short_break_duration: default_short_break_duration(),
            long_break_duration: default_long_break_duration(),
            cycles: default_cycles(),
            long_break_interval: default_long_break_interval(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStep {
    Study,
    ShortBreak,
    LongBreak,
}

impl CycleStep {
    pub fn is_break(self) -> bool {
        !matches!(self, CycleStep::Study)
    }
}

impl PomodoroSettings {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.study_duration == 0 {
            return Err(ValidationError::NonPositiveDuration {
                field: "study_duration",
            });
        }
        if self.short_break_duration == 0 {
            return Err(ValidationError::NonPositiveDuration {
                field: "short_break_duration",
            });
        }
        if self.long_break_duration == 0 {
            return Err(ValidationError::NonPositiveDuration {
                field: "long_break_duration",
            });
        }
        if self.cycles == 0 {
            return Err(ValidationError::InvalidValue {
                field: "cycles".into(),
                message: "at least one cycle is required".into(),
            });
        }
        if self.long_break_interval == 0 {
            return Err(ValidationError::InvalidValue {
                field: "long_break_interval".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Number of sub-sessions in a full run.
    pub fn total_steps(&self) -> u32 {
        self.cycles.saturating_mul(2)
    }

    pub fn step_at(&self, index: u32) -> CycleStep {
        if index % 2 == 0 {
            return CycleStep::Study;
        }
        // 1-based break number
        let break_number = index / 2 + 1;
        if break_number % self.long_break_interval.max(1) == 0 {
            CycleStep::LongBreak
        } else {
            CycleStep::ShortBreak
        }
    }

    pub fn duration_of(&self, step: CycleStep) -> u64 {
        match step {
            CycleStep::Study => self.study_duration,
            CycleStep::ShortBreak => self.short_break_duration,
            CycleStep::LongBreak => self.long_break_duration,
        }
    }

    /// Durations of every sub-session of a run, in order.
    pub fn sequence(&self) -> Vec<u64> {
        (0..self.total_steps())
            .map(|i| self.duration_of(self.step_at(i)))
            .collect()
    }
}

/// Display view of a running Pomodoro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PomodoroStatus {
    /// 1-based study/break pair number.
    pub cycle: u32,
    pub is_study: bool,
    pub is_long_break: bool,
    pub total_cycles: u32,
}

impl PomodoroStatus {
    pub fn at(settings: &PomodoroSettings, index: u32) -> Self {
        let step = settings.step_at(index);
        Self {
            cycle: index / 2 + 1,
            is_study: step == CycleStep::Study,
            is_long_break: step == CycleStep::LongBreak,
            total_cycles: settings.cycles,
        }
    }

    pub fn label(&self) -> String {
        let kind = if self.is_study {
            "Study"
        } else if self.is_long_break {
            "Long Break"
        } else {
            "Short Break"
        };
        format!("Pomodoro {}/{} - {}", self.cycle, self.total_cycles, kind)
    }
}
