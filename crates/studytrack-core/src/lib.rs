//! # StudyTrack Core Library
//!
//! This library provides the core business logic for the StudyTrack study
//! timer: a countdown session engine with break interleaving, a Pomodoro
//! cycle, daily streaks and the stores that persist them. The CLI binary is
//! a thin layer over the same library.
//!
//! ## Architecture
//!
//! - **Session Engine**: A state machine over one live countdown that the
//!   caller advances with `tick()`; a [`SessionController`] runs the tick on
//!   a tokio task
//! - **Storage**: Active and completed sessions plus streaks behind the
//!   [`SessionStore`] and [`StreakTracker`] traits, with SQLite, PostgREST
//!   and in-memory implementations, and TOML-based configuration
//! - **Streaks**: The consecutive-day law applied at every session end
//!
//! ## Key Components
//!
//! - [`SessionEngine`]: Core session state machine
//! - [`Database`]: Local session and streak persistence
//! - [`RestStore`]: Hosted backend persistence
//! - [`Config`]: Application configuration management

pub mod error;
pub mod events;
pub mod storage;
pub mod streak;
pub mod timer;

pub use error::{ConfigError, CoreError, StoreError, ValidationError};
pub use events::Event;
pub use storage::{
    Config, Database, MemoryStore, RestStore, SessionStore, StoreBackend, StreakTracker,
};
pub use streak::{next_streak, update_streak, StreakChange};
pub use timer::{
    format_clock, parse_clock, Clock, CycleStep, EngineSettings, ManualClock, PomodoroSettings,
    PomodoroStatus, SessionController, SessionEngine, SessionPhase, SessionSnapshot, SystemClock,
    TopicRef,
};
