//! Session engine.
//!
//! Owns the live [`SessionPhase`] for one signed-in user and mirrors it to a
//! [`SessionStore`]. Like the countdown it drives, the engine has no thread
//! of its own: something (normally a [`Ticker`](super::Ticker)) calls
//! [`SessionEngine::tick`] once per second while [`SessionEngine::is_ticking`]
//! holds.
//!
//! Remote writes are best-effort except for creating active rows. Starting a
//! new run whose row cannot be created leaves the engine idle with the
//! error. Inside a run (break start and end, Pomodoro steps) the previous row
//! is only deleted once its replacement exists; if the replacement cannot be
//! created the run is closed as interrupted so its study time is still
//! recorded. Every other store failure is logged and the local transition
//! goes ahead.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::clock::{Clock, SystemClock};
use super::pomodoro::{PomodoroSettings, PomodoroStatus};
use super::state::{Countdown, RunLedger, SessionPhase, SessionSnapshot, TopicRef};
use crate::error::{CoreError, Result, ValidationError};
use crate::events::Event;
use crate::storage::{
    ActiveSessionPatch, ActiveSessionRecord, NewActiveSession, NewCompletedSession, SessionStore,
    StreakTracker,
};
use crate::streak::update_streak;

/// Engine tunables that do not change during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Length of a manual break started from a study session.
    pub break_duration_secs: u64,
    /// Used by [`SessionEngine::start_pomodoro`] callers and for recovering
    /// a Pomodoro row, which does not carry its settings.
    pub pomodoro: PomodoroSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            break_duration_secs: 5 * 60,
            pomodoro: PomodoroSettings::default(),
        }
    }
}

/// What the next sub-session is, before its countdown exists.
enum Step {
    Study,
    Break { resume_to: Option<u64> },
    Pomodoro { cycle: u32, settings: PomodoroSettings },
}

impl Step {
    fn into_phase(self, countdown: Countdown) -> SessionPhase {
        match self {
            Step::Study => SessionPhase::Studying { countdown },
            Step::Break { resume_to } => SessionPhase::OnBreak {
                countdown,
                resume_to,
            },
            Step::Pomodoro { cycle, settings } => SessionPhase::Pomodoro {
                countdown,
                cycle,
                settings,
            },
        }
    }
}

pub struct SessionEngine {
    sessions: Arc<dyn SessionStore>,
    streaks: Arc<dyn StreakTracker>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    user_id: Option<String>,
    phase: SessionPhase,
    ledger: Option<RunLedger>,
    topic: Option<TopicRef>,
}

impl SessionEngine {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        streaks: Arc<dyn StreakTracker>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            sessions,
            streaks,
            clock: Arc::new(SystemClock),
            settings,
            user_id: None,
            phase: SessionPhase::Idle,
            ledger: None,
            topic: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    pub fn remaining_time(&self) -> u64 {
        self.phase.countdown().map(|c| c.remaining_secs).unwrap_or(0)
    }

    pub fn initial_time(&self) -> u64 {
        self.phase.countdown().map(|c| c.initial_secs).unwrap_or(0)
    }

    /// Wall seconds since the current sub-session started.
    pub fn accumulated_time(&self) -> u64 {
        self.phase
            .countdown()
            .map(|c| secs_between(c.started_at, self.clock.now()))
            .unwrap_or(0)
    }

    pub fn is_running(&self) -> bool {
        self.phase.countdown().map(|c| c.running).unwrap_or(false)
    }

    pub fn session_start_time(&self) -> Option<DateTime<Utc>> {
        self.phase.countdown().map(|c| c.started_at)
    }

    pub fn active_session_id(&self) -> Option<&str> {
        self.phase.countdown().map(|c| c.session_id.as_str())
    }

    pub fn is_break(&self) -> bool {
        self.phase.is_break()
    }

    pub fn stored_study_time(&self) -> Option<u64> {
        match &self.phase {
            SessionPhase::OnBreak { resume_to, .. } => *resume_to,
            _ => None,
        }
    }

    pub fn is_pomodoro(&self) -> bool {
        self.phase.is_pomodoro()
    }

    pub fn pomodoro_cycle(&self) -> u32 {
        match &self.phase {
            SessionPhase::Pomodoro { cycle, .. } => *cycle,
            _ => 0,
        }
    }

    /// `None` unless a Pomodoro run is in progress.
    pub fn pomodoro_status(&self) -> Option<PomodoroStatus> {
        match &self.phase {
            SessionPhase::Pomodoro {
                cycle, settings, ..
            } => Some(PomodoroStatus::at(settings, *cycle)),
            _ => None,
        }
    }

    pub fn pomodoro_settings(&self) -> &PomodoroSettings {
        &self.settings.pomodoro
    }

    pub fn selected_topic(&self) -> Option<&TopicRef> {
        self.topic.as_ref()
    }

    pub fn select_topic(&mut self, topic: Option<TopicRef>) {
        self.topic = topic;
    }

    /// Accumulated break seconds of the current run.
    pub fn break_time(&self) -> u64 {
        self.ledger.map(|l| l.break_secs).unwrap_or(0)
    }

    /// Whether the once-per-second tick should be scheduled.
    pub fn is_ticking(&self) -> bool {
        self.phase
            .countdown()
            .map(|c| c.running && !c.session_id.is_empty())
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase.name().to_string(),
            remaining_time: self.remaining_time(),
            accumulated_time: self.accumulated_time(),
            is_running: self.is_running(),
            session_start_time: self.session_start_time(),
            is_break: self.is_break(),
            stored_study_time: self.stored_study_time(),
            is_pomodoro: self.is_pomodoro(),
            pomodoro_cycle: self.pomodoro_cycle(),
            pomodoro: self.pomodoro_status(),
            active_session_id: self.active_session_id().map(str::to_string),
            topic_id: self.topic.as_ref().map(|t| t.id.clone()),
            break_secs: self.break_time(),
        }
    }

    // =========================================================================
    // Sign-in and recovery
    // =========================================================================

    /// Sign `user_id` in and rehydrate any session left in the store.
    ///
    /// Duplicate active rows are pruned to the most recently updated one. If
    /// the store cannot even be listed, every active row of the user is
    /// dropped and the engine starts idle.
    pub async fn load(&mut self, user_id: &str) -> Option<Event> {
        self.user_id = Some(user_id.to_string());
        self.topic = None;
        self.reset();

        let rows = match self.sessions.list_active(user_id).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(user_id, error = %e, "failed to load active session, clearing remote state");
                if let Err(e) = self.sessions.delete_active_for_user(user_id).await {
                    warn!(user_id, error = %e, "failed to clear active sessions");
                }
                return None;
            }
        };

        let mut rows = rows.into_iter();
        let newest = rows.next()?;
        let mut discarded = 0;
        for stale in rows {
            discarded += 1;
            if let Err(e) = self.sessions.delete_active(&stale.id).await {
                warn!(session_id = %stale.id, error = %e, "failed to delete duplicate active session");
            }
        }

        self.rehydrate(newest);
        info!(user_id, discarded, phase = self.phase.name(), "recovered active session");
        Some(Event::SessionRecovered {
            snapshot: self.snapshot(),
            discarded,
            at: self.clock.now(),
        })
    }

    /// Forget the user and any local session. The store is left untouched.
    pub fn sign_out(&mut self) {
        self.user_id = None;
        self.topic = None;
        self.reset();
    }

    fn rehydrate(&mut self, row: ActiveSessionRecord) {
        let f = row.fields;
        let countdown = Countdown {
            session_id: row.id,
            started_at: f.start_time,
            initial_secs: f.initial_time,
            remaining_secs: f.current_time,
            running: f.is_running,
        };
        let step = if f.is_break {
            Step::Break {
                resume_to: f.stored_study_time,
            }
        } else if f.is_pomodoro {
            let settings = self.settings.pomodoro;
            Step::Pomodoro {
                cycle: f.pomodoro_cycle.min(settings.total_steps().saturating_sub(1)),
                settings,
            }
        } else {
            Step::Study
        };
        self.phase = step.into_phase(countdown);
        self.ledger = Some(RunLedger {
            started_at: f.run_start_time,
            break_secs: f.break_time,
        });
        self.topic = f.topic_id.map(TopicRef::new);
    }

    // =========================================================================
    // Timer core
    // =========================================================================

    /// Begin a new run of `initial_secs`, replacing whatever was active.
    pub async fn start_timer(&mut self, initial_secs: u64, is_break: bool) -> Result<Option<Event>> {
        let now = self.clock.now();
        let step = if is_break {
            Step::Break { resume_to: None }
        } else {
            Step::Study
        };
        self.begin(initial_secs, step, RunLedger::new(now)).await?;
        Ok(Some(Event::SessionStarted {
            session_id: self.active_session_id().unwrap_or_default().to_string(),
            duration_secs: initial_secs,
            is_break,
            at: now,
        }))
    }

    pub async fn pause_timer(&mut self) -> Result<Option<Event>> {
        Ok(self.set_running(false).await.map(|remaining_secs| Event::TimerPaused {
            remaining_secs,
            at: self.clock.now(),
        }))
    }

    pub async fn resume_timer(&mut self) -> Result<Option<Event>> {
        Ok(self.set_running(true).await.map(|remaining_secs| Event::TimerResumed {
            remaining_secs,
            at: self.clock.now(),
        }))
    }

    /// Advance the countdown by one second.
    ///
    /// Returns the terminal event when the countdown reaches zero. Exactly
    /// one of the break, Pomodoro or session-end handlers runs, chosen by the
    /// current phase.
    pub async fn tick(&mut self) -> Option<Event> {
        if !self.is_ticking() {
            return None;
        }
        let now = self.clock.now();
        let countdown = self.phase.countdown_mut()?;
        countdown.remaining_secs = countdown.remaining_secs.saturating_sub(1);
        let remaining = countdown.remaining_secs;
        let session_id = countdown.session_id.clone();

        let patch = ActiveSessionPatch::at(now).current_time(remaining);
        if let Err(e) = self.sessions.update_active(&session_id, &patch).await {
            warn!(%session_id, error = %e, "failed to mirror tick");
        }
        debug!(remaining, "tick");

        if remaining > 0 {
            return None;
        }

        let outcome = if self.phase.is_break() {
            self.handle_break_end().await
        } else if self.phase.is_pomodoro() {
            self.handle_pomodoro_cycle_end().await
        } else {
            self.handle_timer_end(false).await
        };
        match outcome {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "countdown completion failed");
                None
            }
        }
    }

    /// Extend the study countdown by `secs`.
    ///
    /// This restarts the timer with the new total rather than resuming it, so
    /// a fresh active row and run are created.
    pub async fn add_time(&mut self, secs: u64) -> Result<Option<Event>> {
        if secs == 0 {
            return Err(ValidationError::NonPositiveDuration { field: "added time" }.into());
        }
        match &self.phase {
            SessionPhase::Idle | SessionPhase::Studying { .. } => {}
            other => {
                return Err(ValidationError::InvalidTransition {
                    op: "add time",
                    phase: other.name(),
                }
                .into())
            }
        }

        if self.is_running() {
            self.pause_timer().await?;
        }
        let total = self.remaining_time().saturating_add(secs);
        self.start_timer(total, false).await?;
        Ok(Some(Event::TimeAdded {
            added_secs: secs,
            remaining_secs: total,
            at: self.clock.now(),
        }))
    }

    // =========================================================================
    // Breaks
    // =========================================================================

    /// Put the running study session aside and start a fixed-length break.
    pub async fn start_break(&mut self) -> Result<Option<Event>> {
        let stored = match &self.phase {
            SessionPhase::Studying { countdown } if countdown.running => countdown.remaining_secs,
            SessionPhase::Studying { .. } => {
                return Err(ValidationError::InvalidTransition {
                    op: "start a break",
                    phase: "paused",
                }
                .into())
            }
            other => {
                return Err(ValidationError::InvalidTransition {
                    op: "start a break",
                    phase: other.name(),
                }
                .into())
            }
        };

        self.pause_timer().await?;
        let ledger = self.current_ledger();
        let duration = self.settings.break_duration_secs;
        let step = Step::Break {
            resume_to: Some(stored),
        };
        if let Some(closed) = self.continue_run(duration, step, ledger).await? {
            return Ok(Some(closed));
        }
        info!(duration, stored, "break started");
        Ok(Some(Event::BreakStarted {
            duration_secs: duration,
            stored_study_secs: stored,
            at: self.clock.now(),
        }))
    }

    /// Finish the current break and restore the study time saved when it
    /// began. Remote cleanup failures never prevent the restore.
    pub async fn handle_break_end(&mut self) -> Result<Option<Event>> {
        let (countdown, resume_to) = match &self.phase {
            SessionPhase::OnBreak {
                countdown,
                resume_to,
            } => (countdown.clone(), *resume_to),
            other => {
                return Err(ValidationError::InvalidTransition {
                    op: "end a break",
                    phase: other.name(),
                }
                .into())
            }
        };

        let now = self.clock.now();
        let elapsed = secs_between(countdown.started_at, now);
        let mut ledger = self.current_ledger();
        ledger.break_secs = ledger.break_secs.saturating_add(elapsed);

        let patch = ActiveSessionPatch::at(now).break_time(ledger.break_secs);
        if let Err(e) = self.sessions.update_active(&countdown.session_id, &patch).await {
            warn!(session_id = %countdown.session_id, error = %e, "failed to record break time");
        }

        let resumed_secs = match resume_to {
            Some(secs) => {
                if let Some(closed) = self.continue_run(secs, Step::Study, ledger).await? {
                    return Ok(Some(closed));
                }
                Some(secs)
            }
            None => {
                if let Err(e) = self.sessions.delete_active(&countdown.session_id).await {
                    warn!(session_id = %countdown.session_id, error = %e, "failed to delete break session");
                }
                self.reset();
                None
            }
        };
        info!(elapsed, ?resumed_secs, "break ended");
        Ok(Some(Event::BreakEnded {
            break_secs: elapsed,
            resumed_secs,
            at: now,
        }))
    }

    // =========================================================================
    // Pomodoro
    // =========================================================================

    /// Start a Pomodoro run at its first study step.
    ///
    /// A topic is expected to be selected by the caller; without one the
    /// completed record simply carries no topic.
    pub async fn start_pomodoro(&mut self, settings: PomodoroSettings) -> Result<Option<Event>> {
        settings.validate()?;
        let now = self.clock.now();
        self.begin(
            settings.study_duration,
            Step::Pomodoro { cycle: 0, settings },
            RunLedger::new(now),
        )
        .await?;
        self.settings.pomodoro = settings;
        info!(cycles = settings.cycles, "pomodoro started");
        Ok(Some(Event::PomodoroStarted {
            cycles: settings.cycles,
            at: now,
        }))
    }

    /// Move to the next Pomodoro step, or finish the run after the last one.
    pub async fn handle_pomodoro_cycle_end(&mut self) -> Result<Option<Event>> {
        let (countdown, cycle, settings) = match &self.phase {
            SessionPhase::Pomodoro {
                countdown,
                cycle,
                settings,
            } => (countdown.clone(), *cycle, *settings),
            other => {
                return Err(ValidationError::InvalidTransition {
                    op: "advance a pomodoro",
                    phase: other.name(),
                }
                .into())
            }
        };

        let next = cycle + 1;
        if next >= settings.total_steps() {
            info!(cycles = settings.cycles, "pomodoro finished");
            return self.handle_timer_end(false).await;
        }

        let now = self.clock.now();
        let mut ledger = self.current_ledger();
        if settings.step_at(cycle).is_break() {
            ledger.break_secs = ledger
                .break_secs
                .saturating_add(secs_between(countdown.started_at, now));
        }

        let step = settings.step_at(next);
        let duration = settings.duration_of(step);
        let next_step = Step::Pomodoro {
            cycle: next,
            settings,
        };
        if let Some(closed) = self.continue_run(duration, next_step, ledger).await? {
            return Ok(Some(closed));
        }
        debug!(cycle = next, ?step, duration, "pomodoro advanced");
        Ok(Some(Event::PomodoroAdvanced {
            cycle_index: next,
            step,
            duration_secs: duration,
            at: now,
        }))
    }

    // =========================================================================
    // Session end
    // =========================================================================

    /// Close the run: write its completed record, drop the active row, go
    /// idle and update the streak. A no-op once idle.
    pub async fn handle_timer_end(&mut self, interrupted: bool) -> Result<Option<Event>> {
        let Some(countdown) = self.phase.countdown().cloned() else {
            return Ok(None);
        };
        let Some(user_id) = self.user_id.clone() else {
            return Ok(None);
        };

        let now = self.clock.now();
        let mut ledger = self.current_ledger();
        let in_break = match &self.phase {
            SessionPhase::OnBreak { .. } => true,
            SessionPhase::Pomodoro {
                cycle, settings, ..
            } => settings.step_at(*cycle).is_break(),
            _ => false,
        };
        if in_break {
            ledger.break_secs = ledger
                .break_secs
                .saturating_add(secs_between(countdown.started_at, now));
        }
        let standalone_break = matches!(
            self.phase,
            SessionPhase::OnBreak {
                resume_to: None,
                ..
            }
        );

        let total_secs = secs_between(ledger.started_at, now).saturating_sub(ledger.break_secs);
        let summary = NewCompletedSession {
            user_id: user_id.clone(),
            start_time: ledger.started_at,
            end_time: now,
            total_seconds: total_secs,
            break_seconds: ledger.break_secs,
            interrupted,
            topic_id: self.topic.as_ref().map(|t| t.id.clone()),
        };
        let record = match self.sessions.create_completed(summary).await {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(%user_id, error = %e, "failed to save completed session");
                None
            }
        };
        if let Err(e) = self.sessions.delete_active(&countdown.session_id).await {
            warn!(session_id = %countdown.session_id, error = %e, "failed to delete active session");
        }
        self.reset();

        let streak = if standalone_break {
            None
        } else {
            match update_streak(self.streaks.as_ref(), &user_id, now.date_naive()).await {
                Ok(change) => Some(change),
                Err(e) => {
                    warn!(%user_id, error = %e, "failed to update streak");
                    None
                }
            }
        };

        info!(interrupted, total_secs, break_secs = ledger.break_secs, "session ended");
        Ok(Some(Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs: ledger.break_secs,
            record,
            streak,
            at: now,
        }))
    }

    /// User-initiated exit. Always recorded as interrupted.
    pub async fn exit(&mut self) -> Result<Option<Event>> {
        self.handle_timer_end(true).await
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Start a new run: replace every active row of the user with one for
    /// its first sub-session. On failure the engine is left idle.
    async fn begin(&mut self, secs: u64, step: Step, ledger: RunLedger) -> Result<()> {
        let record = self.active_record(secs, &step, &ledger)?;
        if let Err(e) = self.sessions.delete_active_for_user(&record.user_id).await {
            warn!(user_id = %record.user_id, error = %e, "failed to clear previous active session");
        }
        if let Err(e) = self.open_sub_session(record, step, ledger).await {
            self.reset();
            return Err(e);
        }
        Ok(())
    }

    /// Move the current run on to its next sub-session.
    ///
    /// The previous row is deleted only after the new one exists. When the
    /// new row cannot be created the run is closed as interrupted and the
    /// completion event is returned; `None` means the run continues.
    async fn continue_run(
        &mut self,
        secs: u64,
        step: Step,
        ledger: RunLedger,
    ) -> Result<Option<Event>> {
        let record = self.active_record(secs, &step, &ledger)?;
        let previous = self.active_session_id().map(str::to_string);
        if let Err(e) = self.open_sub_session(record, step, ledger).await {
            warn!(error = %e, "failed to continue session, closing it");
            return self.handle_timer_end(true).await;
        }
        if let Some(id) = previous {
            if let Err(e) = self.sessions.delete_active(&id).await {
                warn!(session_id = %id, error = %e, "failed to delete previous active session");
            }
        }
        Ok(None)
    }

    /// Validate and build the active row for a sub-session starting now.
    fn active_record(
        &self,
        secs: u64,
        step: &Step,
        ledger: &RunLedger,
    ) -> Result<NewActiveSession> {
        let user_id = self.user_id.clone().ok_or(CoreError::NotAuthenticated)?;
        if secs == 0 {
            return Err(ValidationError::NonPositiveDuration { field: "duration" }.into());
        }
        let topic_id = self.validated_topic_id()?;

        let now = self.clock.now();
        let (is_break, is_pomodoro, pomodoro_cycle, stored_study_time) = match step {
            Step::Study => (false, false, 0, None),
            Step::Break { resume_to } => (true, false, 0, *resume_to),
            Step::Pomodoro { cycle, .. } => (false, true, *cycle, None),
        };
        Ok(NewActiveSession {
            user_id,
            start_time: now,
            run_start_time: ledger.started_at,
            initial_time: secs,
            current_time: secs,
            is_running: true,
            is_break,
            is_pomodoro,
            pomodoro_cycle,
            stored_study_time,
            break_time: ledger.break_secs,
            topic_id,
            last_updated: now,
        })
    }

    /// Insert the row and make it the live countdown. The phase is left
    /// untouched on failure.
    async fn open_sub_session(
        &mut self,
        record: NewActiveSession,
        step: Step,
        ledger: RunLedger,
    ) -> Result<()> {
        let started_at = record.start_time;
        let secs = record.initial_time;
        let row = self.sessions.create_active(record).await?;
        let countdown = Countdown {
            session_id: row.id,
            started_at,
            initial_secs: secs,
            remaining_secs: secs,
            running: true,
        };
        self.phase = step.into_phase(countdown);
        self.ledger = Some(ledger);
        Ok(())
    }

    /// Flip the running flag and mirror it. Returns the remaining seconds,
    /// or `None` when there is nothing to change.
    async fn set_running(&mut self, running: bool) -> Option<u64> {
        let now = self.clock.now();
        let countdown = self.phase.countdown_mut()?;
        if countdown.running == running {
            return None;
        }
        countdown.running = running;
        let remaining = countdown.remaining_secs;
        let session_id = countdown.session_id.clone();

        let patch = ActiveSessionPatch::at(now).running(running);
        if let Err(e) = self.sessions.update_active(&session_id, &patch).await {
            warn!(%session_id, running, error = %e, "failed to mirror running flag");
        }
        Some(remaining)
    }

    fn validated_topic_id(&self) -> Result<Option<String>> {
        match &self.topic {
            None => Ok(None),
            Some(topic) => match Uuid::parse_str(&topic.id) {
                Ok(_) => Ok(Some(topic.id.clone())),
                Err(_) => Err(ValidationError::InvalidTopicId(topic.id.clone()).into()),
            },
        }
    }

    fn current_ledger(&self) -> RunLedger {
        self.ledger.unwrap_or_else(|| {
            RunLedger::new(
                self.session_start_time()
                    .unwrap_or_else(|| self.clock.now()),
            )
        })
    }

    fn reset(&mut self) {
        self.phase = SessionPhase::Idle;
        self.ledger = None;
    }
}

fn secs_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    (to - from).num_seconds().max(0) as u64
}
