//! Integration tests for the session engine.
//!
//! Drives the engine against the in-memory store with a manual clock, one
//! tick per simulated second, and checks both the local state and what was
//! mirrored to the store.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use studytrack_core::storage::{ActiveSessionRecord, NewActiveSession, StoreOp, StreakRecord};
use studytrack_core::{
    CoreError, CycleStep, EngineSettings, Event, ManualClock, MemoryStore, PomodoroSettings,
    SessionEngine, SessionPhase, StoreError, StreakChange, TopicRef, ValidationError,
};

const USER: &str = "user-1";
const TOPIC: &str = "6f1d2c1e-93a4-4a6b-9d53-1c8e7a0f5b21";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
}

fn engine_with(store: &MemoryStore, clock: &ManualClock) -> SessionEngine {
    let shared = Arc::new(store.clone());
    SessionEngine::new(shared.clone(), shared, EngineSettings::default())
        .with_clock(Arc::new(clock.clone()))
}

async fn signed_in(store: &MemoryStore, clock: &ManualClock) -> SessionEngine {
    let mut engine = engine_with(store, clock);
    assert!(engine.load(USER).await.is_none());
    engine
}

/// Advance the clock and tick once per second; returns the events produced.
async fn run_secs(engine: &mut SessionEngine, clock: &ManualClock, secs: u64) -> Vec<Event> {
    let mut events = Vec::new();
    for _ in 0..secs {
        clock.advance_secs(1);
        if let Some(event) = engine.tick().await {
            events.push(event);
        }
    }
    events
}

fn active_row(id: &str, last_updated: DateTime<Utc>, current: u64) -> ActiveSessionRecord {
    ActiveSessionRecord {
        id: id.to_string(),
        fields: NewActiveSession {
            user_id: USER.to_string(),
            start_time: t0(),
            run_start_time: t0(),
            initial_time: 1500,
            current_time: current,
            is_running: true,
            is_break: false,
            is_pomodoro: false,
            pomodoro_cycle: 0,
            stored_study_time: None,
            break_time: 0,
            topic_id: None,
            last_updated,
        },
    }
}

// =============================================================================
// Timer core
// =============================================================================

#[tokio::test]
async fn start_timer_creates_single_running_session() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;

    let event = engine.start_timer(1500, false).await.unwrap();
    assert!(matches!(
        event,
        Some(Event::SessionStarted {
            duration_secs: 1500,
            is_break: false,
            ..
        })
    ));
    assert_eq!(engine.remaining_time(), 1500);
    assert!(engine.is_running());
    assert!(engine.is_ticking());
    assert_eq!(engine.session_start_time(), Some(t0()));

    let rows = store.active_rows(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(Some(rows[0].id.as_str()), engine.active_session_id());
    assert_eq!(rows[0].fields.current_time, 1500);

    // Starting again replaces the previous row.
    engine.start_timer(600, false).await.unwrap();
    let rows = store.active_rows(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].fields.initial_time, 600);
}

#[tokio::test]
async fn start_timer_requires_signed_in_user() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = engine_with(&store, &clock);

    let result = engine.start_timer(60, false).await;
    assert!(matches!(result, Err(CoreError::NotAuthenticated)));
    assert_eq!(store.calls(StoreOp::CreateActive), 0);
    assert_eq!(*engine.phase(), SessionPhase::Idle);
}

#[tokio::test]
async fn zero_duration_is_rejected_before_any_store_call() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;

    let result = engine.start_timer(0, false).await;
    assert!(matches!(
        result,
        Err(CoreError::Validation(ValidationError::NonPositiveDuration { .. }))
    ));
    assert_eq!(store.calls(StoreOp::DeleteActiveForUser), 0);
    assert_eq!(store.calls(StoreOp::CreateActive), 0);
}

#[tokio::test]
async fn tick_counts_down_and_mirrors_remaining_time() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(3, false).await.unwrap();

    clock.advance_secs(1);
    assert!(engine.tick().await.is_none());
    assert_eq!(engine.remaining_time(), 2);
    assert_eq!(store.active_rows(USER)[0].fields.current_time, 2);
    assert_eq!(engine.accumulated_time(), 1);

    let events = run_secs(&mut engine, &clock, 2).await;
    assert_eq!(events.len(), 1);
    match &events[0] {
        Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs,
            record,
            streak,
            ..
        } => {
            assert!(!interrupted);
            assert_eq!(*total_secs, 3);
            assert_eq!(*break_secs, 0);
            assert!(record.is_some());
            assert!(matches!(streak, Some(StreakChange::Create(_))));
        }
        other => panic!("unexpected event: {other:?}"),
    }

    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(store.active_rows(USER).is_empty());
    let completed = store.completed_rows(USER);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].fields.start_time, t0());
    assert_eq!(completed[0].fields.end_time, t0() + Duration::seconds(3));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn countdown_steps_by_one_and_ends_once(initial in 1u64..90, overrun in 0u64..5) {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let (completions, totals, rows) = rt.block_on(async {
            let store = MemoryStore::new();
            let clock = ManualClock::new(t0());
            let mut engine = signed_in(&store, &clock).await;
            engine.start_timer(initial, false).await.unwrap();

            let mut completions = 0;
            let mut totals = Vec::new();
            for elapsed in 1..=initial + overrun {
                clock.advance_secs(1);
                let event = engine.tick().await;
                if elapsed < initial {
                    assert!(event.is_none());
                    assert_eq!(engine.remaining_time(), initial - elapsed);
                    assert_eq!(
                        store.active_rows(USER)[0].fields.current_time,
                        initial - elapsed
                    );
                } else {
                    assert_eq!(engine.remaining_time(), 0);
                }
                if let Some(Event::SessionCompleted { total_secs, .. }) = event {
                    completions += 1;
                    totals.push(total_secs);
                }
            }
            (completions, totals, store.completed_rows(USER).len())
        });
        prop_assert_eq!(completions, 1);
        prop_assert_eq!(totals, vec![initial]);
        prop_assert_eq!(rows, 1);
    }
}

#[tokio::test]
async fn paused_timer_does_not_tick() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(100, false).await.unwrap();
    run_secs(&mut engine, &clock, 10).await;

    let paused = engine.pause_timer().await.unwrap();
    assert!(matches!(
        paused,
        Some(Event::TimerPaused {
            remaining_secs: 90,
            ..
        })
    ));
    assert!(!engine.is_ticking());
    assert!(!store.active_rows(USER)[0].fields.is_running);

    assert!(run_secs(&mut engine, &clock, 5).await.is_empty());
    assert_eq!(engine.remaining_time(), 90);

    // Pausing twice is a no-op.
    assert!(engine.pause_timer().await.unwrap().is_none());

    let resumed = engine.resume_timer().await.unwrap();
    assert!(matches!(
        resumed,
        Some(Event::TimerResumed {
            remaining_secs: 90,
            ..
        })
    ));
    run_secs(&mut engine, &clock, 1).await;
    assert_eq!(engine.remaining_time(), 89);
}

#[tokio::test]
async fn pause_and_exit_without_session_are_noops() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;

    assert!(engine.pause_timer().await.unwrap().is_none());
    assert!(engine.resume_timer().await.unwrap().is_none());
    assert!(engine.exit().await.unwrap().is_none());
    assert!(engine.tick().await.is_none());
    assert!(store.completed_rows(USER).is_empty());
}

#[tokio::test]
async fn add_time_restarts_with_extended_total() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(60, false).await.unwrap();
    run_secs(&mut engine, &clock, 1).await;
    let first_id = engine.active_session_id().map(str::to_string);

    let event = engine.add_time(30).await.unwrap();
    assert!(matches!(
        event,
        Some(Event::TimeAdded {
            added_secs: 30,
            remaining_secs: 89,
            ..
        })
    ));
    assert_eq!(engine.remaining_time(), 89);
    assert!(engine.is_running());
    assert_ne!(engine.active_session_id().map(str::to_string), first_id);
    assert_eq!(store.active_rows(USER).len(), 1);

    // From idle it simply starts a timer.
    engine.exit().await.unwrap();
    engine.add_time(45).await.unwrap();
    assert_eq!(engine.remaining_time(), 45);
}

// =============================================================================
// Breaks
// =============================================================================

#[tokio::test]
async fn break_round_trip_restores_study_time() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(1500, false).await.unwrap();
    run_secs(&mut engine, &clock, 5).await;

    let started = engine.start_break().await.unwrap();
    assert!(matches!(
        started,
        Some(Event::BreakStarted {
            duration_secs: 300,
            stored_study_secs: 1495,
            ..
        })
    ));
    assert!(engine.is_break());
    assert_eq!(engine.stored_study_time(), Some(1495));
    let rows = store.active_rows(USER);
    assert_eq!(rows.len(), 1);
    assert!(rows[0].fields.is_break);
    assert_eq!(rows[0].fields.stored_study_time, Some(1495));

    let events = run_secs(&mut engine, &clock, 300).await;
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        Event::BreakEnded {
            break_secs: 300,
            resumed_secs: Some(1495),
            ..
        }
    ));

    assert!(matches!(engine.phase(), SessionPhase::Studying { .. }));
    assert_eq!(engine.remaining_time(), 1495);
    assert!(engine.is_running());
    assert_eq!(engine.break_time(), 300);
    let rows = store.active_rows(USER);
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].fields.is_break);
    assert_eq!(rows[0].fields.break_time, 300);
    assert_eq!(rows[0].fields.run_start_time, t0());

    run_secs(&mut engine, &clock, 20).await;
    let ended = engine.exit().await.unwrap();
    match ended {
        Some(Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs,
            ..
        }) => {
            assert!(interrupted);
            assert_eq!(break_secs, 300);
            assert_eq!(total_secs, 25);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let completed = store.completed_rows(USER);
    assert_eq!(completed[0].fields.start_time, t0());
    assert_eq!(completed[0].fields.break_seconds, 300);
}

#[tokio::test]
async fn start_break_rejected_outside_running_study() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;

    assert!(matches!(
        engine.start_break().await,
        Err(CoreError::Validation(ValidationError::InvalidTransition { phase: "idle", .. }))
    ));

    engine.start_timer(100, false).await.unwrap();
    engine.pause_timer().await.unwrap();
    assert!(matches!(
        engine.start_break().await,
        Err(CoreError::Validation(ValidationError::InvalidTransition { phase: "paused", .. }))
    ));

    engine.resume_timer().await.unwrap();
    engine.start_break().await.unwrap();
    assert!(engine.start_break().await.is_err());
    assert!(engine.add_time(10).await.is_err());

    engine
        .start_pomodoro(PomodoroSettings::default())
        .await
        .unwrap();
    assert!(engine.start_break().await.is_err());
}

#[tokio::test]
async fn break_end_survives_store_failures() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(1000, false).await.unwrap();
    engine.start_break().await.unwrap();
    clock.advance_secs(60);

    store.fail_on(StoreOp::UpdateActive);
    store.fail_on(StoreOp::DeleteActive);
    let event = engine.handle_break_end().await.unwrap();
    assert!(matches!(
        event,
        Some(Event::BreakEnded {
            break_secs: 60,
            resumed_secs: Some(1000),
            ..
        })
    ));
    assert!(matches!(engine.phase(), SessionPhase::Studying { .. }));
    assert_eq!(engine.remaining_time(), 1000);

    // The break row could not be deleted; the restored row is the newer one
    // and wins the next recovery.
    let restored = engine.active_session_id().unwrap().to_string();
    assert_eq!(store.active_rows(USER).len(), 2);
    store.clear_failures();
    let mut reloaded = engine_with(&store, &clock);
    assert!(matches!(
        reloaded.load(USER).await,
        Some(Event::SessionRecovered { discarded: 1, .. })
    ));
    assert_eq!(reloaded.active_session_id(), Some(restored.as_str()));
    assert!(!reloaded.is_break());
}

#[tokio::test]
async fn exit_during_study_break_counts_both_sides() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(1000, false).await.unwrap();
    run_secs(&mut engine, &clock, 100).await;
    engine.start_break().await.unwrap();
    run_secs(&mut engine, &clock, 40).await;
    assert_eq!(engine.stored_study_time(), Some(900));

    match engine.exit().await.unwrap() {
        Some(Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs,
            streak,
            ..
        }) => {
            assert!(interrupted);
            assert_eq!(total_secs, 100);
            assert_eq!(break_secs, 40);
            assert!(streak.is_some());
        }
        other => panic!("unexpected event: {other:?}"),
    }
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(store.active_rows(USER).is_empty());
    let completed = store.completed_rows(USER);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].fields.start_time, t0());
    assert_eq!(completed[0].fields.break_seconds, 40);
}

#[tokio::test]
async fn standalone_break_ends_idle_without_record_or_streak() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(5, true).await.unwrap();
    assert!(engine.is_break());
    assert_eq!(engine.stored_study_time(), None);

    let events = run_secs(&mut engine, &clock, 5).await;
    assert!(matches!(
        events.as_slice(),
        [Event::BreakEnded {
            resumed_secs: None,
            ..
        }]
    ));
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(store.completed_rows(USER).is_empty());
    assert!(store.streak(USER).is_none());

    // Exiting one writes an interrupted record but still skips the streak.
    engine.start_timer(5, true).await.unwrap();
    let ended = engine.exit().await.unwrap();
    assert!(matches!(
        ended,
        Some(Event::SessionCompleted { streak: None, .. })
    ));
    assert_eq!(store.completed_rows(USER).len(), 1);
    assert!(store.streak(USER).is_none());
}

// =============================================================================
// Pomodoro
// =============================================================================

#[tokio::test]
async fn pomodoro_runs_every_step_then_completes() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.select_topic(Some(TopicRef::new(TOPIC)));

    let settings = PomodoroSettings::default();
    let expected = [1500, 300, 1500, 300, 1500, 300, 1500, 900];
    assert_eq!(settings.sequence(), expected);

    engine.start_pomodoro(settings).await.unwrap();
    let status = engine.pomodoro_status().unwrap();
    assert_eq!(status.cycle, 1);
    assert!(status.is_study);

    let mut advanced = Vec::new();
    let mut completed = None;
    for (index, duration) in expected.iter().enumerate() {
        assert_eq!(engine.pomodoro_cycle(), index as u32);
        assert_eq!(engine.initial_time(), *duration);
        assert!(!engine.is_break());
        for event in run_secs(&mut engine, &clock, *duration).await {
            match event {
                Event::PomodoroAdvanced { step, .. } => advanced.push(step),
                Event::SessionCompleted { .. } => completed = Some(event),
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    assert_eq!(
        advanced,
        vec![
            CycleStep::ShortBreak,
            CycleStep::Study,
            CycleStep::ShortBreak,
            CycleStep::Study,
            CycleStep::ShortBreak,
            CycleStep::Study,
            CycleStep::LongBreak,
        ]
    );
    match completed {
        Some(Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs,
            record,
            ..
        }) => {
            assert!(!interrupted);
            assert_eq!(break_secs, 1800);
            assert_eq!(total_secs, 6000);
            assert_eq!(record.unwrap().fields.topic_id.as_deref(), Some(TOPIC));
        }
        other => panic!("expected completion, got {other:?}"),
    }
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert_eq!(store.completed_rows(USER).len(), 1);
    assert!(store.active_rows(USER).is_empty());
}

#[tokio::test]
async fn exit_during_pomodoro_break_counts_break_time() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    let settings = PomodoroSettings {
        study_duration: 10,
        short_break_duration: 5,
        long_break_duration: 8,
        cycles: 2,
        long_break_interval: 2,
    };
    engine.start_pomodoro(settings).await.unwrap();
    run_secs(&mut engine, &clock, 10).await;
    assert_eq!(engine.pomodoro_cycle(), 1);
    run_secs(&mut engine, &clock, 3).await;

    match engine.exit().await.unwrap() {
        Some(Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs,
            ..
        }) => {
            assert!(interrupted);
            assert_eq!(break_secs, 3);
            assert_eq!(total_secs, 10);
        }
        other => panic!("unexpected event: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_pomodoro_settings_are_rejected() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    let settings = PomodoroSettings {
        cycles: 0,
        ..PomodoroSettings::default()
    };
    assert!(matches!(
        engine.start_pomodoro(settings).await,
        Err(CoreError::Validation(_))
    ));
    assert_eq!(store.calls(StoreOp::CreateActive), 0);
}

// =============================================================================
// Session end and streaks
// =============================================================================

#[tokio::test]
async fn streak_follows_consecutive_days() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;

    engine.start_timer(10, false).await.unwrap();
    run_secs(&mut engine, &clock, 10).await;
    engine.start_timer(10, false).await.unwrap();
    let ended = engine.exit().await.unwrap();
    assert!(matches!(
        ended,
        Some(Event::SessionCompleted {
            streak: Some(StreakChange::Unchanged),
            ..
        })
    ));

    clock.advance(Duration::days(1));
    engine.start_timer(10, false).await.unwrap();
    engine.exit().await.unwrap();
    assert_eq!(
        store.streak(USER),
        Some(StreakRecord {
            current_streak: 2,
            longest_streak: 2,
            last_study_date: (t0() + Duration::days(1)).date_naive(),
        })
    );

    clock.advance(Duration::days(3));
    engine.start_timer(10, false).await.unwrap();
    engine.exit().await.unwrap();
    let streak = store.streak(USER).unwrap();
    assert_eq!(streak.current_streak, 1);
    assert_eq!(streak.longest_streak, 2);
}

#[tokio::test]
async fn failed_summary_write_still_ends_session() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(2, false).await.unwrap();
    store.fail_on(StoreOp::CreateCompleted);
    store.fail_on(StoreOp::StreakGet);

    let events = run_secs(&mut engine, &clock, 2).await;
    assert!(matches!(
        events.as_slice(),
        [Event::SessionCompleted {
            record: None,
            streak: None,
            ..
        }]
    ));
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(store.active_rows(USER).is_empty());
}

fn expect_interrupted(event: Option<Event>, total: u64, brk: u64) {
    match event {
        Some(Event::SessionCompleted {
            interrupted,
            total_secs,
            break_secs,
            record,
            streak,
            ..
        }) => {
            assert!(interrupted);
            assert_eq!(total_secs, total);
            assert_eq!(break_secs, brk);
            assert!(record.is_some());
            assert!(streak.is_some());
        }
        other => panic!("expected an interrupted completion, got {other:?}"),
    }
}

#[tokio::test]
async fn failed_break_insert_closes_the_study_run() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(1000, false).await.unwrap();
    run_secs(&mut engine, &clock, 600).await;
    store.fail_on(StoreOp::CreateActive);

    let event = engine.start_break().await.unwrap();
    expect_interrupted(event, 600, 0);
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(store.active_rows(USER).is_empty());
    assert_eq!(store.completed_rows(USER).len(), 1);
    assert_eq!(store.streak(USER).unwrap().current_streak, 1);
}

#[tokio::test]
async fn failed_restore_after_break_closes_the_run() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(1000, false).await.unwrap();
    run_secs(&mut engine, &clock, 100).await;
    engine.start_break().await.unwrap();
    clock.advance_secs(60);
    store.fail_on(StoreOp::CreateActive);

    let event = engine.handle_break_end().await.unwrap();
    expect_interrupted(event, 100, 60);
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(store.active_rows(USER).is_empty());
    let completed = store.completed_rows(USER);
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].fields.break_seconds, 60);
}

#[tokio::test]
async fn failed_pomodoro_step_insert_closes_the_run() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    let settings = PomodoroSettings {
        study_duration: 10,
        short_break_duration: 5,
        long_break_duration: 8,
        cycles: 2,
        long_break_interval: 2,
    };
    engine.start_pomodoro(settings).await.unwrap();
    run_secs(&mut engine, &clock, 9).await;
    let study_row = engine.active_session_id().unwrap().to_string();
    store.fail_on(StoreOp::CreateActive);

    let events = run_secs(&mut engine, &clock, 1).await;
    assert_eq!(events.len(), 1);
    expect_interrupted(events.into_iter().next(), 10, 0);
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(!engine.is_ticking());
    assert!(store.active_rows(USER).iter().all(|r| r.id != study_row));
    assert_eq!(store.completed_rows(USER).len(), 1);
}

#[tokio::test]
async fn failed_active_insert_leaves_engine_idle() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    store.fail_on(StoreOp::CreateActive);

    let result = engine.start_timer(60, false).await;
    assert!(matches!(
        result,
        Err(CoreError::Store(StoreError::Injected("create_active")))
    ));
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert!(!engine.is_ticking());
}

// =============================================================================
// Topics
// =============================================================================

#[tokio::test]
async fn malformed_topic_id_is_rejected_before_store_calls() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.select_topic(Some(TopicRef::new("algebra")));

    let result = engine.start_timer(60, false).await;
    assert!(matches!(
        result,
        Err(CoreError::Validation(ValidationError::InvalidTopicId(ref id))) if id == "algebra"
    ));
    assert_eq!(store.calls(StoreOp::DeleteActiveForUser), 0);
    assert_eq!(store.calls(StoreOp::CreateActive), 0);

    engine.select_topic(Some(TopicRef::new(TOPIC)));
    engine.start_timer(60, false).await.unwrap();
    assert_eq!(
        store.active_rows(USER)[0].fields.topic_id.as_deref(),
        Some(TOPIC)
    );
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn load_keeps_newest_row_and_discards_duplicates() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0() + Duration::minutes(10));
    store.seed_active(active_row("old", t0() + Duration::minutes(1), 1400));
    store.seed_active(active_row("newest", t0() + Duration::minutes(5), 1200));
    store.seed_active(active_row("middle", t0() + Duration::minutes(3), 1300));

    let mut engine = engine_with(&store, &clock);
    let event = engine.load(USER).await;
    assert!(matches!(
        event,
        Some(Event::SessionRecovered { discarded: 2, .. })
    ));
    assert_eq!(engine.user_id(), Some(USER));
    assert_eq!(engine.active_session_id(), Some("newest"));
    assert_eq!(engine.remaining_time(), 1200);
    assert!(engine.is_ticking());

    let rows = store.active_rows(USER);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].id, "newest");

    // The recovered countdown keeps going from where the row left off.
    run_secs(&mut engine, &clock, 1).await;
    assert_eq!(store.active_rows(USER)[0].fields.current_time, 1199);
}

#[tokio::test]
async fn load_rehydrates_break_phase() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut row = active_row("brk", t0(), 120);
    row.fields.is_break = true;
    row.fields.stored_study_time = Some(900);
    row.fields.break_time = 40;
    row.fields.is_running = false;
    store.seed_active(row);

    let mut engine = engine_with(&store, &clock);
    engine.load(USER).await.unwrap();
    assert!(engine.is_break());
    assert_eq!(engine.stored_study_time(), Some(900));
    assert_eq!(engine.break_time(), 40);
    assert!(!engine.is_ticking());

    engine.resume_timer().await.unwrap();
    clock.advance_secs(30);
    engine.handle_break_end().await.unwrap();
    assert_eq!(engine.remaining_time(), 900);
    assert_eq!(engine.break_time(), 70);
}

#[tokio::test]
async fn load_clears_remote_state_when_listing_fails() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    store.seed_active(active_row("stale", t0(), 100));
    store.fail_on(StoreOp::ListActive);

    let mut engine = engine_with(&store, &clock);
    assert!(engine.load(USER).await.is_none());
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert_eq!(store.calls(StoreOp::DeleteActiveForUser), 1);
    assert!(store.active_rows(USER).is_empty());

    // Still signed in.
    store.clear_failures();
    engine.start_timer(30, false).await.unwrap();
}

#[tokio::test]
async fn load_without_rows_clears_selected_topic() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.select_topic(Some(TopicRef::new(TOPIC)));

    assert!(engine.load(USER).await.is_none());
    assert!(engine.selected_topic().is_none());

    engine.select_topic(Some(TopicRef::new(TOPIC)));
    store.fail_on(StoreOp::ListActive);
    assert!(engine.load(USER).await.is_none());
    assert!(engine.selected_topic().is_none());
}

#[tokio::test]
async fn sign_out_forgets_local_session_only() {
    let store = MemoryStore::new();
    let clock = ManualClock::new(t0());
    let mut engine = signed_in(&store, &clock).await;
    engine.start_timer(30, false).await.unwrap();

    engine.sign_out();
    assert_eq!(engine.user_id(), None);
    assert_eq!(*engine.phase(), SessionPhase::Idle);
    assert_eq!(store.active_rows(USER).len(), 1);
}
