use std::time::Duration;

use chrono::Utc;
use clap::Subcommand;
use studytrack_core::{
    format_clock, parse_clock, Config, Event, PomodoroSettings, SessionController, SessionEngine,
    SessionSnapshot, TopicRef,
};
use tokio::time;

use super::{print_json, Backend};

#[derive(Subcommand)]
pub enum TimerAction {
    /// Start a countdown (DURATION as S, M:SS or H:MM:SS)
    Start {
        duration: String,
        /// Topic UUID to attach to the session
        #[arg(long)]
        topic: Option<String>,
        /// Count down a standalone break instead of study time
        #[arg(long = "break")]
        is_break: bool,
    },
    /// Pause the countdown
    Pause,
    /// Resume the countdown
    Resume,
    /// Add time to the study countdown
    Add { duration: String },
    /// Break control
    Break {
        #[command(subcommand)]
        action: BreakAction,
    },
    /// Start a Pomodoro run (defaults from the [pomodoro] config section)
    Pomodoro {
        #[arg(long)]
        study: Option<String>,
        #[arg(long = "short")]
        short_break: Option<String>,
        #[arg(long = "long")]
        long_break: Option<String>,
        #[arg(long)]
        cycles: Option<u32>,
        #[arg(long)]
        topic: Option<String>,
    },
    /// End the session now; it is recorded as interrupted
    Exit,
    /// Print current session state as JSON
    Status,
    /// Run the countdown in the foreground until it stops
    Watch,
}

#[derive(Subcommand)]
pub enum BreakAction {
    /// Set the study session aside for a break
    Start,
    /// End the break and restore the study countdown
    End,
}

async fn load_engine(config: &Config) -> Result<SessionEngine, Box<dyn std::error::Error>> {
    let user_id = config.require_user_id()?;
    let backend = Backend::open(config)?;
    let mut engine = SessionEngine::new(
        backend.sessions(),
        backend.streaks(),
        config.engine_settings(),
    );
    if let Some(event) = engine.load(user_id).await {
        tracing::debug!(?event, "session recovered");
    }
    Ok(engine)
}

fn print_outcome(
    event: Option<Event>,
    engine: &SessionEngine,
) -> Result<(), Box<dyn std::error::Error>> {
    match event {
        Some(event) => print_json(&event),
        None => print_json(&engine.snapshot()),
    }
}

fn pomodoro_settings(
    base: PomodoroSettings,
    study: Option<String>,
    short_break: Option<String>,
    long_break: Option<String>,
    cycles: Option<u32>,
) -> Result<PomodoroSettings, Box<dyn std::error::Error>> {
    let mut settings = base;
    if let Some(study) = study {
        settings.study_duration = parse_clock(&study)?;
    }
    if let Some(short_break) = short_break {
        settings.short_break_duration = parse_clock(&short_break)?;
    }
    if let Some(long_break) = long_break {
        settings.long_break_duration = parse_clock(&long_break)?;
    }
    if let Some(cycles) = cycles {
        settings.cycles = cycles;
    }
    settings.validate()?;
    Ok(settings)
}

fn status_line(snapshot: &SessionSnapshot) -> String {
    let clock = format_clock(snapshot.remaining_time);
    match &snapshot.pomodoro {
        Some(status) => format!("{} {clock}", status.label()),
        None if snapshot.is_break => format!("Break {clock}"),
        None => clock,
    }
}

pub async fn run(action: TimerAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut engine = load_engine(&config).await?;

    match action {
        TimerAction::Start {
            duration,
            topic,
            is_break,
        } => {
            let secs = parse_clock(&duration)?;
            engine.select_topic(topic.map(TopicRef::new));
            let event = engine.start_timer(secs, is_break).await?;
            print_outcome(event, &engine)?;
        }
        TimerAction::Pause => {
            let event = engine.pause_timer().await?;
            print_outcome(event, &engine)?;
        }
        TimerAction::Resume => {
            let event = engine.resume_timer().await?;
            print_outcome(event, &engine)?;
        }
        TimerAction::Add { duration } => {
            let secs = parse_clock(&duration)?;
            let event = engine.add_time(secs).await?;
            print_outcome(event, &engine)?;
        }
        TimerAction::Break { action } => {
            let event = match action {
                BreakAction::Start => engine.start_break().await?,
                BreakAction::End => engine.handle_break_end().await?,
            };
            print_outcome(event, &engine)?;
        }
        TimerAction::Pomodoro {
            study,
            short_break,
            long_break,
            cycles,
            topic,
        } => {
            let settings =
                pomodoro_settings(config.pomodoro, study, short_break, long_break, cycles)?;
            engine.select_topic(topic.map(TopicRef::new));
            let event = engine.start_pomodoro(settings).await?;
            print_outcome(event, &engine)?;
        }
        TimerAction::Exit => {
            let event = engine.exit().await?;
            print_outcome(event, &engine)?;
        }
        TimerAction::Status => {
            print_json(&Event::StateSnapshot {
                snapshot: engine.snapshot(),
                at: Utc::now(),
            })?;
        }
        TimerAction::Watch => watch(engine, config.tick_period()).await?,
    }
    Ok(())
}

async fn watch(engine: SessionEngine, period: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let mut controller = SessionController::new(engine, period);
    let mut events = controller.subscribe();
    controller.sync_ticker().await;

    let mut display = time::interval(period);
    loop {
        tokio::select! {
            Some(event) = events.recv() => print_json(&event)?,
            _ = display.tick() => {
                let snapshot = controller.snapshot().await;
                if !snapshot.is_running {
                    break;
                }
                println!("{}", status_line(&snapshot));
            }
        }
    }

    controller.shutdown().await;
    while let Ok(event) = events.try_recv() {
        print_json(&event)?;
    }
    print_json(&controller.snapshot().await)
}
