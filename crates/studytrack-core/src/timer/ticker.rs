//! The once-per-second tick as a cancellable background task.
//!
//! The task locks the shared engine for the whole of each tick, so a tick's
//! store update always completes before the next decrement and user
//! commands never interleave with a tick. The task stops itself as soon as
//! the engine is paused or idle; [`SessionController`] respawns it after any
//! command that leaves the engine ticking again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

use super::engine::SessionEngine;
use super::pomodoro::PomodoroSettings;
use super::state::{SessionSnapshot, TopicRef};
use crate::error::Result;
use crate::events::Event;

pub type SharedEngine = Arc<Mutex<SessionEngine>>;

pub struct Ticker {
    period: Duration,
    /// Cleared by `cancel`, or by the task itself on exit. Only read or
    /// cleared by the task while it holds the engine lock.
    live: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            live: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Start a fresh task. A previous task is told to stop and exits at its
    /// next interval without ticking.
    pub fn spawn(&mut self, engine: SharedEngine, events: Option<mpsc::UnboundedSender<Event>>) {
        self.cancel();

        let live = Arc::new(AtomicBool::new(true));
        self.live = live.clone();
        let period = self.period;

        self.handle = Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of an interval completes immediately.
            interval.tick().await;
            loop {
                interval.tick().await;

                let event = {
                    let mut guard = engine.lock().await;
                    if !live.load(Ordering::SeqCst) || !guard.is_ticking() {
                        live.store(false, Ordering::SeqCst);
                        break;
                    }
                    guard.tick().await
                };

                if let (Some(tx), Some(event)) = (&events, event) {
                    // Receiver gone just means nobody is listening.
                    let _ = tx.send(event);
                }
            }
            debug!("ticker stopped");
        }));
    }

    pub fn cancel(&mut self) {
        self.live.store(false, Ordering::SeqCst);
    }

    /// Cancel and wait for the task to wind down.
    pub async fn shutdown(&mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A [`SessionEngine`] plus the ticker that drives it.
///
/// Commands run to completion under the engine lock, then the ticker is
/// re-synced with the engine's running state.
pub struct SessionController {
    engine: SharedEngine,
    ticker: Ticker,
    events: Option<mpsc::UnboundedSender<Event>>,
}

impl SessionController {
    pub fn new(engine: SessionEngine, tick_period: Duration) -> Self {
        Self {
            engine: Arc::new(Mutex::new(engine)),
            ticker: Ticker::new(tick_period),
            events: None,
        }
    }

    pub fn engine(&self) -> SharedEngine {
        self.engine.clone()
    }

    /// Receive events produced by ticks (countdown completions).
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events = Some(tx);
        rx
    }

    pub async fn load(&mut self, user_id: &str) -> Option<Event> {
        let event = self.engine.lock().await.load(user_id).await;
        self.sync_ticker().await;
        event
    }

    pub async fn select_topic(&self, topic: Option<TopicRef>) {
        self.engine.lock().await.select_topic(topic);
    }

    pub async fn start_timer(&mut self, secs: u64, is_break: bool) -> Result<Option<Event>> {
        let result = self.engine.lock().await.start_timer(secs, is_break).await;
        self.sync_ticker().await;
        result
    }

    pub async fn pause_timer(&mut self) -> Result<Option<Event>> {
        let result = self.engine.lock().await.pause_timer().await;
        self.sync_ticker().await;
        result
    }

    pub async fn resume_timer(&mut self) -> Result<Option<Event>> {
        let result = self.engine.lock().await.resume_timer().await;
        self.sync_ticker().await;
        result
    }

    pub async fn add_time(&mut self, secs: u64) -> Result<Option<Event>> {
        let result = self.engine.lock().await.add_time(secs).await;
        self.sync_ticker().await;
        result
    }

    pub async fn start_break(&mut self) -> Result<Option<Event>> {
        let result = self.engine.lock().await.start_break().await;
        self.sync_ticker().await;
        result
    }

    pub async fn end_break(&mut self) -> Result<Option<Event>> {
        let result = self.engine.lock().await.handle_break_end().await;
        self.sync_ticker().await;
        result
    }

    pub async fn start_pomodoro(&mut self, settings: PomodoroSettings) -> Result<Option<Event>> {
        let result = self.engine.lock().await.start_pomodoro(settings).await;
        self.sync_ticker().await;
        result
    }

    pub async fn exit(&mut self) -> Result<Option<Event>> {
        let result = self.engine.lock().await.exit().await;
        self.sync_ticker().await;
        result
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        self.engine.lock().await.snapshot()
    }

    pub async fn is_ticking(&self) -> bool {
        self.engine.lock().await.is_ticking()
    }

    /// Spawn the ticker if the engine is ticking and no live task exists;
    /// stop it otherwise.
    pub async fn sync_ticker(&mut self) {
        let ticking = self.engine.lock().await.is_ticking();
        if !ticking {
            self.ticker.cancel();
        } else if !self.ticker.is_live() {
            self.ticker.spawn(self.engine.clone(), self.events.clone());
        }
    }

    pub async fn shutdown(&mut self) {
        self.ticker.shutdown().await;
    }
}
