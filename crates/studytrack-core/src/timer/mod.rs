mod clock;
mod engine;
mod format;
mod pomodoro;
mod state;
mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{EngineSettings, SessionEngine};
pub use format::{format_clock, parse_clock};
pub use pomodoro::{CycleStep, PomodoroSettings, PomodoroStatus};
pub use state::{Countdown, RunLedger, SessionPhase, SessionSnapshot, TopicRef};
pub use ticker::{SessionController, SharedEngine, Ticker};
