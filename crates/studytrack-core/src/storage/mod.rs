mod config;
pub mod database;
pub mod memory;
pub mod records;
pub mod rest;
pub mod traits;

pub use config::{Config, StoreBackend, StoreConfig, TimerConfig};
pub use database::Database;
pub use memory::{MemoryStore, StoreOp};
pub use records::{
    ActiveSessionPatch, ActiveSessionRecord, CompletedSessionRecord, NewActiveSession,
    NewCompletedSession, SessionTotals, StreakRecord,
};
pub use rest::RestStore;
pub use traits::{SessionStore, StreakTracker};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/studytrack[-dev]/` based on STUDYTRACK_ENV.
///
/// Set STUDYTRACK_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STUDYTRACK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("studytrack-dev")
    } else {
        base_dir.join("studytrack")
    };

    std::fs::create_dir_all(&dir)
        .map_err(|e| ConfigError::DataDir(format!("{}: {e}", dir.display())))?;
    Ok(dir)
}
