//! Core error types for studytrack-core.
//!
//! Validation failures are raised before any state mutation or remote call.
//! Store failures are mostly logged and absorbed by the engine; they only
//! surface from operations whose contract is "the remote write must succeed"
//! (creating a new active session).

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for studytrack-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Session store or streak tracker failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Rejected input or transition
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// No user is signed in to the engine
    #[error("Not authenticated: sign in before starting a session")]
    NotAuthenticated,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised by [`SessionStore`](crate::storage::SessionStore) and
/// [`StreakTracker`](crate::storage::StreakTracker) implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Malformed backend URL
    #[error("Invalid backend URL: {0}")]
    Url(#[from] url::ParseError),

    /// Row did not exist
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Stored data could not be decoded
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// Failure injected by a test double
    #[error("Injected failure in {0}")]
    Injected(&'static str),

    /// A store mutex was poisoned by a panicking holder
    #[error("Store lock poisoned")]
    Poisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown dot-path key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Missing required configuration key
    #[error("Missing required configuration key: {0}")]
    MissingKey(String),

    /// Home directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Validation errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    /// Durations are whole seconds and must be positive
    #[error("Duration for '{field}' must be greater than zero")]
    NonPositiveDuration { field: &'static str },

    /// Topic identifiers are UUIDs
    #[error("Invalid topic id '{0}': expected a UUID")]
    InvalidTopicId(String),

    /// Operation not allowed in the current session phase
    #[error("Cannot {op} while {phase}")]
    InvalidTransition { op: &'static str, phase: &'static str },

    /// Clock-style duration input could not be parsed
    #[error("Invalid duration '{0}': expected S, M:SS or H:MM:SS")]
    InvalidDuration(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::Poisoned
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;
