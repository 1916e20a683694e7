pub mod completions;
pub mod config;
pub mod history;
pub mod streak;
pub mod timer;

use std::sync::Arc;

use studytrack_core::storage::StoreBackend;
use studytrack_core::{Config, ConfigError, Database, RestStore, SessionStore, StreakTracker};

/// The store selected by `[store] backend`.
pub enum Backend {
    Sqlite(Arc<Database>),
    Rest(Arc<RestStore>),
}

impl Backend {
    pub fn open(config: &Config) -> Result<Self, Box<dyn std::error::Error>> {
        match config.store.backend {
            StoreBackend::Sqlite => Ok(Backend::Sqlite(Arc::new(Database::open()?))),
            StoreBackend::Rest => {
                let url = config
                    .store
                    .rest_url
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingKey("store.rest_url".into()))?;
                let api_key = config
                    .store
                    .api_key
                    .as_deref()
                    .ok_or_else(|| ConfigError::MissingKey("store.api_key".into()))?;
                let mut store = RestStore::new(url, api_key)?;
                if let Some(token) = &config.store.access_token {
                    store = store.with_access_token(token.clone());
                }
                Ok(Backend::Rest(Arc::new(store)))
            }
        }
    }

    pub fn sessions(&self) -> Arc<dyn SessionStore> {
        match self {
            Backend::Sqlite(db) => db.clone() as Arc<dyn SessionStore>,
            Backend::Rest(rest) => rest.clone() as Arc<dyn SessionStore>,
        }
    }

    pub fn streaks(&self) -> Arc<dyn StreakTracker> {
        match self {
            Backend::Sqlite(db) => db.clone() as Arc<dyn StreakTracker>,
            Backend::Rest(rest) => rest.clone() as Arc<dyn StreakTracker>,
        }
    }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
