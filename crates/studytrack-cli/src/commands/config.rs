use std::path::Path;

use clap::Subcommand;
use studytrack_core::{Config, ConfigError};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a config value
    Get {
        /// Config key (e.g. "user_id", "pomodoro.cycles")
        key: String,
    },
    /// Set a config value
    Set {
        /// Config key
        key: String,
        /// New value
        value: String,
    },
    /// List all config values
    List,
    /// Reset config to defaults
    Reset,
    /// Print the config file location
    Path,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let path = Config::default_path()?;
    println!("{}", run_at(action, &path)?);
    Ok(())
}

/// Apply `action` to the config file at `path` and return what to print.
fn run_at(action: ConfigAction, path: &Path) -> Result<String, ConfigError> {
    match action {
        ConfigAction::Get { key } => Config::load_from(path)?
            .get(&key)
            .ok_or(ConfigError::UnknownKey(key)),
        ConfigAction::Set { key, value } => {
            let mut config = Config::load_from(path)?;
            config.set_value(&key, &value)?;
            config.save_to(path)?;
            Ok(format!("{key} = {}", config.get(&key).unwrap_or(value)))
        }
        ConfigAction::List => {
            let config = Config::load_from(path)?;
            let body = toml::to_string_pretty(&config).map_err(|e| ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
            Ok(format!("# {}\n{}", path.display(), body.trim_end()))
        }
        ConfigAction::Reset => {
            Config::default().save_to(path)?;
            Ok(format!("reset {} to defaults", path.display()))
        }
        ConfigAction::Path => Ok(path.display().to_string()),
    }
}
