use serde_json::json;
use studytrack_core::{Config, StreakTracker};

use super::{print_json, Backend};

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let user_id = config.require_user_id()?;
    let backend = Backend::open(&config)?;

    let streak = backend.streaks().get(user_id).await?;
    print_json(&json!({
        "user_id": user_id,
        "current_streak": streak.as_ref().map(|s| s.current_streak).unwrap_or(0),
        "longest_streak": streak.as_ref().map(|s| s.longest_streak).unwrap_or(0),
        "last_study_date": streak.as_ref().map(|s| s.last_study_date),
    }))
}
