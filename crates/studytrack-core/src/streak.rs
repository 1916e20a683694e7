//! Consecutive-day study streaks.
//!
//! A streak counts UTC calendar days with at least one completed study
//! session. The rule itself is the pure [`next_streak`]; [`update_streak`]
//! applies it against a [`StreakTracker`].

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;
use crate::storage::{StreakRecord, StreakTracker};

/// What a completed session does to the stored streak.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreakChange {
    /// First session ever.
    Create(StreakRecord),
    Update(StreakRecord),
    /// Already studied today.
    Unchanged,
}

pub fn next_streak(existing: Option<&StreakRecord>, today: NaiveDate) -> StreakChange {
    let Some(record) = existing else {
        return StreakChange::Create(StreakRecord {
            current_streak: 1,
            longest_streak: 1,
            last_study_date: today,
        });
    };

    if record.last_study_date == today {
        return StreakChange::Unchanged;
    }

    if record.last_study_date == today - Duration::days(1) {
        let current = record.current_streak.saturating_add(1);
        return StreakChange::Update(StreakRecord {
            current_streak: current,
            longest_streak: record.longest_streak.max(current),
            last_study_date: today,
        });
    }

    // Gap of two or more days, or a last date in the future: start over.
    StreakChange::Update(StreakRecord {
        current_streak: 1,
        longest_streak: record.longest_streak.max(1),
        last_study_date: today,
    })
}

/// Read the user's streak, apply [`next_streak`] and write the result back.
pub async fn update_streak<T>(tracker: &T, user_id: &str, today: NaiveDate) -> StoreResult<StreakChange>
where
    T: StreakTracker + ?Sized,
{
    let existing = tracker.get(user_id).await?;
    let change = next_streak(existing.as_ref(), today);
    match &change {
        StreakChange::Create(record) => tracker.create(user_id, record).await?,
        StreakChange::Update(record) => tracker.update(user_id, record).await?,
        StreakChange::Unchanged => {}
    }
    Ok(change)
}
