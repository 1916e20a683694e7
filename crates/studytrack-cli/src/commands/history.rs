use serde_json::json;
use studytrack_core::{format_clock, Config};

use super::{print_json, Backend};

pub async fn run(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let user_id = config.require_user_id()?;

    // Totals are only aggregated locally; the hosted backend returns rows.
    let (sessions, totals) = match Backend::open(&config)? {
        Backend::Sqlite(db) => (
            db.recent_sessions(user_id, limit)?,
            Some(db.completed_totals(user_id)?),
        ),
        Backend::Rest(rest) => (rest.recent_sessions(user_id, limit).await?, None),
    };

    let rows: Vec<_> = sessions
        .iter()
        .map(|s| {
            json!({
                "id": s.id,
                "start_time": s.fields.start_time,
                "end_time": s.fields.end_time,
                "studied": format_clock(s.fields.total_seconds),
                "break": format_clock(s.fields.break_seconds),
                "interrupted": s.fields.interrupted,
                "topic_id": s.fields.topic_id,
            })
        })
        .collect();
    print_json(&json!({ "sessions": rows, "totals": totals }))
}
