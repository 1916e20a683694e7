//! `H:MM:SS` display and input handling for durations.

use crate::error::ValidationError;

/// Format whole seconds as `H:MM:SS` with unpadded hours.
pub fn format_clock(secs: u64) -> String {
    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;
    format!("{h}:{m:02}:{s:02}")
}

/// Parse `S`, `M:SS` or `H:MM:SS` into whole seconds.
///
/// Components are not range checked against 59: a seconds or minutes value
/// above 60 carries into the next unit, so `0:90:00` is one and a half hours.
/// The result must be positive.
pub fn parse_clock(input: &str) -> Result<u64, ValidationError> {
    let invalid = || ValidationError::InvalidDuration(input.to_string());

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid());
    }

    let mut parts = trimmed
        .split(':')
        .map(|p| p.trim().parse::<u64>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    if parts.len() > 3 {
        return Err(invalid());
    }
    while parts.len() < 3 {
        parts.insert(0, 0);
    }

    let (mut hours, mut minutes, mut seconds) = (parts[0], parts[1], parts[2]);
    if seconds > 60 {
        minutes = minutes.checked_add(seconds / 60).ok_or_else(invalid)?;
        seconds %= 60;
    }
    if minutes > 60 {
        hours = hours.checked_add(minutes / 60).ok_or_else(invalid)?;
        minutes %= 60;
    }

    let total = hours
        .checked_mul(3600)
        .and_then(|h| h.checked_add(minutes * 60))
        .and_then(|t| t.checked_add(seconds))
        .ok_or_else(invalid)?;
    if total == 0 {
        return Err(ValidationError::NonPositiveDuration { field: "duration" });
    }
    Ok(total)
}
