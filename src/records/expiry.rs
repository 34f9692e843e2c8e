//! Expiry helpers: relative durations ("in 4 hours") to absolute epoch
//! seconds, and epoch seconds back to a display string.

use crate::error::{BotError, Result};
use chrono::{DateTime, Utc};

/// Seconds per supported time unit. Months are 30 days, years 365.
fn unit_secs(unit: &str) -> Option<u64> {
    let secs = match unit.trim().to_ascii_lowercase().as_str() {
        "second" | "seconds" => 1,
        "minute" | "minutes" => 60,
        "hour" | "hours" => 3_600,
        "day" | "days" => 86_400,
        "week" | "weeks" => 604_800,
        "month" | "months" => 2_592_000,
        "year" | "years" => 31_536_000,
        _ => return None,
    };
    Some(secs)
}

/// Compute an absolute expiry `amount` `unit`s after `now`.
///
/// # Errors
///
/// Returns [`BotError::InvalidExpiry`] for an unknown unit, an amount that
/// is not a non-negative integer, or a result that overflows.
pub fn parse_expiry(amount: &str, unit: &str, now: i64) -> Result<i64> {
    let per_unit =
        unit_secs(unit).ok_or_else(|| BotError::InvalidExpiry(format!("unparseable unit: {unit}")))?;
    let amount: u64 = amount
        .trim()
        .parse()
        .map_err(|e| BotError::InvalidExpiry(format!("invalid duration {amount:?}: {e}")))?;

    amount
        .checked_mul(per_unit)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| now.checked_add(secs))
        .ok_or_else(|| BotError::InvalidExpiry(format!("duration too large: {amount} {unit}")))
}

/// Render an expiry as an RFC 1123 style UTC timestamp.
pub fn format_expiry(expiry: i64) -> String {
    match DateTime::<Utc>::from_timestamp(expiry, 0) {
        Some(at) => at.format("%a, %d %b %Y %H:%M:%S UTC").to_string(),
        None => format!("@{expiry}"),
    }
}
