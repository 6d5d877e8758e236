//! Turns the site's relative publish times ("5 hours ago") into absolute
//! timestamps anchored to a caller-supplied instant.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveDate, Timelike};
use regex::Regex;

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Substring match on the unit keyword, so "Hours" and "hour" both parse.
    RE.get_or_init(|| Regex::new(r"(?i)(\d+)\s+(second|minute|hour|day)").unwrap())
}

/// Resolve a relative-time phrase against `now`, at second precision.
/// Anything that does not contain `<n> <unit>` yields `None`.
pub fn parse_relative(text: &str, now: DateTime<Local>) -> Option<DateTime<Local>> {
    let caps = relative_re().captures(text)?;
    let amount: i64 = caps[1].parse().ok()?;
    let delta = match caps[2].to_ascii_lowercase().as_str() {
        "second" => Duration::seconds(amount),
        "minute" => Duration::minutes(amount),
        "hour" => Duration::hours(amount),
        "day" => Duration::days(amount),
        _ => return None,
    };
    let published = now.checked_sub_signed(delta)?;
    Some(published.with_nanosecond(0).unwrap_or(published))
}

/// The default target day for a run: the day before `now`.
pub fn default_target(now: DateTime<Local>) -> NaiveDate {
    (now - Duration::days(1)).date_naive()
}
