//! Date parsing for offer expirations and sheet date cells.
//!
//! Accepted absolute forms: `Dec 31, 2025`, `December 31, 2025`, `Dec 31 25`,
//! `12/31/2025`, `12/31/25`, `2025-12-31`. Two-digit years are 20xx.
//! Relative forms (`Expires in 12 days`, `12 days left`) resolve against
//! the caller's `today`.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use regex::Regex;

/// Format written to the sheet, e.g. `Dec 31, 2025`.
pub const SHEET_DATE_FORMAT: &str = "%b %d, %Y";

static NUMERIC: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})$").expect("valid regex")
});

static ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\d{2})-(\d{2})$").expect("valid regex"));

static NAMED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s*(\d{4}|\d{2})$")
        .expect("valid regex")
});

static EXPIRES_ON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:offer\s+)?exp(?:ires?|iration(?:\s+date)?|\.)?(?:\s+on)?\s*:?\s*([A-Za-z]{3,9}\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s*\d{2,4}|\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})",
    )
    .expect("valid regex")
});

static EXPIRES_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)\b(?:exp(?:ires?|\.)?|ends?)\s+in\s+(\d{1,3})\s+days?\b|\b(\d{1,3})\s+days?\s+(?:left|remaining)\b|^\s*(\d{1,3})\s+days?\s*$",
    )
    .expect("valid regex")
});

static ANY_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"([A-Za-z]{3,9}\.?\s+\d{1,2}(?:st|nd|rd|th)?,?\s*\d{2,4}|\d{1,2}/\d{1,2}/\d{2,4}|\d{4}-\d{2}-\d{2})",
    )
    .expect("valid regex")
});

/// Parse one absolute date in any accepted form.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim().trim_end_matches(['.', ',', ';', ')']).trim();

    if let Some(caps) = NUMERIC.captures(s) {
        let month: u32 = caps[1].parse().ok()?;
        let day: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = ISO.captures(s) {
        let year: i32 = caps[1].parse().ok()?;
        let month: u32 = caps[2].parse().ok()?;
        let day: u32 = caps[3].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    if let Some(caps) = NAMED.captures(s) {
        let month = month_from_name(&caps[1])?;
        let day: u32 = caps[2].parse().ok()?;
        let year = expand_year(&caps[3])?;
        return NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}

fn expand_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    Some(if s.len() == 2 { 2000 + year } else { year })
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Full month name or an abbreviation of at least three letters ("Sep",
/// "Sept"). A trailing period is allowed.
fn month_from_name(name: &str) -> Option<u32> {
    let lower = name.trim_end_matches('.').to_ascii_lowercase();
    if lower.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|full| full.starts_with(&lower))
        .map(|i| i as u32 + 1)
}

/// Find an expiration date inside free text.
///
/// Looks for an "expires/exp" phrase with an absolute date first, then a
/// relative "in N days" phrase.
pub fn find_expiration(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(date) = EXPIRES_ON
        .captures_iter(text)
        .find_map(|caps| caps.get(1).and_then(|m| parse_date(m.as_str())))
    {
        return Some(date);
    }

    relative_expiration(text, today)
}

/// Parse a dedicated expiration element ("Expires 12/31/25", "Dec 31, 2025",
/// "3 days left").
pub fn parse_expiration_field(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    if let Some(date) = parse_date(text) {
        return Some(date);
    }
    if let Some(date) = find_expiration(text, today) {
        return Some(date);
    }
    ANY_DATE
        .captures_iter(text)
        .find_map(|caps| caps.get(1).and_then(|m| parse_date(m.as_str())))
}

fn relative_expiration(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let caps = EXPIRES_IN.captures(text)?;
    let days: u64 = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .and_then(|m| m.as_str().parse().ok())?;
    today.checked_add_days(Days::new(days))
}

/// Render a date the way the sheet stores it.
pub fn format_sheet_date(date: NaiveDate) -> String {
    date.format(SHEET_DATE_FORMAT).to_string()
}
