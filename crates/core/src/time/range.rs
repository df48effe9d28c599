//! Free-text date ranges ("last 7 days", "this month", "2024-03-01 to 2024-03-10").

use crate::time::calendar::{CalendarZone, DateRange};
use crate::time::week::week_start;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};

/// Days shown when a caller gives no range.
pub const DEFAULT_RANGE_DAYS: u32 = 30;

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn previous_month(date: NaiveDate) -> Option<DateRange> {
    let this_start = month_start(date);
    let last_end = this_start.pred_opt()?;
    Some(DateRange {
        from: month_start(last_end),
        to: last_end,
    })
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_count(words: &[&str], units: &[&str]) -> Option<u32> {
    match words {
        [lead, n, unit] if matches!(*lead, "last" | "past" | "previous") && units.contains(unit) => {
            n.parse().ok().filter(|n| *n > 0)
        }
        _ => None,
    }
}

/// Resolves `text` against `now` in `zone`. Returns `None` for anything unrecognized.
pub fn parse_range(text: &str, now: DateTime<Utc>, zone: &CalendarZone) -> Option<DateRange> {
    let today = zone.today(now);
    let normalized = text.trim().to_ascii_lowercase().replace(['_', '-'], " ");
    let words: Vec<&str> = normalized.split_whitespace().collect();
    let phrase = words.join(" ");

    match phrase.as_str() {
        "today" => return Some(DateRange::single(today)),
        "yesterday" => return Some(DateRange::single(today - Duration::days(1))),
        "this week" | "week to date" | "wtd" => {
            return Some(DateRange {
                from: week_start(today),
                to: today,
            })
        }
        "last week" | "previous week" => {
            let this_monday = week_start(today);
            return Some(DateRange {
                from: this_monday - Duration::days(7),
                to: this_monday - Duration::days(1),
            });
        }
        "this month" | "month to date" | "mtd" => {
            return Some(DateRange {
                from: month_start(today),
                to: today,
            })
        }
        "last month" | "previous month" => return previous_month(today),
        "this year" | "year to date" | "ytd" => {
            return Some(DateRange {
                from: today.with_ordinal(1).unwrap_or(today),
                to: today,
            })
        }
        _ => {}
    }

    if let Some(n) = parse_count(&words, &["days", "day"]) {
        return DateRange::checked_last_days(today, n);
    }
    if let Some(n) = parse_count(&words, &["weeks", "week"]) {
        return DateRange::checked_last_days(today, n.checked_mul(7)?);
    }
    if let Some(n) = parse_count(&words, &["months", "month"]) {
        return DateRange::checked_last_days(today, n.checked_mul(30)?);
    }

    // Explicit dates, split on "to" or "..".
    let raw = text.trim();
    let parts: Vec<&str> = if raw.contains("..") {
        raw.splitn(2, "..").collect()
    } else {
        raw.splitn(2, " to ").collect()
    };
    match parts.as_slice() {
        [single] => parse_date(single).map(DateRange::single),
        [from, to] => {
            let (from, to) = (parse_date(from)?, parse_date(to)?);
            DateRange::new(from, to).ok()
        }
        _ => None,
    }
}
