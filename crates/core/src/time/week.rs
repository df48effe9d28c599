use crate::time::calendar::CalendarZone;
use anyhow::{ensure, Context};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Monday of a Monday–Sunday week; rendered as `YYYY-MM-DD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "NaiveDate", into = "NaiveDate")]
pub struct WeekId(NaiveDate);

impl WeekId {
    pub fn containing(date: NaiveDate) -> Self {
        Self(week_start(date))
    }

    /// The week `now` falls in, judged by the server's calendar.
    pub fn current(now: DateTime<Utc>, server: &CalendarZone) -> Self {
        Self::containing(server.local_date(now))
    }

    pub fn monday(&self) -> NaiveDate {
        self.0
    }

    pub fn sunday(&self) -> NaiveDate {
        self.0 + Duration::days(6)
    }

    pub fn next(&self) -> Self {
        Self(self.0 + Duration::days(7))
    }

    /// Instant the following week opens in the server zone.
    pub fn next_available(&self, server: &CalendarZone) -> DateTime<Utc> {
        server.start_of_day(self.next().monday())
    }
}

impl TryFrom<NaiveDate> for WeekId {
    type Error = anyhow::Error;

    fn try_from(date: NaiveDate) -> Result<Self, Self::Error> {
        ensure!(
            date.weekday() == Weekday::Mon,
            "week id must be a Monday (got {date}, a {})",
            date.weekday()
        );
        Ok(Self(date))
    }
}

impl From<WeekId> for NaiveDate {
    fn from(w: WeekId) -> Self {
        w.0
    }
}

impl FromStr for WeekId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .with_context(|| format!("invalid week id: {s}"))?;
        Self::try_from(date)
    }
}

impl fmt::Display for WeekId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    #[test]
    fn monday_through_sunday_share_a_week() {
        // 2024-05-13 is a Monday.
        for day in 13..=19 {
            assert_eq!(WeekId::containing(d(5, day)).to_string(), "2024-05-13");
        }
        assert_eq!(WeekId::containing(d(5, 20)).to_string(), "2024-05-20");
        assert_eq!(WeekId::containing(d(5, 12)).to_string(), "2024-05-06");
    }

    #[test]
    fn week_is_judged_in_server_zone() {
        // Sunday 23:30 in New York is already Monday in UTC.
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 3, 30, 0).unwrap();
        let ny = CalendarZone::Named(chrono_tz::America::New_York);
        assert_eq!(WeekId::current(now, &ny).to_string(), "2024-05-13");
        let utc = CalendarZone::Named(chrono_tz::UTC);
        assert_eq!(WeekId::current(now, &utc).to_string(), "2024-05-20");
    }

    #[test]
    fn next_available_is_following_monday_midnight() {
        let utc = CalendarZone::Named(chrono_tz::UTC);
        let week: WeekId = "2024-05-13".parse().unwrap();
        assert_eq!(week.sunday(), d(5, 19));
        assert_eq!(
            week.next_available(&utc),
            Utc.with_ymd_and_hms(2024, 5, 20, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn rejects_non_monday_ids() {
        assert!("2024-05-14".parse::<WeekId>().is_err());
        assert!(serde_json::from_str::<WeekId>("\"2024-05-14\"").is_err());
        let w: WeekId = serde_json::from_str("\"2024-05-13\"").unwrap();
        assert_eq!(serde_json::to_string(&w).unwrap(), "\"2024-05-13\"");
    }
}
