use anyhow::{ensure, Context};
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::fmt;
use std::str::FromStr;

pub const SERVER_LOCAL: &str = "server-local";

/// Zone used to decide which calendar day an instant belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarZone {
    #[default]
    ServerLocal,
    Named(Tz),
}

impl CalendarZone {
    /// Unknown names fall back to server-local with a warning.
    pub fn parse_or_local(name: Option<&str>) -> Self {
        let Some(name) = name else {
            return Self::ServerLocal;
        };
        match name.parse() {
            Ok(zone) => zone,
            Err(err) => {
                tracing::warn!(timezone = name, error = %err, "unknown timezone; using server-local");
                Self::ServerLocal
            }
        }
    }

    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::ServerLocal => at.with_timezone(&Local).date_naive(),
            Self::Named(tz) => at.with_timezone(tz).date_naive(),
        }
    }

    pub fn today(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_date(now)
    }

    /// First instant of `date` in this zone.
    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        let midnight = date.and_time(NaiveTime::MIN);
        match self {
            Self::ServerLocal => resolve_local(&Local, midnight),
            Self::Named(tz) => resolve_local(tz, midnight),
        }
    }

    /// `[start, end)` of a calendar day in UTC.
    pub fn day_bounds(&self, date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.start_of_day(date),
            self.start_of_day(date.succ_opt().unwrap_or(date)),
        )
    }
}

/// Midnight can fall into a DST gap; step forward an hour at a time until it resolves.
fn resolve_local<Z: TimeZone>(tz: &Z, naive: NaiveDateTime) -> DateTime<Utc> {
    for hours in 0..=3 {
        if let Some(dt) = tz
            .from_local_datetime(&(naive + Duration::hours(hours)))
            .earliest()
        {
            return dt.with_timezone(&Utc);
        }
    }
    Utc.from_utc_datetime(&naive)
}

impl FromStr for CalendarZone {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case(SERVER_LOCAL) || s.eq_ignore_ascii_case("local") {
            return Ok(Self::ServerLocal);
        }
        let tz = s
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("invalid IANA timezone: {s}"))?;
        Ok(Self::Named(tz))
    }
}

impl fmt::Display for CalendarZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServerLocal => f.write_str(SERVER_LOCAL),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> anyhow::Result<Self> {
        ensure!(from <= to, "range start {from} is after end {to}");
        Ok(Self { from, to })
    }

    pub fn single(day: NaiveDate) -> Self {
        Self { from: day, to: day }
    }

    /// `n` days ending on `today`, inclusive. `None` when the start would precede the earliest
    /// representable date.
    pub fn checked_last_days(today: NaiveDate, n: u32) -> Option<Self> {
        let n = n.max(1) as i64;
        let from = today.checked_sub_signed(Duration::days(n - 1))?;
        Some(Self { from, to: today })
    }

    /// Same as [`DateRange::checked_last_days`], clamped to [`NaiveDate::MIN`].
    pub fn last_days(today: NaiveDate, n: u32) -> Self {
        Self::checked_last_days(today, n).unwrap_or(Self {
            from: NaiveDate::MIN,
            to: today,
        })
    }

    pub fn num_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.from && date <= self.to
    }

    /// `[start of from, start of the day after to)` in UTC.
    pub fn utc_bounds(&self, zone: &CalendarZone) -> (DateTime<Utc>, DateTime<Utc>) {
        (zone.start_of_day(self.from), zone.day_bounds(self.to).1)
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}
