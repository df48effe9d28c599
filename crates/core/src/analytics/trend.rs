//! Split-half growth rates, week-over-week change and volatility.

use crate::analytics::aggregate::AggregatedDay;
use crate::analytics::ratios;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MAX_GROWTH_PCT: f64 = 500.0;
pub const CAMPAIGN_TREND_THRESHOLD: f64 = 10.0;
pub const AD_TREND_THRESHOLD: f64 = 15.0;
pub const STABLE_VOLATILITY: f64 = 30.0;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Spend,
    Impressions,
    Clicks,
    Reach,
    Conversions,
    Revenue,
    Ctr,
    Cpc,
    Cpm,
    Roas,
}

impl Metric {
    /// Cost metrics improve when they go down.
    pub fn lower_is_better(&self) -> bool {
        matches!(self, Self::Cpc | Self::Cpm)
    }

    pub fn of(&self, day: &AggregatedDay) -> f64 {
        match self {
            Self::Spend => day.spend,
            Self::Impressions => day.impressions as f64,
            Self::Clicks => day.clicks as f64,
            Self::Reach => day.reach as f64,
            Self::Conversions => day.conversions,
            Self::Revenue => day.revenue,
            Self::Ctr => day.ctr,
            Self::Cpc => ratios::cpc(day.spend, day.clicks as f64),
            Self::Cpm => ratios::cpm(day.spend, day.impressions as f64),
            Self::Roas => day.roas,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Declining,
    #[default]
    Stable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendResult {
    pub direction: TrendDirection,
    pub change_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub date: NaiveDate,
    pub value: f64,
}

pub fn series(days: &[AggregatedDay], metric: Metric) -> Vec<SeriesPoint> {
    days.iter()
        .map(|day| SeriesPoint {
            date: day.date,
            value: metric.of(day),
        })
        .collect()
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Signed percent change from `first` to `second`, clamped and rounded to one decimal.
/// A zero baseline maps to ±100 instead of infinity.
pub fn percent_change(first: f64, second: f64) -> f64 {
    let raw = if first.abs() < EPSILON {
        if second.abs() < EPSILON {
            0.0
        } else if second > 0.0 {
            100.0
        } else {
            -100.0
        }
    } else {
        (second - first) / first.abs() * 100.0
    };

    if !raw.is_finite() {
        return 0.0;
    }
    round1(raw.clamp(-MAX_GROWTH_PCT, MAX_GROWTH_PCT))
}

fn average(points: &[SeriesPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    points.iter().map(|p| p.value).sum::<f64>() / points.len() as f64
}

/// Growth between the earlier and later half of `points`.
///
/// Returns 0 with fewer than two points, or when every point is on the same date: a single
/// day has no prior day inside the loaded window to compare against.
pub fn growth_rate(points: &[SeriesPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    let mut sorted = points.to_vec();
    sorted.sort_by_key(|p| p.date);

    let earliest = sorted[0].date;
    let latest = sorted[sorted.len() - 1].date;
    if earliest == latest {
        return 0.0;
    }

    // Strictly before the temporal midpoint goes to the first half.
    let span_days = (latest - earliest).num_days();
    let (mut first, mut second): (Vec<SeriesPoint>, Vec<SeriesPoint>) = sorted
        .iter()
        .partition(|p| (p.date - earliest).num_days() * 2 < span_days);

    if first.is_empty() || second.is_empty() {
        let mid = sorted.len() / 2;
        first = sorted[..mid].to_vec();
        second = sorted[mid..].to_vec();
    }

    percent_change(average(&first), average(&second))
}

pub fn classify(change_pct: f64, threshold: f64) -> TrendDirection {
    if change_pct > threshold {
        TrendDirection::Improving
    } else if change_pct < -threshold {
        TrendDirection::Declining
    } else {
        TrendDirection::Stable
    }
}

pub fn analyze_trend(days: &[AggregatedDay], metric: Metric, threshold: f64) -> TrendResult {
    let change_pct = growth_rate(&series(days, metric));
    let signed = if metric.lower_is_better() {
        -change_pct
    } else {
        change_pct
    };
    TrendResult {
        direction: classify(signed, threshold),
        change_pct,
    }
}

/// Last seven calendar days against the seven before them. Windows shorter than eight days
/// use [`growth_rate`] instead.
pub fn week_over_week_change(days: &[AggregatedDay], metric: Metric) -> f64 {
    let Some(latest) = days.iter().map(|d| d.date).max() else {
        return 0.0;
    };
    let Some(earliest) = days.iter().map(|d| d.date).min() else {
        return 0.0;
    };
    if (latest - earliest).num_days() < 7 {
        return growth_rate(&series(days, metric));
    }

    let this_week_start = latest - Duration::days(6);
    let last_week_start = latest - Duration::days(13);

    let sum_between = |from: NaiveDate, to: NaiveDate| -> f64 {
        days.iter()
            .filter(|d| d.date >= from && d.date <= to)
            .map(|d| metric.of(d))
            .sum()
    };

    let this_week = sum_between(this_week_start, latest);
    let last_week = sum_between(last_week_start, this_week_start - Duration::days(1));
    percent_change(last_week, this_week)
}

/// Coefficient of variation of the daily series, in percent.
pub fn volatility_score(days: &[AggregatedDay], metric: Metric) -> f64 {
    if days.len() < 2 {
        return 0.0;
    }
    let values: Vec<f64> = days.iter().map(|d| metric.of(d)).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    if mean.abs() < EPSILON {
        return 0.0;
    }
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    round1(ratios::safe_ratio(variance.sqrt(), mean.abs()) * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, day).unwrap()
    }

    fn p(day: u32, value: f64) -> SeriesPoint {
        SeriesPoint { date: d(day), value }
    }

    fn day(day: u32, spend: f64) -> AggregatedDay {
        AggregatedDay {
            date: d(day),
            spend,
            clicks: 10,
            ..AggregatedDay::default()
        }
    }

    #[test]
    fn insufficient_points_return_zero() {
        assert_eq!(growth_rate(&[]), 0.0);
        assert_eq!(growth_rate(&[p(1, 10.0)]), 0.0);
    }

    #[test]
    fn single_day_series_returns_zero() {
        let points = vec![p(3, 10.0), p(3, 50.0), p(3, 90.0)];
        assert_eq!(growth_rate(&points), 0.0);
    }

    #[test]
    fn compares_average_per_day_of_each_half() {
        // span 3 days, midpoint 1.5: first = {1, 2}, second = {3, 4}
        let points = vec![p(1, 10.0), p(2, 10.0), p(3, 15.0), p(4, 15.0)];
        assert_eq!(growth_rate(&points), 50.0);

        // unequal halves still compare per-day averages
        let points = vec![p(1, 10.0), p(2, 20.0), p(3, 20.0)];
        // first = {1}, second = {2, 3}
        assert_eq!(growth_rate(&points), 100.0);
    }

    #[test]
    fn unsorted_input_is_handled() {
        let points = vec![p(4, 15.0), p(1, 10.0), p(3, 15.0), p(2, 10.0)];
        assert_eq!(growth_rate(&points), 50.0);
    }

    #[test]
    fn zero_baseline_rules() {
        assert_eq!(percent_change(0.0, 0.0), 0.0);
        assert_eq!(percent_change(0.0, 12.0), 100.0);
        assert_eq!(percent_change(1e-12, 5.0), 100.0);
    }

    #[test]
    fn clamps_and_rounds() {
        assert_eq!(percent_change(1.0, 100.0), 500.0);
        assert_eq!(percent_change(3.0, 4.0), 33.3);
        assert_eq!(percent_change(3.0, 2.0), -33.3);

        for (a, b) in [(0.001, 9e9), (7.0, 0.0001), (2.5, 2.5), (1e6, 3.0)] {
            let g = percent_change(a, b);
            assert!((-500.0..=500.0).contains(&g));
            assert_eq!(g, (g * 10.0).round() / 10.0);
        }
    }

    #[test]
    fn classification_thresholds() {
        assert_eq!(classify(10.5, CAMPAIGN_TREND_THRESHOLD), TrendDirection::Improving);
        assert_eq!(classify(-10.5, CAMPAIGN_TREND_THRESHOLD), TrendDirection::Declining);
        assert_eq!(classify(-10.5, AD_TREND_THRESHOLD), TrendDirection::Stable);
        assert_eq!(classify(10.0, CAMPAIGN_TREND_THRESHOLD), TrendDirection::Stable);
    }

    #[test]
    fn falling_cost_is_an_improvement() {
        // Same clicks, halving spend halves CPC.
        let days = vec![day(1, 20.0), day(2, 20.0), day(3, 10.0), day(4, 10.0)];
        let t = analyze_trend(&days, Metric::Cpc, CAMPAIGN_TREND_THRESHOLD);
        assert_eq!(t.change_pct, -50.0);
        assert_eq!(t.direction, TrendDirection::Improving);

        let t = analyze_trend(&days, Metric::Spend, CAMPAIGN_TREND_THRESHOLD);
        assert_eq!(t.direction, TrendDirection::Declining);
    }

    #[test]
    fn week_over_week_uses_calendar_weeks() {
        let mut days: Vec<AggregatedDay> = (1..=7).map(|i| day(i, 10.0)).collect();
        days.extend((8..=14).map(|i| day(i, 8.0)));
        assert_eq!(week_over_week_change(&days, Metric::Spend), -20.0);
    }

    #[test]
    fn week_over_week_short_window_uses_growth_rate() {
        let days = vec![day(1, 10.0), day(2, 10.0), day(3, 15.0), day(4, 15.0)];
        assert_eq!(week_over_week_change(&days, Metric::Spend), 50.0);
        assert_eq!(week_over_week_change(&[], Metric::Spend), 0.0);
    }

    #[test]
    fn volatility_of_flat_series_is_zero() {
        let days = vec![day(1, 10.0), day(2, 10.0), day(3, 10.0)];
        assert_eq!(volatility_score(&days, Metric::Spend), 0.0);

        let days = vec![day(1, 5.0), day(2, 15.0)];
        assert_eq!(volatility_score(&days, Metric::Spend), 50.0);
    }
}
