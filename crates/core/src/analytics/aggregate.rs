//! Meta daily stats de-duplication and per-date aggregation.

use crate::analytics::ratios;
use crate::domain::records::{ActionValue, DailyRecord, EntityLevel};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_CONVERSION_ACTIONS: [&str; 3] = [
    "purchase",
    "offsite_conversion.fb_pixel_purchase",
    "omni_purchase",
];

const ACCOUNT_KEY: &str = "\u{0}account";

/// Action types treated as a purchase. Order matters: Meta reports one purchase under several
/// aliases, so only the first recognized entry of a record counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionActions {
    action_types: Vec<String>,
}

impl Default for ConversionActions {
    fn default() -> Self {
        Self {
            action_types: DEFAULT_CONVERSION_ACTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ConversionActions {
    pub fn new<I, S>(action_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out = Self {
            action_types: Vec::new(),
        };
        for a in action_types {
            out = out.with(a);
        }
        out
    }

    /// Defaults extended with a comma separated list, e.g. `onsite_web_purchase,lead`.
    pub fn from_list(list: Option<&str>) -> Self {
        let mut out = Self::default();
        for part in list.unwrap_or_default().split(',') {
            out = out.with(part);
        }
        out
    }

    pub fn with(mut self, action_type: impl Into<String>) -> Self {
        let action_type = action_type.into().trim().to_string();
        if !action_type.is_empty() && !self.contains(&action_type) {
            self.action_types.push(action_type);
        }
        self
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.action_types.iter().any(|a| a == action_type)
    }

    pub fn action_types(&self) -> &[String] {
        &self.action_types
    }

    /// Value of the highest-priority recognized action in `values`.
    pub fn first_match(&self, values: &[ActionValue]) -> Option<f64> {
        self.action_types.iter().find_map(|wanted| {
            values
                .iter()
                .find(|v| v.action_type == *wanted)
                .map(|v| v.value)
        })
    }

    pub fn conversions_of(&self, record: &DailyRecord) -> f64 {
        self.first_match(&record.actions)
            .unwrap_or(record.conversions)
            .max(0.0)
    }

    pub fn revenue_of(&self, record: &DailyRecord) -> f64 {
        self.first_match(&record.action_values).unwrap_or(0.0).max(0.0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedDay {
    pub date: NaiveDate,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub reach: u64,
    pub conversions: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub roas: f64,
    pub entity_count: usize,
    /// Selected rows whose spend was `null` (not yet synced).
    pub unsynced_records: usize,
    pub dropped_account_level: bool,
}

impl AggregatedDay {
    pub fn is_zero(&self) -> bool {
        self.spend == 0.0
            && self.impressions == 0
            && self.clicks == 0
            && self.reach == 0
            && self.conversions == 0.0
            && self.revenue == 0.0
    }

    /// One entity-level record carrying this day's totals; aggregating it again is a no-op.
    pub fn as_record(&self) -> DailyRecord {
        let purchase = DEFAULT_CONVERSION_ACTIONS[0].to_string();
        DailyRecord {
            date: self.date,
            entity_id: Some(format!("day:{}", self.date)),
            level: Some(EntityLevel::Campaign),
            spend: Some(self.spend),
            impressions: self.impressions,
            clicks: self.clicks,
            conversions: self.conversions,
            reach: self.reach,
            ctr: Some(self.ctr),
            actions: vec![ActionValue {
                action_type: purchase.clone(),
                value: self.conversions,
            }],
            action_values: vec![ActionValue {
                action_type: purchase,
                value: self.revenue,
            }],
            ..DailyRecord::default()
        }
    }
}

fn spend_rank(record: &DailyRecord) -> f64 {
    record.spend.unwrap_or(f64::NEG_INFINITY)
}

/// Collapses one date's rows: one row per entity (highest spend wins), account-level rows
/// dropped when entity-level rows exist. Returns the selection and whether anything
/// account-level was dropped.
pub(crate) fn select_for_date<'a>(records: &[&'a DailyRecord]) -> (Vec<&'a DailyRecord>, bool) {
    let mut by_entity: BTreeMap<&str, &'a DailyRecord> = BTreeMap::new();
    let mut account: Option<&'a DailyRecord> = None;

    for &record in records {
        if record.is_account_level() {
            match account {
                Some(current) if spend_rank(current) >= spend_rank(record) => {}
                _ => account = Some(record),
            }
            continue;
        }

        let key = record.entity_id.as_deref().map(str::trim).unwrap_or(ACCOUNT_KEY);
        match by_entity.get(key) {
            Some(current) if spend_rank(current) >= spend_rank(record) => {}
            _ => {
                by_entity.insert(key, record);
            }
        }
    }

    if by_entity.is_empty() {
        return (account.into_iter().collect(), false);
    }
    (by_entity.into_values().collect(), account.is_some())
}

pub(crate) fn group_by_date(records: &[DailyRecord]) -> BTreeMap<NaiveDate, Vec<&DailyRecord>> {
    let mut out: BTreeMap<NaiveDate, Vec<&DailyRecord>> = BTreeMap::new();
    for record in records {
        out.entry(record.date).or_default().push(record);
    }
    out
}

/// One [`AggregatedDay`] per calendar date, ascending.
pub fn aggregate_daily(records: &[DailyRecord], actions: &ConversionActions) -> Vec<AggregatedDay> {
    let mut out = Vec::new();

    for (date, group) in group_by_date(records) {
        let (selected, dropped_account_level) = select_for_date(&group);

        let mut day = AggregatedDay {
            date,
            entity_count: selected.len(),
            dropped_account_level,
            ..AggregatedDay::default()
        };

        for record in selected {
            match record.spend {
                Some(spend) => day.spend += spend,
                None => day.unsynced_records += 1,
            }
            day.impressions = day.impressions.saturating_add(record.impressions);
            day.clicks = day.clicks.saturating_add(record.clicks);
            day.reach = day.reach.saturating_add(record.reach);
            day.conversions += actions.conversions_of(record);
            day.revenue += actions.revenue_of(record);
        }

        day.ctr = ratios::ctr(day.clicks as f64, day.impressions as f64);
        day.roas = ratios::roas(day.revenue, day.spend);

        if dropped_account_level {
            tracing::debug!(%date, entities = day.entity_count, "dropped account-level row in favour of entity rows");
        }
        out.push(day);
    }

    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourcedDays {
    pub days: Vec<AggregatedDay>,
    pub source: DataSource,
    pub notice: Option<String>,
}

fn all_zero(days: &[AggregatedDay]) -> bool {
    days.iter().all(AggregatedDay::is_zero)
}

/// Falls back to the secondary (campaign-level) source only when the primary is entirely zero
/// and the secondary is not. This papers over a sync inconsistency between the two tables, so
/// every substitution is logged and surfaced as a notice.
pub fn prefer_secondary_when_empty(
    primary: Vec<AggregatedDay>,
    secondary: Vec<AggregatedDay>,
) -> SourcedDays {
    if !all_zero(&primary) || all_zero(&secondary) {
        return SourcedDays {
            days: primary,
            source: DataSource::Primary,
            notice: None,
        };
    }

    tracing::warn!(
        primary_days = primary.len(),
        secondary_days = secondary.len(),
        "ad-level stats are all zero while campaign-level stats are not; using campaign-level stats"
    );
    SourcedDays {
        days: secondary,
        source: DataSource::Secondary,
        notice: Some(
            "Ad-level stats for this range are all zero; showing campaign-level totals instead. \
             The ad-level sync may be incomplete."
                .to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn rec(day: u32, entity: &str, spend: Option<f64>) -> DailyRecord {
        DailyRecord {
            spend,
            impressions: 1000,
            clicks: 10,
            ..DailyRecord::new(d(day), entity)
        }
    }

    fn purchase(action_type: &str, value: f64) -> ActionValue {
        ActionValue {
            action_type: action_type.to_string(),
            value,
        }
    }

    #[test]
    fn account_level_row_is_not_double_counted() {
        let records = vec![
            rec(1, "act_999", Some(100.0)),
            rec(1, "ad_1", Some(40.0)),
            rec(1, "ad_2", Some(35.0)),
        ];
        let days = aggregate_daily(&records, &ConversionActions::default());
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].spend, 75.0);
        assert_eq!(days[0].entity_count, 2);
        assert!(days[0].dropped_account_level);
    }

    #[test]
    fn account_level_row_is_used_when_alone() {
        let records = vec![rec(1, "act_999", Some(100.0))];
        let days = aggregate_daily(&records, &ConversionActions::default());
        assert_eq!(days[0].spend, 100.0);
        assert!(!days[0].dropped_account_level);
    }

    #[test]
    fn repeated_syncs_keep_highest_spend() {
        let records = vec![
            rec(1, "ad_1", Some(20.0)),
            rec(1, "ad_1", Some(45.0)),
            rec(1, "ad_1", None),
            rec(1, "ad_1", Some(30.0)),
        ];
        let days = aggregate_daily(&records, &ConversionActions::default());
        assert_eq!(days[0].spend, 45.0);
        assert_eq!(days[0].impressions, 1000);
        assert_eq!(days[0].unsynced_records, 0);
    }

    #[test]
    fn huge_counters_saturate() {
        let mut a = rec(1, "ad_1", Some(10.0));
        let mut b = rec(1, "ad_2", Some(10.0));
        for r in [&mut a, &mut b] {
            r.impressions = u64::MAX;
            r.clicks = u64::MAX;
            r.reach = u64::MAX;
        }
        let days = aggregate_daily(&[a, b], &ConversionActions::default());
        assert_eq!(days[0].impressions, u64::MAX);
        assert_eq!(days[0].clicks, u64::MAX);
        assert_eq!(days[0].reach, u64::MAX);
    }

    #[test]
    fn missing_spend_is_tracked_separately_from_zero() {
        let records = vec![rec(1, "ad_1", None), rec(1, "ad_2", Some(0.0))];
        let days = aggregate_daily(&records, &ConversionActions::default());
        assert_eq!(days[0].spend, 0.0);
        assert_eq!(days[0].unsynced_records, 1);
    }

    #[test]
    fn output_is_sorted_by_date() {
        let records = vec![rec(3, "a", Some(1.0)), rec(1, "a", Some(1.0)), rec(2, "a", Some(1.0))];
        let dates: Vec<_> = aggregate_daily(&records, &ConversionActions::default())
            .into_iter()
            .map(|day| day.date)
            .collect();
        assert_eq!(dates, vec![d(1), d(2), d(3)]);
    }

    #[test]
    fn purchase_aliases_count_once_per_record() {
        let mut r = rec(1, "ad_1", Some(50.0));
        r.actions = vec![
            purchase("link_click", 30.0),
            purchase("omni_purchase", 2.0),
            purchase("purchase", 2.0),
        ];
        r.action_values = vec![purchase("omni_purchase", 80.0), purchase("purchase", 80.0)];

        let days = aggregate_daily(&[r], &ConversionActions::default());
        assert_eq!(days[0].conversions, 2.0);
        assert_eq!(days[0].revenue, 80.0);
        assert_eq!(days[0].roas, 1.6);
    }

    #[test]
    fn falls_back_to_conversions_field_without_actions() {
        let mut r = rec(1, "ad_1", Some(10.0));
        r.conversions = 1.5;
        let days = aggregate_daily(&[r], &ConversionActions::default());
        assert_eq!(days[0].conversions, 1.5);
        assert_eq!(days[0].revenue, 0.0);
    }

    #[test]
    fn configured_actions_extend_defaults() {
        let actions = ConversionActions::from_list(Some("onsite_web_purchase, ,purchase"));
        assert!(actions.contains("onsite_web_purchase"));
        assert_eq!(actions.action_types().len(), 4);

        let mut r = rec(1, "ad_1", Some(10.0));
        r.action_values = vec![purchase("onsite_web_purchase", 25.0)];
        assert_eq!(actions.revenue_of(&r), 25.0);
        assert_eq!(ConversionActions::default().revenue_of(&r), 0.0);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let mut records = vec![
            rec(1, "act_1", Some(100.0)),
            rec(1, "ad_1", Some(40.0)),
            rec(1, "ad_2", Some(35.0)),
            rec(2, "ad_1", Some(12.5)),
            rec(2, "ad_1", Some(10.0)),
        ];
        records[1].actions = vec![purchase("purchase", 3.0)];
        records[1].action_values = vec![purchase("purchase", 120.0)];

        let actions = ConversionActions::default();
        let once = aggregate_daily(&records, &actions);
        let fed_back: Vec<DailyRecord> = once.iter().map(AggregatedDay::as_record).collect();
        let twice = aggregate_daily(&fed_back, &actions);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.date, b.date);
            assert_eq!(a.spend, b.spend);
            assert_eq!(a.impressions, b.impressions);
            assert_eq!(a.clicks, b.clicks);
            assert_eq!(a.conversions, b.conversions);
            assert_eq!(a.revenue, b.revenue);
            assert_eq!(a.roas, b.roas);
        }
    }

    #[test]
    fn secondary_source_used_only_when_primary_is_all_zero() {
        let zero = AggregatedDay {
            date: d(1),
            ..AggregatedDay::default()
        };
        let real = AggregatedDay {
            date: d(1),
            spend: 80.0,
            ..AggregatedDay::default()
        };

        let picked = prefer_secondary_when_empty(vec![zero.clone()], vec![real.clone()]);
        assert_eq!(picked.source, DataSource::Secondary);
        assert_eq!(picked.days[0].spend, 80.0);
        assert!(picked.notice.is_some());

        let picked = prefer_secondary_when_empty(vec![real.clone()], vec![zero.clone()]);
        assert_eq!(picked.source, DataSource::Primary);

        let picked = prefer_secondary_when_empty(vec![zero.clone()], vec![zero]);
        assert_eq!(picked.source, DataSource::Primary);
        assert!(picked.notice.is_none());
    }
}
