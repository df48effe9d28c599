use crate::analytics::aggregate::{group_by_date, select_for_date, ConversionActions};
use crate::analytics::ratios;
use crate::domain::records::{DailyRecord, EntityLevel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Window totals for one ad set or ad.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityPerformance {
    pub id: String,
    pub name: String,
    pub level: Option<EntityLevel>,
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub conversions: f64,
    pub revenue: f64,
}

impl EntityPerformance {
    pub fn ctr(&self) -> f64 {
        ratios::ctr(self.clicks as f64, self.impressions as f64)
    }

    pub fn cpc(&self) -> f64 {
        ratios::cpc(self.spend, self.clicks as f64)
    }

    pub fn roas(&self) -> f64 {
        ratios::roas(self.revenue, self.spend)
    }

    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Per-entity totals using the same per-date de-duplication as [`aggregate_daily`],
/// sorted by spend descending.
///
/// [`aggregate_daily`]: crate::analytics::aggregate::aggregate_daily
pub fn summarize_entities(
    records: &[DailyRecord],
    actions: &ConversionActions,
) -> Vec<EntityPerformance> {
    let mut by_id: BTreeMap<String, EntityPerformance> = BTreeMap::new();

    for (_date, group) in group_by_date(records) {
        let (selected, _) = select_for_date(&group);
        for record in selected {
            if record.is_account_level() {
                continue;
            }
            let Some(id) = record.entity_id.as_deref().map(str::trim).filter(|s| !s.is_empty())
            else {
                continue;
            };

            let entry = by_id.entry(id.to_string()).or_insert_with(|| EntityPerformance {
                id: id.to_string(),
                level: record.level,
                ..EntityPerformance::default()
            });
            if entry.name.is_empty() {
                if let Some(name) = record.entity_name.as_deref() {
                    entry.name = name.trim().to_string();
                }
            }
            entry.spend += record.spend_or_zero();
            entry.impressions = entry.impressions.saturating_add(record.impressions);
            entry.clicks = entry.clicks.saturating_add(record.clicks);
            entry.conversions += actions.conversions_of(record);
            entry.revenue += actions.revenue_of(record);
        }
    }

    let mut out: Vec<EntityPerformance> = by_id.into_values().collect();
    out.sort_by(|a, b| {
        b.spend
            .partial_cmp(&a.spend)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    out
}
