use crate::analytics::campaign::CampaignSnapshot;
use crate::analytics::rules::RuleThresholds;
use crate::analytics::trend::TrendDirection;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    ZeroConversions,
    BudgetOverrun,
    PerformanceDecline,
    LowEngagement,
    HighCpc,
}

/// Ordered so that `Critical` sorts highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
}

/// Threshold checks over a campaign snapshot, most severe first.
pub fn detect_anomalies(s: &CampaignSnapshot, t: &RuleThresholds) -> Vec<Anomaly> {
    let mut out = Vec::new();

    if s.conversions == 0.0 && s.spend > t.zero_conversion_spend_floor {
        out.push(Anomaly {
            kind: AnomalyKind::ZeroConversions,
            severity: Severity::Critical,
            description: format!(
                "${:.2} spent with zero conversions across {:.0} clicks",
                s.spend, s.clicks
            ),
            impact: format!("${:.2} of budget produced no results", s.spend),
        });
    }

    if s.budget_utilization > t.overrun_utilization && s.roas < t.overrun_max_roas {
        out.push(Anomaly {
            kind: AnomalyKind::BudgetOverrun,
            severity: Severity::High,
            description: format!(
                "{:.0}% of budget used while ROAS is only {:.2}x",
                s.budget_utilization, s.roas
            ),
            impact: format!(
                "Remaining budget of ${:.2} is at risk of being spent below break-even",
                (s.budget - s.spend).max(0.0)
            ),
        });
    }

    if s.trend == TrendDirection::Declining && s.week_over_week_change < -t.decline_drop_pct {
        out.push(Anomaly {
            kind: AnomalyKind::PerformanceDecline,
            severity: Severity::High,
            description: format!(
                "Performance fell {:.1}% week over week",
                s.week_over_week_change.abs()
            ),
            impact: "Results per dollar are shrinking; creative fatigue is likely".to_string(),
        });
    }

    if s.ctr < t.low_engagement_ctr && s.impressions > t.low_engagement_impressions {
        out.push(Anomaly {
            kind: AnomalyKind::LowEngagement,
            severity: Severity::Medium,
            description: format!(
                "CTR of {:.2}% over {:.0} impressions",
                s.ctr, s.impressions
            ),
            impact: "Ads are being shown but not clicked".to_string(),
        });
    }

    if s.cpc > t.anomaly_high_cpc && s.conversions > 0.0 {
        out.push(Anomaly {
            kind: AnomalyKind::HighCpc,
            severity: Severity::Medium,
            description: format!("CPC of ${:.2} is above ${:.2}", s.cpc, t.anomaly_high_cpc),
            impact: format!(
                "Each conversion costs ${:.2}",
                crate::analytics::ratios::cost_per_result(s.spend, s.conversions)
            ),
        });
    }

    out.sort_by(|a, b| b.severity.cmp(&a.severity));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(s: &CampaignSnapshot) -> Vec<AnomalyKind> {
        detect_anomalies(s, &RuleThresholds::default())
            .into_iter()
            .map(|a| a.kind)
            .collect()
    }

    #[test]
    fn nothing_on_zero_input() {
        assert!(kinds(&CampaignSnapshot::default()).is_empty());
    }

    #[test]
    fn zero_conversions_needs_spend_above_floor() {
        let s = CampaignSnapshot {
            spend: 10.0,
            clicks: 40.0,
            ..CampaignSnapshot::default()
        };
        assert!(kinds(&s).is_empty());

        let s = CampaignSnapshot {
            spend: 10.01,
            ..s
        };
        assert_eq!(kinds(&s), vec![AnomalyKind::ZeroConversions]);
    }

    #[test]
    fn sorted_most_severe_first() {
        let s = CampaignSnapshot {
            spend: 960.0,
            budget: 1_000.0,
            budget_utilization: 96.0,
            roas: 0.0,
            impressions: 50_000.0,
            ctr: 0.3,
            ..CampaignSnapshot::default()
        };
        let found = detect_anomalies(&s, &RuleThresholds::default());
        let severities: Vec<_> = found.iter().map(|a| a.severity).collect();
        assert_eq!(
            severities,
            vec![Severity::Critical, Severity::High, Severity::Medium]
        );
        assert_eq!(found[1].kind, AnomalyKind::BudgetOverrun);
    }

    #[test]
    fn decline_requires_both_trend_and_drop() {
        let declining = CampaignSnapshot {
            trend: TrendDirection::Declining,
            week_over_week_change: -15.0,
            ..CampaignSnapshot::default()
        };
        assert!(kinds(&declining).is_empty());

        let steep = CampaignSnapshot {
            week_over_week_change: -25.0,
            ..declining
        };
        assert_eq!(kinds(&steep), vec![AnomalyKind::PerformanceDecline]);
    }

    #[test]
    fn high_cpc_only_with_conversions() {
        let s = CampaignSnapshot {
            cpc: 9.0,
            spend: 90.0,
            clicks: 10.0,
            conversions: 2.0,
            ..CampaignSnapshot::default()
        };
        assert_eq!(kinds(&s), vec![AnomalyKind::HighCpc]);
    }

    #[test]
    fn serializes_with_type_key() {
        let s = CampaignSnapshot {
            spend: 50.0,
            ..CampaignSnapshot::default()
        };
        let v = serde_json::to_value(&detect_anomalies(&s, &RuleThresholds::default())[0]).unwrap();
        assert_eq!(v["type"], "zero_conversions");
        assert_eq!(v["severity"], "critical");
    }
}
