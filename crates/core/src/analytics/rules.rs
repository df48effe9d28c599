//! Ordered rule list that turns a campaign snapshot into exactly one recommendation.

use crate::analytics::anomaly::{detect_anomalies, Anomaly, AnomalyKind, Severity};
use crate::analytics::campaign::CampaignSnapshot;
use crate::analytics::entities::EntityPerformance;
use crate::analytics::forecast::performance_forecast;
use crate::domain::recommendation::{
    GeneratedRecommendation, Recommendation, RecommendationAction, RecommendationSource,
    SpecificActions,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleThresholds {
    pub zero_conversion_spend_floor: f64,
    pub overrun_utilization: f64,
    pub overrun_max_roas: f64,
    pub decline_drop_pct: f64,
    pub low_engagement_ctr: f64,
    pub low_engagement_impressions: f64,
    pub anomaly_high_cpc: f64,
    pub very_low_roas: f64,
    pub low_roas: f64,
    pub target_roas: f64,
    pub spare_budget_utilization: f64,
    pub high_cpc: f64,
    pub low_ctr: f64,
    pub low_ctr_impressions: f64,
    pub tracking_min_clicks: f64,
    pub budget_cut_factor: f64,
    pub budget_raise_factor: f64,
    pub bid_cap_factor: f64,
}

impl Default for RuleThresholds {
    fn default() -> Self {
        Self {
            zero_conversion_spend_floor: 10.0,
            overrun_utilization: 95.0,
            overrun_max_roas: 1.5,
            decline_drop_pct: 20.0,
            low_engagement_ctr: 0.5,
            low_engagement_impressions: 10_000.0,
            anomaly_high_cpc: 8.0,
            very_low_roas: 0.5,
            low_roas: 1.5,
            target_roas: 2.5,
            spare_budget_utilization: 80.0,
            high_cpc: 3.0,
            low_ctr: 1.0,
            low_ctr_impressions: 5_000.0,
            tracking_min_clicks: 10.0,
            budget_cut_factor: 0.6,
            budget_raise_factor: 1.6,
            bid_cap_factor: 0.7,
        }
    }
}

impl RuleThresholds {
    pub fn with_target_roas(mut self, target: f64) -> Self {
        if target.is_finite() && target > 0.0 {
            self.target_roas = target;
        }
        self
    }
}

pub struct RuleContext<'a> {
    pub snapshot: &'a CampaignSnapshot,
    pub anomalies: &'a [Anomaly],
    pub thresholds: &'a RuleThresholds,
}

impl RuleContext<'_> {
    fn has(&self, kind: AnomalyKind) -> bool {
        self.anomalies.iter().any(|a| a.kind == kind)
    }

    fn first_with(&self, severity: Severity) -> Option<&Anomaly> {
        self.anomalies.iter().find(|a| a.severity == severity)
    }

    fn above_floor(&self) -> bool {
        self.snapshot.spend > self.thresholds.zero_conversion_spend_floor
    }
}

pub struct Rule {
    pub name: &'static str,
    pub applies: fn(&RuleContext<'_>) -> bool,
    pub build: fn(&RuleContext<'_>) -> Recommendation,
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rule").field("name", &self.name).finish()
    }
}

#[derive(Debug)]
pub struct RuleEngine {
    thresholds: RuleThresholds,
    rules: Vec<Rule>,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::standard(RuleThresholds::default())
    }
}

impl RuleEngine {
    pub fn standard(thresholds: RuleThresholds) -> Self {
        Self {
            thresholds,
            rules: standard_rules(),
        }
    }

    pub fn thresholds(&self) -> &RuleThresholds {
        &self.thresholds
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn detect(&self, snapshot: &CampaignSnapshot) -> Vec<Anomaly> {
        detect_anomalies(snapshot, &self.thresholds)
    }

    /// First matching rule's name and recommendation. Never fails: with no match the
    /// catch-all is used.
    pub fn decide(
        &self,
        snapshot: &CampaignSnapshot,
        anomalies: &[Anomaly],
    ) -> (&'static str, Recommendation) {
        let ctx = RuleContext {
            snapshot,
            anomalies,
            thresholds: &self.thresholds,
        };
        for rule in &self.rules {
            if (rule.applies)(&ctx) {
                return (rule.name, (rule.build)(&ctx));
            }
        }
        ("catch_all", build_catch_all(&ctx))
    }

    pub fn recommend(&self, snapshot: &CampaignSnapshot) -> GeneratedRecommendation {
        let snapshot = snapshot.clone().sanitized();
        let anomalies = self.detect(&snapshot);
        let (rule, recommendation) = self.decide(&snapshot, &anomalies);
        tracing::debug!(
            campaign_id = %snapshot.campaign_id,
            rule,
            action = %recommendation.action,
            "rule engine selected recommendation"
        );
        GeneratedRecommendation {
            source: RecommendationSource::Rules,
            recommendation,
            anomalies,
        }
    }
}

pub fn standard_rules() -> Vec<Rule> {
    vec![
        Rule {
            name: "critical_anomaly",
            applies: |c| c.first_with(Severity::Critical).is_some(),
            build: build_critical,
        },
        Rule {
            name: "budget_overrun",
            applies: |c| c.has(AnomalyKind::BudgetOverrun),
            build: build_budget_overrun,
        },
        Rule {
            name: "performance_decline",
            applies: |c| c.has(AnomalyKind::PerformanceDecline),
            build: build_decline,
        },
        Rule {
            name: "very_low_roas",
            applies: |c| c.above_floor() && c.snapshot.roas < c.thresholds.very_low_roas,
            build: build_very_low_roas,
        },
        Rule {
            name: "low_roas",
            applies: |c| {
                c.above_floor()
                    && c.snapshot.roas >= c.thresholds.very_low_roas
                    && c.snapshot.roas < c.thresholds.low_roas
            },
            build: build_low_roas,
        },
        Rule {
            name: "scale_winner",
            applies: |c| {
                c.snapshot.spend > 0.0
                    && c.snapshot.roas >= c.thresholds.target_roas
                    && c.snapshot.budget_utilization < c.thresholds.spare_budget_utilization
            },
            build: build_scale_winner,
        },
        Rule {
            name: "high_cpc",
            applies: |c| c.snapshot.cpc > c.thresholds.high_cpc,
            build: build_high_cpc,
        },
        Rule {
            name: "low_ctr",
            applies: |c| {
                c.snapshot.ctr < c.thresholds.low_ctr
                    && c.snapshot.impressions > c.thresholds.low_ctr_impressions
            },
            build: build_low_ctr,
        },
        Rule {
            name: "below_target_roas",
            applies: |c| {
                c.snapshot.roas >= c.thresholds.low_roas && c.snapshot.roas < c.thresholds.target_roas
            },
            build: build_below_target,
        },
        Rule {
            name: "conversion_tracking",
            applies: |c| {
                c.snapshot.clicks > c.thresholds.tracking_min_clicks && c.snapshot.conversions == 0.0
            },
            build: build_tracking,
        },
        Rule {
            name: "catch_all",
            applies: |_| true,
            build: build_catch_all,
        },
    ]
}

fn numbered(steps: &[String]) -> String {
    steps
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {s}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn forecast_text(c: &RuleContext<'_>, action: RecommendationAction) -> String {
    performance_forecast(c.snapshot, action).describe(c.snapshot)
}

fn names(entities: impl Iterator<Item = String>) -> Vec<String> {
    entities.take(5).collect()
}

/// Ad set and ad lists derived from entity summaries; `None` when nothing qualifies.
fn specific_actions(c: &RuleContext<'_>) -> Option<SpecificActions> {
    let s = c.snapshot;
    let t = c.thresholds;
    let label = |e: &EntityPerformance| e.display_name().to_string();

    let mut ranked_ads: Vec<&EntityPerformance> = s
        .ads
        .iter()
        .filter(|a| a.spend > 0.0 && a.roas() >= t.target_roas)
        .collect();
    ranked_ads.sort_by(|a, b| b.roas().total_cmp(&a.roas()));

    let actions = SpecificActions {
        adsets_to_scale: names(
            s.adsets
                .iter()
                .filter(|a| a.spend > 0.0 && a.roas() >= t.target_roas)
                .map(label),
        ),
        adsets_to_optimize: names(
            s.adsets
                .iter()
                .filter(|a| {
                    a.spend > t.zero_conversion_spend_floor
                        && a.roas() >= t.very_low_roas
                        && a.roas() < t.target_roas
                })
                .map(label),
        ),
        adsets_to_pause: names(
            s.adsets
                .iter()
                .filter(|a| {
                    a.spend > t.zero_conversion_spend_floor
                        && (a.conversions == 0.0 || a.roas() < t.very_low_roas)
                })
                .map(label),
        ),
        ads_to_pause: names(
            s.ads
                .iter()
                .filter(|a| {
                    (a.spend > t.zero_conversion_spend_floor && a.conversions == 0.0)
                        || (a.impressions as f64 > 1_000.0 && a.ctr() < t.low_engagement_ctr)
                })
                .map(label),
        ),
        ads_to_duplicate: names(ranked_ads.into_iter().take(3).map(label)),
    };

    (!actions.is_empty()).then_some(actions)
}

fn build_critical(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::PauseCampaign;
    let detail = c
        .first_with(Severity::Critical)
        .map(|a| a.description.clone())
        .unwrap_or_default();
    Recommendation {
        action,
        reasoning: format!(
            "Critical issue on {}: {detail}. Continuing to spend without results wastes budget.",
            s.label()
        ),
        impact: format!(
            "Stops about ${:.2} per day of spend that is not producing conversions",
            s.daily_spend()
        ),
        confidence: 10,
        implementation: numbered(&[
            format!("Pause {} in Ads Manager today", s.label()),
            "Confirm the pixel and Conversions API report purchase events".to_string(),
            "Review the landing page and offer for friction".to_string(),
            format!(
                "Relaunch with a test budget of ${:.2}/day once tracking is verified",
                s.daily_spend() * 0.5
            ),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_budget_overrun(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let t = c.thresholds;
    let action = RecommendationAction::ReduceBudget;
    let new_budget = s.budget * t.budget_cut_factor;
    Recommendation {
        action,
        reasoning: format!(
            "{:.0}% of the ${:.2} budget is spent at a ROAS of {:.2}x, below the {:.1}x break-even line.",
            s.budget_utilization, s.budget, s.roas, t.overrun_max_roas
        ),
        impact: format!(
            "Cutting the budget to ${new_budget:.2} limits further spend at a loss by ${:.2}",
            s.budget - new_budget
        ),
        confidence: 8,
        implementation: numbered(&[
            format!("Lower the campaign budget from ${:.2} to ${new_budget:.2}", s.budget),
            "Shift remaining spend to the ad sets with the highest ROAS".to_string(),
            "Re-check ROAS after 3 days before restoring budget".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_decline(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::RefreshCreative;
    Recommendation {
        action,
        reasoning: format!(
            "Performance dropped {:.1}% week over week and the trend is declining, a typical sign of creative fatigue.",
            s.week_over_week_change.abs()
        ),
        impact: "New creative usually restores CTR and conversion rate within a week".to_string(),
        confidence: 7,
        implementation: numbered(&[
            "Produce 2-3 new creatives with a different hook and visual".to_string(),
            "Launch them in the best performing ad set alongside the current winner".to_string(),
            "Pause the old creative once the new ones exit learning".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_very_low_roas(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::PauseCampaign;
    Recommendation {
        action,
        reasoning: format!(
            "ROAS is {:.2}x on ${:.2} of spend: every dollar returns less than {:.0} cents.",
            s.roas,
            s.spend,
            c.thresholds.very_low_roas * 100.0
        ),
        impact: format!(
            "Pausing avoids losing roughly ${:.2} per day",
            (s.daily_spend() - s.daily_revenue()).max(0.0)
        ),
        confidence: 8,
        implementation: numbered(&[
            format!("Pause {}", s.label()),
            "Audit the offer, price point and landing page".to_string(),
            "Relaunch with a narrower audience and a small test budget".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_low_roas(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let t = c.thresholds;
    let action = RecommendationAction::OptimizeTargeting;
    Recommendation {
        action,
        reasoning: format!(
            "ROAS of {:.2}x is positive but below {:.1}x; the audience is likely too broad.",
            s.roas, t.low_roas
        ),
        impact: format!(
            "Reaching {:.1}x on current spend would add about ${:.2} in revenue",
            t.low_roas,
            (t.low_roas - s.roas).max(0.0) * s.spend
        ),
        confidence: 7,
        implementation: numbered(&[
            "Exclude recent purchasers and low-intent placements".to_string(),
            "Build a lookalike audience from the top 10% of customers".to_string(),
            "Move budget from the weakest ad sets to the lookalike".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_scale_winner(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let t = c.thresholds;
    let action = RecommendationAction::IncreaseBudget;
    let new_budget = if s.budget > 0.0 {
        s.budget * t.budget_raise_factor
    } else {
        s.daily_spend() * 30.0 * t.budget_raise_factor
    };
    Recommendation {
        action,
        reasoning: format!(
            "ROAS of {:.2}x beats the {:.1}x target with only {:.0}% of budget used.",
            s.roas, t.target_roas, s.budget_utilization
        ),
        impact: format!(
            "Raising the budget to ${new_budget:.2} should add about ${:.2} in weekly revenue",
            s.daily_revenue() * 7.0 * (t.budget_raise_factor - 1.0)
        ),
        confidence: 8,
        implementation: numbered(&[
            format!("Increase the budget to ${new_budget:.2} in steps of at most 20% per day"),
            "Keep the current audience and creative unchanged while scaling".to_string(),
            format!("Stop scaling if ROAS falls under {:.1}x", t.target_roas),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_high_cpc(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::ReduceCpc;
    let bid_cap = s.cpc * c.thresholds.bid_cap_factor;
    Recommendation {
        action,
        reasoning: format!(
            "Average CPC is ${:.2}, above ${:.2}; clicks are getting expensive.",
            s.cpc, c.thresholds.high_cpc
        ),
        impact: format!(
            "A ${bid_cap:.2} bid cap would buy about {:.0} more clicks for the same spend",
            (crate::analytics::ratios::safe_ratio(s.spend, bid_cap) - s.clicks).max(0.0)
        ),
        confidence: 7,
        implementation: numbered(&[
            format!("Set a bid cap of ${bid_cap:.2}"),
            "Broaden placements to include Reels and Stories".to_string(),
            "Test creatives with a clearer call to action".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_low_ctr(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::RefreshCreative;
    Recommendation {
        action,
        reasoning: format!(
            "CTR of {:.2}% over {:.0} impressions is under {:.1}%; the creative is not earning clicks.",
            s.ctr, s.impressions, c.thresholds.low_ctr
        ),
        impact: format!(
            "Lifting CTR to {:.1}% would add about {:.0} clicks at the same reach",
            c.thresholds.low_ctr,
            (s.impressions * c.thresholds.low_ctr / 100.0 - s.clicks).max(0.0)
        ),
        confidence: 6,
        implementation: numbered(&[
            "Test a new thumbnail and the first 3 seconds of video".to_string(),
            "Rewrite the primary text around a single benefit".to_string(),
            "Retire ads with CTR under half the campaign average".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_below_target(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let t = c.thresholds;
    let action = RecommendationAction::OptimizeBidding;
    let target_cpa = crate::analytics::ratios::safe_ratio(s.spend, s.conversions) * 0.85;
    Recommendation {
        action,
        reasoning: format!(
            "ROAS of {:.2}x is profitable but short of the {:.1}x target.",
            s.roas, t.target_roas
        ),
        impact: format!(
            "Closing the gap to {:.1}x on current spend adds about ${:.2} in revenue",
            t.target_roas,
            (t.target_roas - s.roas).max(0.0) * s.spend
        ),
        confidence: 6,
        implementation: numbered(&[
            "Switch to a cost cap or ROAS goal bid strategy".to_string(),
            format!("Use a target cost per purchase of ${target_cpa:.2}"),
            "Allow 7 days for the learning phase before judging".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_tracking(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::FixConversionTracking;
    Recommendation {
        action,
        reasoning: format!(
            "{:.0} clicks produced no recorded conversions, which usually means events are not reaching the ad platform.",
            s.clicks
        ),
        impact: "Without conversion data the delivery system cannot optimize".to_string(),
        confidence: 8,
        implementation: numbered(&[
            "Open Events Manager and test the purchase event end to end".to_string(),
            "Check that the pixel fires on the order confirmation page".to_string(),
            "Enable the Conversions API for server-side events".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}

fn build_catch_all(c: &RuleContext<'_>) -> Recommendation {
    let s = c.snapshot;
    let action = RecommendationAction::PauseCampaign;
    Recommendation {
        action,
        reasoning: format!(
            "{} shows no clear growth signal: ${:.2} spend, {:.0} clicks, ROAS {:.2}x.",
            s.label(),
            s.spend,
            s.clicks,
            s.roas
        ),
        impact: "A redesigned campaign with a single clear objective gives cleaner data".to_string(),
        confidence: 5,
        implementation: numbered(&[
            "Pause the campaign".to_string(),
            "Redesign around one audience, one offer and one conversion event".to_string(),
            "Relaunch with a small test budget and review after 7 days".to_string(),
        ]),
        forecast: forecast_text(c, action),
        specific_actions: specific_actions(c),
    }
}
