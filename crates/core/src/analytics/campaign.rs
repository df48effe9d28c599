//! Period metrics for a brand or campaign, and the flat snapshot the rule engine reads.

use crate::analytics::aggregate::{AggregatedDay, DataSource};
use crate::analytics::entities::EntityPerformance;
use crate::analytics::ratios::{self, DataQualityWarning, RevenueBreakdown};
use crate::analytics::trend::{self, Metric, TrendDirection, CAMPAIGN_TREND_THRESHOLD};
use crate::domain::records::{CampaignRecord, EntityLevel};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Benchmarks {
    /// Percent.
    pub ctr: f64,
    pub cpc: f64,
    pub roas: f64,
}

impl Default for Benchmarks {
    fn default() -> Self {
        Self {
            ctr: 1.0,
            cpc: 1.5,
            roas: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
    #[default]
    #[serde(rename = "N/A")]
    NotRated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostEfficiency {
    Excellent,
    Good,
    Average,
    Poor,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Better,
    #[default]
    OnPar,
    Worse,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkComparison {
    pub ctr: Comparison,
    pub cpc: Comparison,
    pub roas: Comparison,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub spend_trend: TrendDirection,
    pub ctr_trend: TrendDirection,
    pub roas_trend: TrendDirection,
    pub week_over_week_change: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consistency {
    pub is_stable: bool,
    pub volatility_score: f64,
}

impl Default for Consistency {
    fn default() -> Self {
        Self {
            is_stable: true,
            volatility_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodTotals {
    pub spend: f64,
    pub impressions: u64,
    pub clicks: u64,
    pub reach: u64,
    pub conversions: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodMetrics {
    pub performance_grade: Grade,
    pub budget_utilization: f64,
    pub cost_efficiency: CostEfficiency,
    pub audience_reach: u64,
    pub conversion_rate: f64,
    pub benchmark_comparison: BenchmarkComparison,
    pub key_issues: Vec<String>,
    pub strengths: Vec<String>,
    pub trends: Trends,
    pub consistency: Consistency,

    pub totals: PeriodTotals,
    pub revenue: RevenueBreakdown,
    pub ctr: f64,
    pub cpc: f64,
    pub cpm: f64,
    pub roas: f64,
    pub cost_per_result: f64,
    pub data_points: usize,
    pub source: DataSource,
    pub warnings: Vec<DataQualityWarning>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl Default for PeriodMetrics {
    fn default() -> Self {
        Self {
            performance_grade: Grade::NotRated,
            budget_utilization: 0.0,
            cost_efficiency: CostEfficiency::Unknown,
            audience_reach: 0,
            conversion_rate: 0.0,
            benchmark_comparison: BenchmarkComparison::default(),
            key_issues: Vec::new(),
            strengths: Vec::new(),
            trends: Trends::default(),
            consistency: Consistency::default(),
            totals: PeriodTotals::default(),
            revenue: RevenueBreakdown::default(),
            ctr: 0.0,
            cpc: 0.0,
            cpm: 0.0,
            roas: 0.0,
            cost_per_result: 0.0,
            data_points: 0,
            source: DataSource::Primary,
            warnings: Vec::new(),
            notice: None,
        }
    }
}

impl PeriodMetrics {
    /// Fully shaped zero result returned when data could not be loaded.
    pub fn empty(notice: impl Into<String>) -> Self {
        Self {
            notice: Some(notice.into()),
            ..Self::default()
        }
    }
}

/// Budget figures from the campaign master row.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BudgetContext {
    pub budget: f64,
    pub spent: f64,
}

impl From<&CampaignRecord> for BudgetContext {
    fn from(c: &CampaignRecord) -> Self {
        Self {
            budget: c.budget,
            spent: c.spent,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeriodInput<'a> {
    pub days: &'a [AggregatedDay],
    pub budget: Option<BudgetContext>,
    pub storefront_revenue: Option<f64>,
    pub source: DataSource,
    pub notice: Option<String>,
}

impl<'a> PeriodInput<'a> {
    pub fn new(days: &'a [AggregatedDay]) -> Self {
        Self {
            days,
            budget: None,
            storefront_revenue: None,
            source: DataSource::Primary,
            notice: None,
        }
    }
}

/// ROAS when revenue is tracked, otherwise CTR.
pub fn performance_metric(days: &[AggregatedDay]) -> Metric {
    if days.iter().any(|d| d.revenue > 0.0) {
        Metric::Roas
    } else {
        Metric::Ctr
    }
}

fn compare(value: f64, benchmark: f64, lower_is_better: bool) -> Comparison {
    if benchmark <= 0.0 || value <= 0.0 {
        return Comparison::OnPar;
    }
    let ratio = value / benchmark;
    let (better, worse) = if lower_is_better {
        (ratio < 0.9, ratio > 1.1)
    } else {
        (ratio > 1.1, ratio < 0.9)
    };
    if better {
        Comparison::Better
    } else if worse {
        Comparison::Worse
    } else {
        Comparison::OnPar
    }
}

fn grade(spend: f64, roas: f64, ctr: f64, conversion_rate: f64) -> Grade {
    if spend <= 0.0 {
        return Grade::NotRated;
    }

    let mut points = 0;
    points += match roas {
        r if r >= 4.0 => 40,
        r if r >= 2.5 => 30,
        r if r >= 1.5 => 20,
        r if r >= 1.0 => 10,
        _ => 0,
    };
    points += match ctr {
        c if c >= 2.0 => 30,
        c if c >= 1.0 => 20,
        c if c >= 0.5 => 10,
        _ => 0,
    };
    points += match conversion_rate {
        c if c >= 5.0 => 30,
        c if c >= 2.0 => 20,
        c if c >= 1.0 => 10,
        _ => 0,
    };

    match points {
        p if p >= 80 => Grade::A,
        p if p >= 65 => Grade::B,
        p if p >= 50 => Grade::C,
        p if p >= 35 => Grade::D,
        _ => Grade::F,
    }
}

fn cost_efficiency(cpc: f64, clicks: u64, benchmark_cpc: f64) -> CostEfficiency {
    if clicks == 0 || benchmark_cpc <= 0.0 {
        return CostEfficiency::Unknown;
    }
    match cpc / benchmark_cpc {
        r if r <= 0.5 => CostEfficiency::Excellent,
        r if r <= 1.0 => CostEfficiency::Good,
        r if r <= 1.5 => CostEfficiency::Average,
        _ => CostEfficiency::Poor,
    }
}

/// Totals, ratios, grade, benchmark comparison, trends and consistency over a window.
pub fn calculate_period_metrics(input: PeriodInput<'_>, benchmarks: &Benchmarks) -> PeriodMetrics {
    let days = input.days;

    let mut totals = PeriodTotals::default();
    let mut platform_revenue = 0.0;
    for day in days {
        totals.spend += day.spend;
        totals.impressions = totals.impressions.saturating_add(day.impressions);
        totals.clicks = totals.clicks.saturating_add(day.clicks);
        totals.reach = totals.reach.saturating_add(day.reach);
        totals.conversions += day.conversions;
        platform_revenue += day.revenue;
    }

    let clicks = totals.clicks as f64;
    let impressions = totals.impressions as f64;
    let ctr = ratios::ctr(clicks, impressions);
    let cpc = ratios::cpc(totals.spend, clicks);
    let roas = ratios::roas(platform_revenue, totals.spend);
    let conversion_rate = ratios::conversion_rate(totals.conversions, clicks);

    let budget_utilization = input
        .budget
        .map(|b| ratios::budget_utilization(b.spent.max(totals.spend), b.budget))
        .unwrap_or(0.0);

    let perf = performance_metric(days);
    let trends = Trends {
        spend_trend: trend::analyze_trend(days, Metric::Spend, CAMPAIGN_TREND_THRESHOLD).direction,
        ctr_trend: trend::analyze_trend(days, Metric::Ctr, CAMPAIGN_TREND_THRESHOLD).direction,
        roas_trend: trend::analyze_trend(days, Metric::Roas, CAMPAIGN_TREND_THRESHOLD).direction,
        week_over_week_change: trend::week_over_week_change(days, perf),
    };

    let volatility_score = trend::volatility_score(days, perf);
    let consistency = Consistency {
        is_stable: volatility_score < trend::STABLE_VOLATILITY,
        volatility_score,
    };

    let benchmark_comparison = BenchmarkComparison {
        ctr: compare(ctr, benchmarks.ctr, false),
        cpc: compare(cpc, benchmarks.cpc, true),
        roas: compare(roas, benchmarks.roas, false),
    };

    let warnings = ratios::validate_totals(totals.spend, platform_revenue);

    let mut key_issues = Vec::new();
    let mut strengths = Vec::new();

    if totals.spend > 0.0 && roas < 1.0 {
        key_issues.push(format!(
            "Ad spend of ${:.2} returned only ${platform_revenue:.2} in attributed revenue (ROAS {roas:.2}x)",
            totals.spend
        ));
    } else if roas >= benchmarks.roas && totals.spend > 0.0 {
        strengths.push(format!("ROAS of {roas:.2}x beats the {:.1}x benchmark", benchmarks.roas));
    }

    if totals.impressions > 0 && ctr < benchmarks.ctr * 0.5 {
        key_issues.push(format!(
            "CTR of {ctr:.2}% is less than half the {:.1}% benchmark",
            benchmarks.ctr
        ));
    } else if ctr >= benchmarks.ctr {
        strengths.push(format!("CTR of {ctr:.2}% meets the {:.1}% benchmark", benchmarks.ctr));
    }

    if totals.clicks > 0 && cpc > benchmarks.cpc * 2.0 {
        key_issues.push(format!(
            "CPC of ${cpc:.2} is more than double the ${:.2} benchmark",
            benchmarks.cpc
        ));
    } else if totals.clicks > 0 && cpc <= benchmarks.cpc {
        strengths.push(format!("CPC of ${cpc:.2} is within the ${:.2} benchmark", benchmarks.cpc));
    }

    if totals.clicks > 10 && totals.conversions == 0.0 {
        key_issues.push(format!(
            "{} clicks produced no tracked conversions",
            totals.clicks
        ));
    } else if conversion_rate >= 2.0 {
        strengths.push(format!("Conversion rate of {conversion_rate:.2}% is healthy"));
    }

    if budget_utilization > 95.0 {
        key_issues.push(format!("Budget is {budget_utilization:.0}% spent"));
    }

    if trends.week_over_week_change < -20.0 {
        key_issues.push(format!(
            "Performance dropped {:.1}% week over week",
            trends.week_over_week_change.abs()
        ));
    }

    for w in &warnings {
        key_issues.push(w.message.clone());
    }

    PeriodMetrics {
        performance_grade: grade(totals.spend, roas, ctr, conversion_rate),
        budget_utilization,
        cost_efficiency: cost_efficiency(cpc, totals.clicks, benchmarks.cpc),
        audience_reach: totals.reach,
        conversion_rate,
        benchmark_comparison,
        key_issues,
        strengths,
        trends,
        consistency,
        totals,
        revenue: RevenueBreakdown::new(platform_revenue, input.storefront_revenue),
        ctr,
        cpc,
        cpm: ratios::cpm(totals.spend, impressions),
        roas,
        cost_per_result: ratios::cost_per_result(totals.spend, totals.conversions),
        data_points: days.len(),
        source: input.source,
        warnings,
        notice: input.notice,
    }
}

/// Flat metric bag consumed by the anomaly detector and rule engine. Every field defaults to
/// zero so partially populated input still evaluates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CampaignSnapshot {
    pub campaign_id: String,
    pub campaign_name: String,
    pub budget: f64,
    pub spend: f64,
    pub impressions: f64,
    pub clicks: f64,
    pub conversions: f64,
    pub revenue: f64,
    pub ctr: f64,
    pub cpc: f64,
    pub roas: f64,
    pub budget_utilization: f64,
    pub trend: TrendDirection,
    pub week_over_week_change: f64,
    pub days: u32,
    pub adsets: Vec<EntityPerformance>,
    pub ads: Vec<EntityPerformance>,
}

fn clean(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

impl CampaignSnapshot {
    pub fn from_metrics(
        campaign: &CampaignRecord,
        metrics: &PeriodMetrics,
        days: &[AggregatedDay],
        entities: Vec<EntityPerformance>,
    ) -> Self {
        let trend = match performance_metric(days) {
            Metric::Roas => metrics.trends.roas_trend,
            _ => metrics.trends.ctr_trend,
        };
        let mut adsets = Vec::new();
        let mut ads = Vec::new();
        for e in entities {
            match e.level {
                Some(EntityLevel::Adset) => adsets.push(e),
                Some(EntityLevel::Ad) => ads.push(e),
                _ => {}
            }
        }

        Self {
            campaign_id: campaign.id.clone(),
            campaign_name: campaign.name.clone(),
            budget: campaign.budget,
            spend: metrics.totals.spend,
            impressions: metrics.totals.impressions as f64,
            clicks: metrics.totals.clicks as f64,
            conversions: metrics.totals.conversions,
            revenue: metrics.revenue.platform_attributed,
            ctr: metrics.ctr,
            cpc: metrics.cpc,
            roas: metrics.roas,
            budget_utilization: metrics.budget_utilization,
            trend,
            week_over_week_change: metrics.trends.week_over_week_change,
            days: metrics.data_points as u32,
            adsets,
            ads,
        }
        .sanitized()
    }

    /// Non-finite and negative numbers become zero.
    pub fn sanitized(mut self) -> Self {
        for v in [
            &mut self.budget,
            &mut self.spend,
            &mut self.impressions,
            &mut self.clicks,
            &mut self.conversions,
            &mut self.revenue,
            &mut self.ctr,
            &mut self.cpc,
            &mut self.roas,
            &mut self.budget_utilization,
        ] {
            *v = clean(*v);
        }
        if !self.week_over_week_change.is_finite() {
            self.week_over_week_change = 0.0;
        }
        self
    }

    pub fn daily_spend(&self) -> f64 {
        ratios::safe_ratio(self.spend, self.days.max(1) as f64)
    }

    pub fn daily_revenue(&self) -> f64 {
        ratios::safe_ratio(self.revenue, self.days.max(1) as f64)
    }

    pub fn daily_conversions(&self) -> f64 {
        ratios::safe_ratio(self.conversions, self.days.max(1) as f64)
    }

    pub fn label(&self) -> &str {
        if self.campaign_name.trim().is_empty() {
            "this campaign"
        } else {
            &self.campaign_name
        }
    }
}
