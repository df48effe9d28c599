//! Advertising ratios. Every function returns `0.0` for a non-positive denominator and never
//! yields NaN or infinity.

use serde::{Deserialize, Serialize};

/// ROAS above this with spend below [`ATTRIBUTION_SPEND_CEILING`] is treated as suspect.
pub const UNREALISTIC_ROAS: f64 = 20.0;
pub const ATTRIBUTION_SPEND_CEILING: f64 = 100.0;

pub fn safe_ratio(numerator: f64, denominator: f64) -> f64 {
    if !(denominator > 0.0) || !numerator.is_finite() || !denominator.is_finite() {
        return 0.0;
    }
    let out = numerator / denominator;
    if out.is_finite() {
        out
    } else {
        0.0
    }
}

pub fn ctr(clicks: f64, impressions: f64) -> f64 {
    safe_ratio(clicks * 100.0, impressions)
}

pub fn cpc(spend: f64, clicks: f64) -> f64 {
    safe_ratio(spend, clicks)
}

pub fn cpm(spend: f64, impressions: f64) -> f64 {
    safe_ratio(spend * 1000.0, impressions)
}

pub fn cost_per_result(spend: f64, results: f64) -> f64 {
    safe_ratio(spend, results)
}

pub fn roas(revenue: f64, spend: f64) -> f64 {
    safe_ratio(revenue, spend)
}

pub fn conversion_rate(conversions: f64, clicks: f64) -> f64 {
    safe_ratio(conversions * 100.0, clicks)
}

pub fn budget_utilization(spent: f64, budget: f64) -> f64 {
    safe_ratio(spent * 100.0, budget)
}

/// Ad-platform and storefront revenue kept apart. ROAS uses `platform_attributed` only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenueBreakdown {
    pub platform_attributed: f64,
    pub storefront: Option<f64>,
    pub total: f64,
}

impl RevenueBreakdown {
    pub fn new(platform_attributed: f64, storefront: Option<f64>) -> Self {
        Self {
            platform_attributed,
            storefront,
            total: storefront.unwrap_or(platform_attributed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnrealisticRoas,
    NegativeSpend,
    RevenueWithoutSpend,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQualityWarning {
    pub kind: WarningKind,
    pub message: String,
}

pub fn validate_totals(spend: f64, platform_revenue: f64) -> Vec<DataQualityWarning> {
    let mut out = Vec::new();

    if spend < 0.0 {
        out.push(DataQualityWarning {
            kind: WarningKind::NegativeSpend,
            message: format!("Spend is negative (${spend:.2}); check the ad account sync."),
        });
    }

    if spend <= 0.0 && platform_revenue > 0.0 {
        out.push(DataQualityWarning {
            kind: WarningKind::RevenueWithoutSpend,
            message: format!(
                "Revenue of ${platform_revenue:.2} is attributed with no recorded spend; \
                 double check attribution setup."
            ),
        });
    }

    let r = roas(platform_revenue, spend);
    if r > UNREALISTIC_ROAS && spend < ATTRIBUTION_SPEND_CEILING {
        out.push(DataQualityWarning {
            kind: WarningKind::UnrealisticRoas,
            message: format!(
                "ROAS of {r:.1}x on only ${spend:.2} spend is implausible; revenue and spend \
                 likely come from different tracking sources. Double check attribution setup."
            ),
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_denominators_return_zero() {
        assert_eq!(ctr(10.0, 0.0), 0.0);
        assert_eq!(cpc(10.0, 0.0), 0.0);
        assert_eq!(cpm(10.0, 0.0), 0.0);
        assert_eq!(roas(10.0, 0.0), 0.0);
        assert_eq!(conversion_rate(1.0, 0.0), 0.0);
        assert_eq!(budget_utilization(1.0, 0.0), 0.0);
        assert_eq!(cost_per_result(5.0, -1.0), 0.0);
    }

    #[test]
    fn never_returns_nan_or_infinity() {
        let samples = [0.0, -0.0, 1e-300, 1.0, f64::MAX, f64::NAN, f64::INFINITY, -5.0];
        for &n in &samples {
            for &d in &samples {
                let r = safe_ratio(n, d);
                assert!(r.is_finite(), "safe_ratio({n}, {d}) = {r}");
            }
        }
    }

    #[test]
    fn computes_standard_ratios() {
        assert_eq!(ctr(50.0, 10_000.0), 0.5);
        assert_eq!(cpc(50.0, 25.0), 2.0);
        assert_eq!(roas(300.0, 100.0), 3.0);
        assert_eq!(budget_utilization(96.0, 100.0), 96.0);
    }

    #[test]
    fn revenue_total_prefers_storefront_when_connected() {
        let b = RevenueBreakdown::new(120.0, Some(400.0));
        assert_eq!(b.total, 400.0);
        assert_eq!(b.platform_attributed, 120.0);
        assert_eq!(RevenueBreakdown::new(120.0, None).total, 120.0);
    }

    #[test]
    fn flags_unrealistic_roas_on_small_spend() {
        let w = validate_totals(40.0, 1_000.0);
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].kind, WarningKind::UnrealisticRoas);

        // Same ratio on a real budget is not flagged.
        assert!(validate_totals(5_000.0, 125_000.0).is_empty());
    }

    #[test]
    fn flags_revenue_without_spend_and_negative_spend() {
        let kinds: Vec<_> = validate_totals(0.0, 50.0).into_iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::RevenueWithoutSpend]);

        let kinds: Vec<_> = validate_totals(-3.0, 0.0).into_iter().map(|w| w.kind).collect();
        assert_eq!(kinds, vec![WarningKind::NegativeSpend]);
    }
}
