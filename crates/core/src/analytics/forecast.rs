use crate::analytics::campaign::CampaignSnapshot;
use crate::analytics::ratios;
use crate::domain::recommendation::RecommendationAction;
use serde::{Deserialize, Serialize};

pub const FORECAST_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub action: RecommendationAction,
    pub horizon_days: u32,
    pub spend: f64,
    pub revenue: f64,
    pub conversions: f64,
    pub roas: f64,
}

/// (spend multiplier, efficiency multiplier) expected from an action.
fn action_effect(action: RecommendationAction) -> (f64, f64) {
    use RecommendationAction::*;
    match action {
        PauseCampaign => (0.0, 0.0),
        IncreaseBudget => (1.6, 0.9),
        ScaleTopPerformers => (1.3, 0.95),
        ExpandAudience => (1.2, 0.95),
        ReduceBudget => (0.6, 1.1),
        IncreaseCpc => (1.2, 1.0),
        ReduceCpc => (1.0, 1.15),
        PauseUnderperformingAds => (0.85, 1.15),
        OptimizeTargeting | NarrowTargeting => (0.9, 1.2),
        RefreshCreative | OptimizeBidding | RestructureAdsets => (1.0, 1.1),
        FixConversionTracking => (1.0, 1.0),
    }
}

/// Seven-day projection from the window's daily averages, adjusted for `action`.
pub fn performance_forecast(s: &CampaignSnapshot, action: RecommendationAction) -> Forecast {
    let (spend_mult, efficiency) = action_effect(action);
    let horizon = FORECAST_DAYS as f64;

    let spend = s.daily_spend() * horizon * spend_mult;
    let revenue = s.daily_revenue() * horizon * spend_mult * efficiency;
    let conversions = s.daily_conversions() * horizon * spend_mult * efficiency;

    Forecast {
        action,
        horizon_days: FORECAST_DAYS,
        spend,
        revenue,
        conversions,
        roas: ratios::roas(revenue, spend),
    }
}

impl Forecast {
    pub fn describe(&self, s: &CampaignSnapshot) -> String {
        if self.action == RecommendationAction::PauseCampaign {
            return format!(
                "Pausing saves about ${:.2} over the next {} days that would otherwise return ~${:.2}.",
                s.daily_spend() * self.horizon_days as f64,
                self.horizon_days,
                s.daily_revenue() * self.horizon_days as f64,
            );
        }
        format!(
            "Next {} days: ~${:.2} spend, ~${:.2} attributed revenue (ROAS {:.2}x), ~{:.1} conversions.",
            self.horizon_days, self.spend, self.revenue, self.roas, self.conversions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> CampaignSnapshot {
        CampaignSnapshot {
            spend: 140.0,
            revenue: 420.0,
            conversions: 14.0,
            days: 14,
            ..CampaignSnapshot::default()
        }
    }

    #[test]
    fn neutral_action_projects_current_run_rate() {
        let f = performance_forecast(&snapshot(), RecommendationAction::FixConversionTracking);
        assert_eq!(f.spend, 70.0);
        assert_eq!(f.revenue, 210.0);
        assert_eq!(f.conversions, 7.0);
        assert_eq!(f.roas, 3.0);
    }

    #[test]
    fn pausing_projects_zero_and_never_nan() {
        let f = performance_forecast(&snapshot(), RecommendationAction::PauseCampaign);
        assert_eq!(f.spend, 0.0);
        assert_eq!(f.roas, 0.0);
        assert!(f.describe(&snapshot()).contains("$70.00"));

        let empty = performance_forecast(&CampaignSnapshot::default(), RecommendationAction::IncreaseBudget);
        assert_eq!(empty.roas, 0.0);
        assert!(empty.spend.is_finite());
    }

    #[test]
    fn scaling_trades_efficiency_for_volume() {
        let f = performance_forecast(&snapshot(), RecommendationAction::IncreaseBudget);
        assert!(f.spend > 70.0);
        assert!(f.roas < 3.0);
    }
}
