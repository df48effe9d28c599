use adlens_core::domain::records::CampaignRecord;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct CampaignSelection {
    /// Upper bound on campaigns processed per brand and run.
    pub max_campaigns: usize,

    /// Days of spend history used to rank campaigns.
    pub lookback_days: u32,

    /// Campaigns that spent less than this over the lookback window are skipped.
    pub min_spend: f64,
}

impl Default for CampaignSelection {
    fn default() -> Self {
        Self {
            max_campaigns: 25,
            lookback_days: 7,
            min_spend: 10.0,
        }
    }
}

impl CampaignSelection {
    pub fn from_env() -> Self {
        let mut out = Self::default();

        if let Ok(s) = std::env::var("WORKER_MAX_CAMPAIGNS") {
            if let Ok(n) = s.parse::<usize>() {
                out.max_campaigns = n;
            }
        }

        if let Ok(s) = std::env::var("WORKER_LOOKBACK_DAYS") {
            if let Ok(n) = s.parse::<u32>() {
                out.lookback_days = n.max(1);
            }
        }

        if let Ok(s) = std::env::var("WORKER_MIN_SPEND") {
            if let Ok(n) = s.parse::<f64>() {
                if n.is_finite() {
                    out.min_spend = n.max(0.0);
                }
            }
        }

        out
    }
}

/// Active campaigns above the spend floor, highest spend first, capped at `max_campaigns`.
pub fn select_campaigns(
    campaigns: Vec<CampaignRecord>,
    spend: &HashMap<String, f64>,
    opts: &CampaignSelection,
) -> Vec<(CampaignRecord, f64)> {
    let mut scored: Vec<(CampaignRecord, f64)> = campaigns
        .into_iter()
        .filter(CampaignRecord::is_active)
        .map(|c| {
            let s = spend.get(&c.id).copied().unwrap_or(0.0);
            (c, s)
        })
        .filter(|(_, s)| *s >= opts.min_spend)
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.id.cmp(&b.0.id))
    });
    scored.truncate(opts.max_campaigns);
    scored
}
