pub mod anthropic;
pub mod error;
pub mod json;

use crate::analytics::anomaly::Anomaly;
use crate::analytics::campaign::{CampaignSnapshot, PeriodMetrics};
use crate::domain::recommendation::Recommendation;
use chrono::NaiveDate;

#[derive(Debug, Clone)]
pub struct GenerateInput {
    pub week_id: NaiveDate,
    pub snapshot: CampaignSnapshot,
    pub metrics: PeriodMetrics,
    pub anomalies: Vec<Anomaly>,
}

impl GenerateInput {
    pub fn context_json(&self) -> serde_json::Value {
        serde_json::json!({
            "week_id": self.week_id,
            "campaign": self.snapshot,
            "period_metrics": self.metrics,
            "anomalies": self.anomalies,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Anthropic,
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn generate_recommendation(&self, input: GenerateInput) -> anyhow::Result<Recommendation>;
}
