use crate::analytics::campaign::{CampaignSnapshot, PeriodMetrics};
use crate::analytics::rules::{RuleEngine, RuleThresholds};
use crate::config::Settings;
use crate::domain::recommendation::{GeneratedRecommendation, RecommendationSource};
use crate::llm::anthropic::AnthropicClient;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{GenerateInput, LlmClient};
use crate::time::week::WeekId;
use std::sync::Arc;
use std::time::Duration;

/// LLM first, rule engine when the LLM is missing, slow, failing or returns junk.
pub struct Advisor {
    llm: Option<Arc<dyn LlmClient>>,
    rules: RuleEngine,
    timeout: Duration,
}

impl Advisor {
    pub fn new(llm: Option<Arc<dyn LlmClient>>, rules: RuleEngine, timeout: Duration) -> Self {
        Self {
            llm,
            rules,
            timeout,
        }
    }

    pub fn rules_only(rules: RuleEngine) -> Self {
        Self::new(None, rules, Duration::ZERO)
    }

    /// Anthropic-backed when `ANTHROPIC_API_KEY` is set, rules only otherwise.
    pub fn from_settings(settings: &Settings) -> Self {
        let rules = RuleEngine::standard(
            RuleThresholds::default().with_target_roas(settings.target_roas),
        );
        match AnthropicClient::from_settings(settings) {
            Ok(client) => Self::new(Some(Arc::new(client)), rules, settings.llm_timeout),
            Err(err) => {
                tracing::warn!(error = %err, "LLM disabled; recommendations come from the rule engine");
                Self::rules_only(rules)
            }
        }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    pub async fn advise(
        &self,
        week: WeekId,
        snapshot: CampaignSnapshot,
        metrics: PeriodMetrics,
    ) -> GeneratedRecommendation {
        let snapshot = snapshot.sanitized();
        let Some(llm) = &self.llm else {
            return self.rules.recommend(&snapshot);
        };

        let anomalies = self.rules.detect(&snapshot);
        let input = GenerateInput {
            week_id: week.monday(),
            snapshot: snapshot.clone(),
            metrics,
            anomalies: anomalies.clone(),
        };

        match tokio::time::timeout(self.timeout, llm.generate_recommendation(input)).await {
            Ok(Ok(recommendation)) => {
                tracing::info!(
                    campaign_id = %snapshot.campaign_id,
                    provider = ?llm.provider(),
                    action = %recommendation.action,
                    "LLM recommendation accepted"
                );
                return GeneratedRecommendation {
                    source: RecommendationSource::Llm,
                    recommendation,
                    anomalies,
                };
            }
            Ok(Err(err)) => {
                let stage = LlmDiagnosticsError::find(&err).map(|d| d.stage).unwrap_or("request");
                tracing::warn!(
                    campaign_id = %snapshot.campaign_id,
                    stage,
                    error = %err,
                    "LLM recommendation failed; using rule engine"
                );
            }
            Err(_) => {
                tracing::warn!(
                    campaign_id = %snapshot.campaign_id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "LLM recommendation timed out; using rule engine"
                );
            }
        }

        self.rules.recommend(&snapshot)
    }
}
