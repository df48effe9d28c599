use crate::domain::recommendation::{Recommendation, RecommendationAction, SpecificActions};
use anyhow::{ensure, Context};
use serde::{Deserialize, Serialize};

/// Shape the LLM is asked to emit. Looser than [`Recommendation`]; converted only through
/// [`LlmRecommendation::validate_and_into_recommendation`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmRecommendation {
    pub action: String,
    pub reasoning: String,
    pub impact: String,
    pub confidence: f64,
    pub implementation: Implementation,
    pub forecast: String,
    #[serde(default)]
    pub specific_actions: Option<SpecificActions>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Implementation {
    Text(String),
    Steps(Vec<String>),
}

impl Implementation {
    fn into_text(self) -> String {
        match self {
            Self::Text(s) => s.trim().to_string(),
            Self::Steps(steps) => steps
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .enumerate()
                .map(|(i, s)| format!("{}. {s}", i + 1))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

impl LlmRecommendation {
    pub fn validate_and_into_recommendation(self) -> anyhow::Result<Recommendation> {
        let action: RecommendationAction = self
            .action
            .parse()
            .with_context(|| format!("LLM output has unsupported action {:?}", self.action))?;

        ensure!(
            self.confidence.is_finite() && (1.0..=10.0).contains(&self.confidence.round()),
            "confidence must be between 1 and 10 (got {})",
            self.confidence
        );

        let reasoning = self.reasoning.trim().to_string();
        ensure!(!reasoning.is_empty(), "reasoning must be non-empty");

        let impact = self.impact.trim().to_string();
        ensure!(!impact.is_empty(), "impact must be non-empty");

        let implementation = self.implementation.into_text();
        ensure!(!implementation.is_empty(), "implementation must be non-empty");

        let forecast = self.forecast.trim().to_string();
        ensure!(!forecast.is_empty(), "forecast must be non-empty");

        Ok(Recommendation {
            action,
            reasoning,
            impact,
            confidence: self.confidence.round() as u8,
            implementation,
            forecast,
            specific_actions: self.specific_actions.filter(|s| !s.is_empty()),
        })
    }
}
