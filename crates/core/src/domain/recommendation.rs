use crate::analytics::anomaly::Anomaly;
use crate::time::week::WeekId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecommendationAction {
    #[serde(rename = "increase budget")]
    IncreaseBudget,
    #[serde(rename = "reduce budget")]
    ReduceBudget,
    #[serde(rename = "increase cpc")]
    IncreaseCpc,
    #[serde(rename = "reduce cpc")]
    ReduceCpc,
    #[serde(rename = "optimize targeting")]
    OptimizeTargeting,
    #[serde(rename = "pause campaign")]
    PauseCampaign,
    #[serde(rename = "restructure adsets")]
    RestructureAdsets,
    #[serde(rename = "pause underperforming ads")]
    PauseUnderperformingAds,
    #[serde(rename = "scale top performers")]
    ScaleTopPerformers,
    #[serde(rename = "refresh creative")]
    RefreshCreative,
    #[serde(rename = "expand audience")]
    ExpandAudience,
    #[serde(rename = "narrow targeting")]
    NarrowTargeting,
    #[serde(rename = "optimize bidding")]
    OptimizeBidding,
    #[serde(rename = "fix conversion tracking")]
    FixConversionTracking,
}

impl RecommendationAction {
    pub const ALL: [RecommendationAction; 14] = [
        Self::IncreaseBudget,
        Self::ReduceBudget,
        Self::IncreaseCpc,
        Self::ReduceCpc,
        Self::OptimizeTargeting,
        Self::PauseCampaign,
        Self::RestructureAdsets,
        Self::PauseUnderperformingAds,
        Self::ScaleTopPerformers,
        Self::RefreshCreative,
        Self::ExpandAudience,
        Self::NarrowTargeting,
        Self::OptimizeBidding,
        Self::FixConversionTracking,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IncreaseBudget => "increase budget",
            Self::ReduceBudget => "reduce budget",
            Self::IncreaseCpc => "increase cpc",
            Self::ReduceCpc => "reduce cpc",
            Self::OptimizeTargeting => "optimize targeting",
            Self::PauseCampaign => "pause campaign",
            Self::RestructureAdsets => "restructure adsets",
            Self::PauseUnderperformingAds => "pause underperforming ads",
            Self::ScaleTopPerformers => "scale top performers",
            Self::RefreshCreative => "refresh creative",
            Self::ExpandAudience => "expand audience",
            Self::NarrowTargeting => "narrow targeting",
            Self::OptimizeBidding => "optimize bidding",
            Self::FixConversionTracking => "fix conversion tracking",
        }
    }
}

impl fmt::Display for RecommendationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecommendationAction {
    type Err = anyhow::Error;

    /// Case-insensitive; `_` and `-` are accepted in place of spaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        Self::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("unknown recommendation action: {s:?}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecificActions {
    #[serde(default)]
    pub adsets_to_scale: Vec<String>,
    #[serde(default)]
    pub adsets_to_optimize: Vec<String>,
    #[serde(default)]
    pub adsets_to_pause: Vec<String>,
    #[serde(default)]
    pub ads_to_pause: Vec<String>,
    #[serde(default)]
    pub ads_to_duplicate: Vec<String>,
}

impl SpecificActions {
    pub fn is_empty(&self) -> bool {
        self.adsets_to_scale.is_empty()
            && self.adsets_to_optimize.is_empty()
            && self.adsets_to_pause.is_empty()
            && self.ads_to_pause.is_empty()
            && self.ads_to_duplicate.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub action: RecommendationAction,
    pub reasoning: String,
    pub impact: String,
    /// 1..=10
    pub confidence: u8,
    /// Numbered steps, one per line.
    pub implementation: String,
    pub forecast: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specific_actions: Option<SpecificActions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationSource {
    Llm,
    Rules,
}

impl RecommendationSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Rules => "rules",
        }
    }
}

impl FromStr for RecommendationSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "llm" => Ok(Self::Llm),
            "rules" => Ok(Self::Rules),
            other => anyhow::bail!("unknown recommendation source: {other}"),
        }
    }
}

/// A recommendation plus the context it was produced from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedRecommendation {
    pub source: RecommendationSource,
    pub recommendation: Recommendation,
    pub anomalies: Vec<Anomaly>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredRecommendation {
    pub id: uuid::Uuid,
    pub brand_id: String,
    pub campaign_id: String,
    pub week_id: WeekId,
    pub source: RecommendationSource,
    pub recommendation: Recommendation,
    pub anomalies: Vec<Anomaly>,
    pub generated_at: DateTime<Utc>,
}
