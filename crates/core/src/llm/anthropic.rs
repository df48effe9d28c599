use crate::config::Settings;
use crate::domain::contract::LlmRecommendation;
use crate::domain::recommendation::{Recommendation, RecommendationAction};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::json;
use crate::llm::{GenerateInput, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const REPAIR_ATTEMPTS: u32 = 1;

const TOOL_NAME_EMIT_RECOMMENDATION: &str = "emit_recommendation";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: base_url.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>, max_tokens: u32) -> Self {
        self.model = model.into();
        self.max_tokens = max_tokens;
        self
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self::new(api_key, base_url, Duration::from_secs(timeout_secs))?
            .with_model(model, max_tokens))
    }

    async fn create_message(
        &self,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: "http",
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn tools() -> Vec<Tool> {
        let actions: Vec<&str> = RecommendationAction::ALL.iter().map(|a| a.as_str()).collect();
        let names = serde_json::json!({"type": "array", "items": {"type": "string"}});
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["action", "reasoning", "impact", "confidence", "implementation", "forecast"],
            "properties": {
                "action": {"type": "string", "enum": actions},
                "reasoning": {"type": "string"},
                "impact": {"type": "string"},
                "confidence": {"type": "integer", "minimum": 1, "maximum": 10},
                "implementation": {"type": "string"},
                "forecast": {"type": "string"},
                "specific_actions": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": {
                        "adsets_to_scale": names.clone(),
                        "adsets_to_optimize": names.clone(),
                        "adsets_to_pause": names.clone(),
                        "ads_to_pause": names.clone(),
                        "ads_to_duplicate": names
                    }
                }
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_RECOMMENDATION,
            description: "Emit the single campaign recommendation as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_RECOMMENDATION,
        }
    }

    fn system_prompt() -> String {
        let actions = RecommendationAction::ALL
            .iter()
            .map(|a| format!("\"{a}\""))
            .collect::<Vec<_>>()
            .join(", ");
        [
            "You are a senior Meta Ads performance marketer advising a small e-commerce brand.".to_string(),
            "Pick exactly ONE primary action for the campaign for this week.".to_string(),
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.".to_string(),
            "Output schema:".to_string(),
            "{".to_string(),
            "  \"action\": one of the allowed actions,".to_string(),
            "  \"reasoning\": \"why, citing the numbers\",".to_string(),
            "  \"impact\": \"expected effect in dollars or percent\",".to_string(),
            "  \"confidence\": 1-10,".to_string(),
            "  \"implementation\": \"numbered steps\",".to_string(),
            "  \"forecast\": \"7 day projection\",".to_string(),
            "  \"specific_actions\": {\"adsets_to_scale\": [], \"adsets_to_optimize\": [], \"adsets_to_pause\": [], \"ads_to_pause\": [], \"ads_to_duplicate\": []}".to_string(),
            "}".to_string(),
            format!("Allowed actions: {actions}"),
            "- Every number you cite must come from the provided data.".to_string(),
            "- specific_actions may only name ad sets and ads present in the data.".to_string(),
        ]
        .join("\n")
    }

    fn user_prompt(input: &GenerateInput) -> String {
        format!(
            "Task: Recommend this week's action (week starting {}).\n\nCampaign data JSON:\n{}",
            input.week_id,
            input.context_json()
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT a valid recommendation.\n\n\
TASK: Output ONLY a single JSON object with keys action, reasoning, impact, confidence, \
implementation, forecast and optionally specific_actions.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- action MUST be one of the allowed actions.\n\
- confidence MUST be an integer from 1 to 10.\n\
- All text fields MUST be non-empty.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_recommendation(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<LlmRecommendation>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_RECOMMENDATION {
                    let parsed = serde_json::from_value::<LlmRecommendation>(input.clone())
                        .context("failed to decode tool_use.input into LlmRecommendation")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    fn request(&self, content: String) -> CreateMessageRequest {
        CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content,
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        }
    }

    async fn try_parse_with_repairs(
        &self,
        input: &GenerateInput,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<Recommendation> {
        let mut last_err = match json::parse_recommendation(&initial_text) {
            Ok(rec) => return Ok(rec),
            Err(err) => err,
        };
        let mut last_text = initial_text;
        let mut last_raw_json = initial_raw_json;

        for attempt in 1..=REPAIR_ATTEMPTS {
            let (repair_raw_json, repair_res) = self
                .create_message(self.request(Self::repair_prompt(&last_text)))
                .await?;

            let parsed = match Self::response_tool_recommendation(&repair_res) {
                Ok(Some(tool)) => tool.validate_and_into_recommendation(),
                Ok(None) => json::parse_recommendation(&Self::response_text(&repair_res)),
                Err(err) => Err(err),
            };
            match parsed {
                Ok(rec) => return Ok(rec),
                Err(err) => {
                    last_err = err;
                    last_text = Self::response_text(&repair_res);
                    last_raw_json = repair_raw_json;
                    tracing::warn!(
                        attempt,
                        campaign_id = %input.snapshot.campaign_id,
                        error = %last_err,
                        "LLM output still invalid after repair attempt"
                    );
                }
            }
        }

        Err(LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: "parse_after_repair",
            detail: format!("final_error={last_err}"),
            raw_output: Some(last_text),
            raw_response_json: Some(last_raw_json),
        }
        .into())
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn generate_recommendation(&self, input: GenerateInput) -> anyhow::Result<Recommendation> {
        let (raw_json, res) = self
            .create_message(self.request(Self::user_prompt(&input)))
            .await?;

        if let Some(tool) = Self::response_tool_recommendation(&res)? {
            return tool.validate_and_into_recommendation().map_err(|err| {
                LlmDiagnosticsError {
                    provider: Provider::Anthropic,
                    stage: "validate_tool_output",
                    detail: err.to_string(),
                    raw_output: None,
                    raw_response_json: Some(raw_json),
                }
                .into()
            });
        }

        let text = Self::response_text(&res);
        self.try_parse_with_repairs(&input, text, raw_json).await
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}
