use crate::domain::contract::LlmRecommendation;
use crate::domain::recommendation::Recommendation;
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Markdown fence, with or without a language tag.
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_recommendation(text: &str) -> anyhow::Result<Recommendation> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmRecommendation>(&json_str)
        .with_context(|| format!("LLM output is not valid recommendation JSON: {json_str}"))?;
    parsed.validate_and_into_recommendation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recommendation::RecommendationAction;
    use serde_json::json;

    fn body() -> String {
        json!({
            "action": "refresh_creative",
            "reasoning": "CTR fell 40% in two weeks",
            "impact": "Restores click volume",
            "confidence": 7,
            "implementation": "1. Ship two new hooks",
            "forecast": "CTR back to 1.2% within 7 days",
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "Here you go: {\"a\":1} hope it helps";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
        assert_eq!(extract_json("no json"), None);
    }

    #[test]
    fn parses_prose_wrapped_output() {
        let text = format!("Sure! Based on the data:\n{}\n", body());
        let r = parse_recommendation(&text).unwrap();
        assert_eq!(r.action, RecommendationAction::RefreshCreative);
        assert_eq!(r.confidence, 7);
    }

    #[test]
    fn rejects_malformed_output() {
        assert!(parse_recommendation("I cannot help with that").is_err());
        assert!(parse_recommendation("{\"action\": \"pause campaign\"}").is_err());
    }
}
