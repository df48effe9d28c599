use adlens_core::analytics::campaign::{CampaignSnapshot, PeriodMetrics};
use adlens_core::domain::recommendation::RecommendationAction;
use adlens_core::llm::anthropic::AnthropicClient;
use adlens_core::llm::error::LlmDiagnosticsError;
use adlens_core::llm::{GenerateInput, LlmClient};
use chrono::NaiveDate;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn input() -> GenerateInput {
    GenerateInput {
        week_id: NaiveDate::from_ymd_opt(2024, 5, 13).unwrap(),
        snapshot: CampaignSnapshot {
            campaign_id: "c1".into(),
            campaign_name: "Spring Sale".into(),
            spend: 50.0,
            impressions: 10_000.0,
            clicks: 50.0,
            ctr: 0.5,
            cpc: 1.0,
            days: 1,
            ..CampaignSnapshot::default()
        },
        metrics: PeriodMetrics::default(),
        anomalies: Vec::new(),
    }
}

fn client(server: &MockServer) -> AnthropicClient {
    AnthropicClient::new("test-key", server.uri(), Duration::from_secs(5)).unwrap()
}

fn tool_use_body() -> serde_json::Value {
    json!({
        "id": "msg_1",
        "type": "message",
        "role": "assistant",
        "content": [{
            "type": "tool_use",
            "id": "toolu_1",
            "name": "emit_recommendation",
            "input": {
                "action": "pause campaign",
                "reasoning": "$50.00 spent across 50 clicks with zero purchases",
                "impact": "Saves about $50 a day",
                "confidence": 9,
                "implementation": ["Pause the campaign", "Audit the purchase pixel"],
                "forecast": "Spend drops to $0 over 7 days"
            }
        }],
        "stop_reason": "tool_use"
    })
}

#[tokio::test]
async fn tool_use_response_becomes_recommendation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .and(header("x-api-key", "test-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body()))
        .expect(1)
        .mount(&server)
        .await;

    let rec = client(&server).generate_recommendation(input()).await.unwrap();

    assert_eq!(rec.action, RecommendationAction::PauseCampaign);
    assert_eq!(rec.confidence, 9);
    assert_eq!(
        rec.implementation,
        "1. Pause the campaign\n2. Audit the purchase pixel"
    );
    assert!(rec.specific_actions.is_none());
}

#[tokio::test]
async fn http_error_carries_diagnostics() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(
            ResponseTemplate::new(529)
                .set_body_json(json!({"type": "error", "error": {"type": "overloaded_error"}})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .generate_recommendation(input())
        .await
        .unwrap_err();

    let diag = LlmDiagnosticsError::find(&err).expect("diagnostics attached");
    assert_eq!(diag.stage, "http");
    assert!(diag.detail.contains("529"));
    assert!(diag.raw_response_json.is_some());
}

#[tokio::test]
async fn invalid_text_is_repaired_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "I think you should pause it."}]
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(tool_use_body()))
        .expect(1)
        .mount(&server)
        .await;

    let rec = client(&server).generate_recommendation(input()).await.unwrap();
    assert_eq!(rec.action, RecommendationAction::PauseCampaign);
}

#[tokio::test]
async fn out_of_range_confidence_is_rejected() {
    let server = MockServer::start().await;
    let mut body = tool_use_body();
    body["content"][0]["input"]["confidence"] = json!(14);
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = client(&server)
        .generate_recommendation(input())
        .await
        .unwrap_err();
    let diag = LlmDiagnosticsError::find(&err).expect("diagnostics attached");
    assert_eq!(diag.stage, "validate_tool_output");
}
