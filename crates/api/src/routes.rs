use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use adlens_core::analytics::campaign::PeriodMetrics;
use adlens_core::domain::recommendation::{
    Recommendation, RecommendationSource, StoredRecommendation,
};
use adlens_core::service::{AnalyticsService, CampaignNotFound, WeeklyOutcome};
use adlens_core::time::calendar::{CalendarZone, DateRange};
use adlens_core::time::range::{parse_range, DEFAULT_RANGE_DAYS};
use adlens_core::time::week::WeekId;

const DEGRADED_NOTICE: &str =
    "Analytics storage is not connected. Figures will appear once the database is reachable.";

#[derive(Clone)]
pub struct AppState {
    /// `None` when the API started without a database.
    pub service: Option<Arc<AnalyticsService>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/brands/:brand_id/metrics", get(get_metrics))
        .route(
            "/brands/:brand_id/campaigns/:campaign_id/recommendation",
            get(get_recommendation).post(post_recommendation),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    tz: Option<String>,
    campaign_id: Option<String>,
    range: Option<String>,
}

fn resolve_range(
    q: &MetricsQuery,
    now: DateTime<Utc>,
    zone: &CalendarZone,
) -> Result<DateRange, StatusCode> {
    if let Some(text) = q.range.as_deref().filter(|t| !t.trim().is_empty()) {
        return parse_range(text, now, zone).ok_or(StatusCode::BAD_REQUEST);
    }
    match (q.from, q.to) {
        (Some(from), Some(to)) => DateRange::new(from, to).map_err(|_| StatusCode::BAD_REQUEST),
        (Some(day), None) | (None, Some(day)) => Ok(DateRange::single(day)),
        (None, None) => Ok(DateRange::last_days(zone.today(now), DEFAULT_RANGE_DAYS)),
    }
}

async fn get_metrics(
    State(state): State<AppState>,
    Path(brand_id): Path<String>,
    Query(q): Query<MetricsQuery>,
) -> Result<Json<PeriodMetrics>, StatusCode> {
    let Some(service) = &state.service else {
        return Ok(Json(PeriodMetrics::empty(DEGRADED_NOTICE)));
    };

    let zone = CalendarZone::parse_or_local(q.tz.as_deref());
    let range = resolve_range(&q, service.now(), &zone)?;
    let metrics = service
        .period_metrics(&brand_id, range, q.campaign_id.as_deref(), zone)
        .await;
    Ok(Json(metrics))
}

#[derive(Debug, Serialize)]
pub struct ApiRecommendation {
    id: uuid::Uuid,
    week_id: WeekId,
    source: RecommendationSource,
    generated_at: DateTime<Utc>,
    recommendation: Recommendation,
}

impl From<StoredRecommendation> for ApiRecommendation {
    fn from(r: StoredRecommendation) -> Self {
        Self {
            id: r.id,
            week_id: r.week_id,
            source: r.source,
            generated_at: r.generated_at,
            recommendation: r.recommendation,
        }
    }
}

async fn get_recommendation(
    State(state): State<AppState>,
    Path((brand_id, campaign_id)): Path<(String, String)>,
) -> Result<Json<ApiRecommendation>, StatusCode> {
    let Some(service) = &state.service else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let stored = service
        .current_recommendation(&brand_id, &campaign_id)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(stored.into()))
}

#[derive(Debug, Serialize)]
pub struct ApiWeeklyOutcome {
    blocked: bool,
    week_id: WeekId,
    next_available: DateTime<Utc>,
    source: Option<RecommendationSource>,
    recommendation: Option<Recommendation>,
}

impl From<WeeklyOutcome> for ApiWeeklyOutcome {
    fn from(o: WeeklyOutcome) -> Self {
        Self {
            blocked: o.blocked,
            week_id: o.week_id,
            next_available: o.next_available,
            source: Some(o.recommendation.source),
            recommendation: Some(o.recommendation.recommendation),
        }
    }
}

/// The week comes from the server clock; query parameters and headers are not consulted.
async fn post_recommendation(
    State(state): State<AppState>,
    Path((brand_id, campaign_id)): Path<(String, String)>,
) -> Result<Json<ApiWeeklyOutcome>, StatusCode> {
    let Some(service) = &state.service else {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    };

    let outcome = service
        .generate_weekly(&brand_id, &campaign_id)
        .await
        .map_err(|e| {
            if e.downcast_ref::<CampaignNotFound>().is_some() {
                return StatusCode::NOT_FOUND;
            }
            sentry_anyhow::capture_anyhow(&e);
            tracing::error!(%brand_id, %campaign_id, error = %e, "weekly recommendation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use adlens_core::advisor::Advisor;
    use adlens_core::analytics::rules::RuleEngine;
    use adlens_core::cache::FixedClock;
    use adlens_core::config::Settings;
    use adlens_core::domain::records::{CampaignRecord, DailyRecord, EntityLevel};
    use adlens_core::storage::memory::{BrandData, MemoryRecommendationStore, MemoryStatsSource};
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use chrono::TimeZone;
    use serde_json::Value;
    use tower::ServiceExt;

    async fn app() -> Router {
        let stats = Arc::new(MemoryStatsSource::new());
        let day = NaiveDate::from_ymd_opt(2024, 5, 14).unwrap();
        stats
            .put(
                "b1",
                BrandData {
                    daily: vec![DailyRecord {
                        level: Some(EntityLevel::Ad),
                        campaign_id: Some("c1".into()),
                        spend: Some(50.0),
                        impressions: 10_000,
                        clicks: 50,
                        ..DailyRecord::new(day, "ad_1")
                    }],
                    campaigns: vec![CampaignRecord {
                        id: "c1".into(),
                        name: "Spring Sale".into(),
                        status: "ACTIVE".into(),
                        budget: 1_000.0,
                        spent: 50.0,
                        objective: None,
                    }],
                    ..BrandData::default()
                },
            )
            .await;

        let settings = Settings {
            server_timezone: CalendarZone::Named(chrono_tz::UTC),
            ..Settings::default()
        };
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap());
        let service = AnalyticsService::new(
            &settings,
            stats,
            Arc::new(MemoryRecommendationStore::new()),
            Advisor::rules_only(RuleEngine::default()),
            Arc::new(clock),
        );
        router(AppState {
            service: Some(Arc::new(service)),
        })
    }

    async fn call(app: Router, method: Method, uri: &str) -> (StatusCode, Value) {
        let res = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = res.status();
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn healthz_ok() {
        let res = app()
            .await
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_for_explicit_range() {
        let (status, body) = call(
            app().await,
            Method::GET,
            "/brands/b1/metrics?from=2024-05-14&to=2024-05-14&tz=UTC",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ctr"], 0.5);
        assert_eq!(body["roas"], 0.0);
        assert_eq!(body["totals"]["spend"], 50.0);
    }

    #[tokio::test]
    async fn metrics_accept_free_text_range() {
        let (status, body) =
            call(app().await, Method::GET, "/brands/b1/metrics?range=yesterday&tz=UTC").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totals"]["spend"], 50.0);

        let (status, _) =
            call(app().await, Method::GET, "/brands/b1/metrics?range=next%20fortnight").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_reject_range_past_the_calendar() {
        let (status, _) = call(
            app().await,
            Method::GET,
            "/brands/b1/metrics?range=last%20100000000%20days",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn metrics_reject_inverted_range() {
        let (status, _) = call(
            app().await,
            Method::GET,
            "/brands/b1/metrics?from=2024-05-14&to=2024-05-01",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_post_in_week_is_blocked_whatever_the_client_timezone() {
        let app = app().await;

        let (status, first) = call(
            app.clone(),
            Method::POST,
            "/brands/b1/campaigns/c1/recommendation?tz=Pacific/Kiritimati",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["blocked"], false);
        assert_eq!(first["week_id"], "2024-05-13");
        assert_eq!(first["source"], "rules");
        assert_eq!(first["recommendation"]["action"], "pause campaign");
        assert_eq!(first["recommendation"]["confidence"], 10);

        let (status, second) = call(
            app.clone(),
            Method::POST,
            "/brands/b1/campaigns/c1/recommendation?tz=Pacific/Pago_Pago",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(second["blocked"], true);
        assert_eq!(second["week_id"], "2024-05-13");
        assert_eq!(second["next_available"], "2024-05-20T00:00:00Z");

        let (status, stored) =
            call(app, Method::GET, "/brands/b1/campaigns/c1/recommendation").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(stored["week_id"], "2024-05-13");
    }

    #[tokio::test]
    async fn unknown_campaign_is_404() {
        let (status, _) =
            call(app().await, Method::POST, "/brands/b1/campaigns/zzz/recommendation").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) =
            call(app().await, Method::GET, "/brands/b1/campaigns/c1/recommendation").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn degraded_mode() {
        let app = router(AppState { service: None });

        let (status, body) = call(app.clone(), Method::GET, "/brands/b1/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["notice"].is_string());
        assert_eq!(body["totals"]["spend"], 0.0);

        let (status, _) =
            call(app, Method::POST, "/brands/b1/campaigns/c1/recommendation").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
