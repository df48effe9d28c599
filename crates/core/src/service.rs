//! Period metrics with graceful degradation, and the once-per-week recommendation gate.

use crate::advisor::Advisor;
use crate::analytics::aggregate::{
    aggregate_daily, prefer_secondary_when_empty, ConversionActions, DataSource, SourcedDays,
};
use crate::analytics::campaign::{
    calculate_period_metrics, Benchmarks, BudgetContext, CampaignSnapshot, PeriodInput,
    PeriodMetrics,
};
use crate::analytics::entities::summarize_entities;
use crate::analytics::storefront;
use crate::cache::{metrics_cache_key, Clock, ResponseCache, SystemClock};
use crate::config::Settings;
use crate::domain::recommendation::{GeneratedRecommendation, StoredRecommendation};
use crate::domain::records::{CampaignRecord, DailyRecord};
use crate::storage::recommendations::PgRecommendationStore;
use crate::storage::stats::PgStatsSource;
use crate::storage::{RecommendationStore, StatsSource};
use crate::time::calendar::{CalendarZone, DateRange};
use crate::time::week::WeekId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Days of history behind a weekly recommendation; two full weeks for week-over-week change.
pub const RECOMMENDATION_WINDOW_DAYS: u32 = 14;

const UNAVAILABLE_NOTICE: &str =
    "Performance data is temporarily unavailable. Figures will appear once the data source recovers.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignNotFound {
    pub brand_id: String,
    pub campaign_id: String,
}

impl fmt::Display for CampaignNotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "campaign {} not found for brand {}",
            self.campaign_id, self.brand_id
        )
    }
}

impl std::error::Error for CampaignNotFound {}

/// Result of asking for this week's recommendation.
#[derive(Debug, Clone, Serialize)]
pub struct WeeklyOutcome {
    /// `true` when a recommendation already existed for this week; `recommendation` is then
    /// the earlier one.
    pub blocked: bool,
    pub week_id: WeekId,
    pub next_available: DateTime<Utc>,
    pub recommendation: StoredRecommendation,
}

pub struct AnalyticsService {
    stats: Arc<dyn StatsSource>,
    store: Arc<dyn RecommendationStore>,
    advisor: Advisor,
    clock: Arc<dyn Clock>,
    cache: ResponseCache<PeriodMetrics>,
    cache_ttl: Duration,
    actions: ConversionActions,
    benchmarks: Benchmarks,
    server_zone: CalendarZone,
}

impl AnalyticsService {
    pub fn new(
        settings: &Settings,
        stats: Arc<dyn StatsSource>,
        store: Arc<dyn RecommendationStore>,
        advisor: Advisor,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stats,
            store,
            advisor,
            cache: ResponseCache::new(clock.clone()),
            clock,
            cache_ttl: settings.metrics_cache_ttl,
            actions: settings.conversion_actions.clone(),
            benchmarks: settings.benchmarks,
            server_zone: settings.server_timezone,
        }
    }

    /// Postgres-backed service on the system clock.
    pub fn postgres(settings: &Settings, pool: sqlx::PgPool) -> Self {
        Self::new(
            settings,
            Arc::new(PgStatsSource::new(pool.clone())),
            Arc::new(PgRecommendationStore::new(pool)),
            Advisor::from_settings(settings),
            Arc::new(SystemClock),
        )
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn current_week(&self) -> WeekId {
        WeekId::current(self.clock.now(), &self.server_zone)
    }

    pub fn server_zone(&self) -> CalendarZone {
        self.server_zone
    }

    pub async fn purge_cache(&self) -> usize {
        self.cache.purge_expired().await
    }

    /// Cached period metrics. Never fails: a data-source error yields a zeroed result with a
    /// notice, and that result is not cached.
    pub async fn period_metrics(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
        zone: CalendarZone,
    ) -> PeriodMetrics {
        let today = zone.today(self.clock.now());
        let key = metrics_cache_key(brand_id, range.from, range.to, &zone, today, campaign_id);
        let result = self
            .cache
            .get_or_compute(
                &key,
                || self.compute_metrics(brand_id, range, campaign_id, zone),
                self.cache_ttl,
                zone,
            )
            .await;

        match result {
            Ok(metrics) => metrics,
            Err(err) => {
                tracing::error!(brand_id, %range, error = %err, "period metrics unavailable");
                PeriodMetrics::empty(UNAVAILABLE_NOTICE)
            }
        }
    }

    async fn load_days(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<(SourcedDays, Vec<DailyRecord>)> {
        let records = self.stats.daily_records(brand_id, range, campaign_id).await?;
        let primary = aggregate_daily(&records, &self.actions);
        if !primary.iter().all(|d| d.is_zero()) {
            return Ok((prefer_secondary_when_empty(primary, Vec::new()), records));
        }

        let secondary_records = self
            .stats
            .campaign_daily_records(brand_id, range, campaign_id)
            .await?;
        let secondary = aggregate_daily(&secondary_records, &self.actions);
        let sourced = prefer_secondary_when_empty(primary, secondary);
        if sourced.source == DataSource::Secondary {
            tracing::debug!(brand_id, ?campaign_id, %range, "campaign-level stats substituted");
        }
        Ok((sourced, records))
    }

    async fn storefront_revenue(&self, brand_id: &str, range: DateRange, zone: CalendarZone) -> Option<f64> {
        let (from, to) = range.utc_bounds(&zone);
        match self.stats.storefront_orders(brand_id, from, to).await {
            Ok(Some(orders)) => Some(storefront::total_revenue(&storefront::daily_revenue(
                &orders, &zone,
            ))),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(brand_id, error = %err, "storefront orders unavailable; reporting platform revenue only");
                None
            }
        }
    }

    async fn budget(&self, brand_id: &str, campaign_id: Option<&str>) -> anyhow::Result<Option<BudgetContext>> {
        let campaigns = self.stats.campaigns(brand_id).await?;
        let budget = match campaign_id {
            Some(id) => campaigns.iter().find(|c| c.id == id).map(BudgetContext::from),
            None => {
                let total = campaigns
                    .iter()
                    .filter(|c| c.is_active())
                    .fold(BudgetContext::default(), |acc, c| BudgetContext {
                        budget: acc.budget + c.budget,
                        spent: acc.spent + c.spent,
                    });
                (total.budget > 0.0).then_some(total)
            }
        };
        Ok(budget)
    }

    async fn compute_metrics(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
        zone: CalendarZone,
    ) -> anyhow::Result<PeriodMetrics> {
        let (sourced, _records) = self.load_days(brand_id, range, campaign_id).await?;
        let budget = self.budget(brand_id, campaign_id).await?;
        let storefront_revenue = match campaign_id {
            // Store revenue is not attributable to a single campaign.
            Some(_) => None,
            None => self.storefront_revenue(brand_id, range, zone).await,
        };

        Ok(calculate_period_metrics(
            PeriodInput {
                days: &sourced.days,
                budget,
                storefront_revenue,
                source: sourced.source,
                notice: sourced.notice,
            },
            &self.benchmarks,
        ))
    }

    /// Metrics plus the flat snapshot the rule engine reads, for one campaign.
    pub async fn campaign_snapshot(
        &self,
        brand_id: &str,
        campaign: &CampaignRecord,
        range: DateRange,
    ) -> anyhow::Result<(CampaignSnapshot, PeriodMetrics)> {
        let (sourced, records) = self.load_days(brand_id, range, Some(campaign.id.as_str())).await?;
        let metrics = calculate_period_metrics(
            PeriodInput {
                days: &sourced.days,
                budget: Some(BudgetContext::from(campaign)),
                storefront_revenue: None,
                source: sourced.source,
                notice: sourced.notice.clone(),
            },
            &self.benchmarks,
        );
        let entities = summarize_entities(&records, &self.actions);
        let snapshot = CampaignSnapshot::from_metrics(campaign, &metrics, &sourced.days, entities);
        Ok((snapshot, metrics))
    }

    /// Deduplicated spend per campaign over `range`.
    pub async fn campaign_spend(
        &self,
        brand_id: &str,
        range: DateRange,
    ) -> anyhow::Result<HashMap<String, f64>> {
        let records = self.stats.daily_records(brand_id, range, None).await?;
        let mut by_campaign: HashMap<String, Vec<DailyRecord>> = HashMap::new();
        for r in records {
            if let Some(id) = r.campaign_id.clone() {
                by_campaign.entry(id).or_default().push(r);
            }
        }
        Ok(by_campaign
            .into_iter()
            .map(|(id, records)| {
                let spend = aggregate_daily(&records, &self.actions)
                    .iter()
                    .map(|d| d.spend)
                    .sum::<f64>();
                (id, spend)
            })
            .collect())
    }

    pub async fn campaigns(&self, brand_id: &str) -> anyhow::Result<Vec<CampaignRecord>> {
        self.stats.campaigns(brand_id).await
    }

    async fn find_campaign(&self, brand_id: &str, campaign_id: &str) -> anyhow::Result<CampaignRecord> {
        self.stats
            .campaigns(brand_id)
            .await?
            .into_iter()
            .find(|c| c.id == campaign_id)
            .ok_or_else(|| {
                CampaignNotFound {
                    brand_id: brand_id.to_string(),
                    campaign_id: campaign_id.to_string(),
                }
                .into()
            })
    }

    /// This week's stored recommendation, if any.
    pub async fn current_recommendation(
        &self,
        brand_id: &str,
        campaign_id: &str,
    ) -> anyhow::Result<Option<StoredRecommendation>> {
        self.store
            .find(brand_id, campaign_id, self.current_week())
            .await
    }

    /// Generates without persisting or consulting the weekly gate.
    pub async fn preview(
        &self,
        brand_id: &str,
        campaign: &CampaignRecord,
    ) -> anyhow::Result<GeneratedRecommendation> {
        let now = self.clock.now();
        let week = WeekId::current(now, &self.server_zone);
        let range = DateRange::last_days(self.server_zone.today(now), RECOMMENDATION_WINDOW_DAYS);
        let (snapshot, metrics) = self.campaign_snapshot(brand_id, campaign, range).await?;
        Ok(self.advisor.advise(week, snapshot, metrics).await)
    }

    /// At most one recommendation per (brand, campaign) per Monday–Sunday week of server time.
    /// The week is always derived from the server clock; nothing the client sends is consulted.
    pub async fn generate_weekly(
        &self,
        brand_id: &str,
        campaign_id: &str,
    ) -> anyhow::Result<WeeklyOutcome> {
        let now = self.clock.now();
        let week = WeekId::current(now, &self.server_zone);
        let next_available = week.next_available(&self.server_zone);
        let blocked = |existing: StoredRecommendation| WeeklyOutcome {
            blocked: true,
            week_id: week,
            next_available,
            recommendation: existing,
        };

        if let Some(existing) = self.store.find(brand_id, campaign_id, week).await? {
            tracing::info!(brand_id, campaign_id, week_id = %week, "weekly recommendation already generated");
            return Ok(blocked(existing));
        }

        let campaign = self.find_campaign(brand_id, campaign_id).await?;
        let generated = self.preview(brand_id, &campaign).await?;
        let stored = StoredRecommendation {
            id: uuid::Uuid::new_v4(),
            brand_id: brand_id.to_string(),
            campaign_id: campaign_id.to_string(),
            week_id: week,
            source: generated.source,
            recommendation: generated.recommendation,
            anomalies: generated.anomalies,
            generated_at: now,
        };

        if !self.store.insert_if_absent(&stored).await? {
            // Lost a race with a concurrent request for the same week.
            let existing = self
                .store
                .find(brand_id, campaign_id, week)
                .await?
                .unwrap_or(stored);
            return Ok(blocked(existing));
        }

        tracing::info!(
            brand_id,
            campaign_id,
            week_id = %week,
            source = stored.source.as_str(),
            action = %stored.recommendation.action,
            "weekly recommendation generated"
        );
        Ok(WeeklyOutcome {
            blocked: false,
            week_id: week,
            next_available,
            recommendation: stored,
        })
    }
}
