pub mod lock;
pub mod memory;
pub mod recommendations;
pub mod stats;

use crate::domain::recommendation::StoredRecommendation;
use crate::domain::records::{CampaignRecord, DailyRecord, StorefrontOrder};
use crate::time::calendar::DateRange;
use crate::time::week::WeekId;
use anyhow::Context;
use chrono::{DateTime, Utc};

pub async fn migrate(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("sqlx migrations failed")?;
    Ok(())
}

/// Read side: synced ad stats, campaign master rows and storefront orders.
#[async_trait::async_trait]
pub trait StatsSource: Send + Sync {
    /// Ad, ad set and account-level daily rows.
    async fn daily_records(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<Vec<DailyRecord>>;

    /// Campaign-level daily rows, used when the ad-level table is empty.
    async fn campaign_daily_records(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<Vec<DailyRecord>>;

    async fn campaigns(&self, brand_id: &str) -> anyhow::Result<Vec<CampaignRecord>>;

    /// `None` when the brand has no storefront connected.
    async fn storefront_orders(
        &self,
        brand_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<Vec<StorefrontOrder>>>;
}

/// Weekly recommendations, unique per (brand, campaign, week).
#[async_trait::async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn find(
        &self,
        brand_id: &str,
        campaign_id: &str,
        week: WeekId,
    ) -> anyhow::Result<Option<StoredRecommendation>>;

    /// Returns `false` when a recommendation for the same week already exists; the existing
    /// row is left untouched.
    async fn insert_if_absent(&self, rec: &StoredRecommendation) -> anyhow::Result<bool>;
}
