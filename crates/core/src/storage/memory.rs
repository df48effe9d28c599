//! In-memory adapters for tests and local runs without Postgres.

use crate::domain::recommendation::StoredRecommendation;
use crate::domain::records::{CampaignRecord, DailyRecord, StorefrontOrder};
use crate::storage::{RecommendationStore, StatsSource};
use crate::time::calendar::DateRange;
use crate::time::week::WeekId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct BrandData {
    pub daily: Vec<DailyRecord>,
    pub campaign_daily: Vec<DailyRecord>,
    pub campaigns: Vec<CampaignRecord>,
    pub orders: Option<Vec<StorefrontOrder>>,
}

#[derive(Debug, Default)]
pub struct MemoryStatsSource {
    brands: RwLock<HashMap<String, BrandData>>,
    failing: RwLock<bool>,
}

impl MemoryStatsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, brand_id: impl Into<String>, data: BrandData) {
        self.brands.write().await.insert(brand_id.into(), data);
    }

    /// Every read fails while set.
    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    async fn check(&self) -> anyhow::Result<()> {
        anyhow::ensure!(!*self.failing.read().await, "stats source unavailable");
        Ok(())
    }

    async fn filtered(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
        pick: fn(&BrandData) -> &Vec<DailyRecord>,
    ) -> anyhow::Result<Vec<DailyRecord>> {
        self.check().await?;
        let brands = self.brands.read().await;
        let Some(data) = brands.get(brand_id) else {
            return Ok(Vec::new());
        };
        Ok(pick(data)
            .iter()
            .filter(|r| range.contains(r.date))
            .filter(|r| campaign_id.is_none() || r.campaign_id.as_deref() == campaign_id)
            .cloned()
            .collect())
    }
}

#[async_trait::async_trait]
impl StatsSource for MemoryStatsSource {
    async fn daily_records(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<Vec<DailyRecord>> {
        self.filtered(brand_id, range, campaign_id, |d| &d.daily).await
    }

    async fn campaign_daily_records(
        &self,
        brand_id: &str,
        range: DateRange,
        campaign_id: Option<&str>,
    ) -> anyhow::Result<Vec<DailyRecord>> {
        self.filtered(brand_id, range, campaign_id, |d| &d.campaign_daily)
            .await
    }

    async fn campaigns(&self, brand_id: &str) -> anyhow::Result<Vec<CampaignRecord>> {
        self.check().await?;
        Ok(self
            .brands
            .read()
            .await
            .get(brand_id)
            .map(|d| d.campaigns.clone())
            .unwrap_or_default())
    }

    async fn storefront_orders(
        &self,
        brand_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Option<Vec<StorefrontOrder>>> {
        self.check().await?;
        let brands = self.brands.read().await;
        Ok(brands.get(brand_id).and_then(|d| d.orders.as_ref()).map(|orders| {
            orders
                .iter()
                .filter(|o| o.created_at >= from && o.created_at < to)
                .cloned()
                .collect()
        }))
    }
}

#[derive(Debug, Default)]
pub struct MemoryRecommendationStore {
    rows: RwLock<HashMap<(String, String, WeekId), StoredRecommendation>>,
}

impl MemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl RecommendationStore for MemoryRecommendationStore {
    async fn find(
        &self,
        brand_id: &str,
        campaign_id: &str,
        week: WeekId,
    ) -> anyhow::Result<Option<StoredRecommendation>> {
        let key = (brand_id.to_string(), campaign_id.to_string(), week);
        Ok(self.rows.read().await.get(&key).cloned())
    }

    async fn insert_if_absent(&self, rec: &StoredRecommendation) -> anyhow::Result<bool> {
        let key = (rec.brand_id.clone(), rec.campaign_id.clone(), rec.week_id);
        let mut rows = self.rows.write().await;
        if rows.contains_key(&key) {
            return Ok(false);
        }
        rows.insert(key, rec.clone());
        Ok(true)
    }
}
